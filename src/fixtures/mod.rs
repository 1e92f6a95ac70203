//! Fixture utilities for the deterministic replay harness.
//!
//! Loads mono WAV recordings, converts them to ADC codes, and replays them
//! through a [`Mic`] driven by a [`ManualClock`], so the envelope sees the
//! recording's own timebase. The level is sampled once per animation frame
//! into a [`LevelTrace`], which can be checked against talk/silence segments
//! from an expectation JSON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::{ManualClock, ReplaySource};
use crate::config::AppConfig;
use crate::error::MicError;
use crate::frame::{FrameLoop, FrameReport};
use crate::mic::{InstanceGuard, Mic};
use crate::telemetry::CounterSnapshot;

/// Default location for fixture WAV/JSON assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Metadata describing an available fixture.
#[derive(Clone, Debug)]
pub struct FixtureMetadata {
    pub name: String,
    pub wav_path: PathBuf,
    pub expect_path: Option<PathBuf>,
}

/// Loaded fixture data with decoded PCM samples.
pub struct FixtureData {
    pub metadata: FixtureMetadata,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub expectations: Option<TalkExpectations>,
}

/// Expected talk/silence segments for a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkExpectations {
    pub fixture: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Fraction of frames inside each segment that must agree
    #[serde(default = "default_min_agreement")]
    pub min_agreement: f32,
    pub segments: Vec<ExpectedSegment>,
}

fn default_min_agreement() -> f32 {
    0.8
}

/// `[start_ms, end_ms)` of the recording and whether the face should be
/// talking during it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub talking: bool,
}

impl TalkExpectations {
    pub fn verify(&self, trace: &LevelTrace) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        for (index, segment) in self.segments.iter().enumerate() {
            let in_segment = trace
                .frames
                .iter()
                .filter(|f| f.timestamp_ms >= segment.start_ms && f.timestamp_ms < segment.end_ms);
            let (frames, agreeing) = in_segment.fold((0usize, 0usize), |(total, ok), f| {
                (total + 1, ok + usize::from(f.talking == segment.talking))
            });

            let agreement = if frames == 0 {
                0.0
            } else {
                agreeing as f32 / frames as f32
            };
            if frames == 0 || agreement < self.min_agreement {
                failures.push(SegmentFailure {
                    index,
                    expected: segment.clone(),
                    frames,
                    agreement,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff {
                min_agreement: self.min_agreement,
                failures,
            })
        }
    }
}

/// Outcome of comparing a trace with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub min_agreement: f32,
    pub failures: Vec<SegmentFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "min_agreement": self.min_agreement,
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "index": failure.index,
                    "expected": failure.expected,
                    "frames": failure.frames,
                    "agreement": failure.agreement,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// A segment whose frames disagreed too often (or that had no frames).
#[derive(Debug)]
pub struct SegmentFailure {
    pub index: usize,
    pub expected: ExpectedSegment,
    pub frames: usize,
    pub agreement: f32,
}

/// Per-frame levels of one replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelTrace {
    pub fixture: String,
    pub sample_rate: u32,
    /// Effective sampler rate after decimation
    pub sampler_hz: u32,
    pub fps: u32,
    pub frames: Vec<FrameReport>,
    pub counters: CounterSnapshot,
}

impl LevelTrace {
    /// Fraction of frames reported as talking.
    pub fn talking_ratio(&self) -> f32 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.frames.iter().filter(|f| f.talking).count() as f32 / self.frames.len() as f32
    }

    pub fn peak_level(&self) -> f32 {
        self.frames.iter().map(|f| f.level).fold(0.0, f32::max)
    }
}

/// Catalog responsible for discovering fixtures on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all fixtures by their metadata.
    pub fn discover(&self) -> Result<Vec<FixtureMetadata>> {
        let mut fixtures = Vec::new();
        if !self.root.exists() {
            return Ok(fixtures);
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("wav") {
                fixtures.push(metadata_for_path(&path)?);
            }
        }

        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fixtures)
    }

    /// Load fixture samples + expectations for a fixture name or a WAV path.
    pub fn load(&self, fixture: &str, override_expect: Option<PathBuf>) -> Result<FixtureData> {
        let wav_path = self.resolve_fixture_path(fixture)?;
        let metadata = metadata_for_path(&wav_path)?;
        let (samples, sample_rate) = read_wav(&wav_path)?;

        let expectations = match override_expect.or_else(|| metadata.expect_path.clone()) {
            Some(path) => Some(load_expectations(&path)?),
            None => None,
        };

        Ok(FixtureData {
            metadata,
            sample_rate,
            samples,
            expectations,
        })
    }

    fn resolve_fixture_path(&self, fixture: &str) -> Result<PathBuf> {
        let as_path = Path::new(fixture);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{fixture}.wav"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Fixture '{fixture}' not found in {}",
                self.root.display()
            ))
        }
    }
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

fn metadata_for_path(wav_path: &Path) -> Result<FixtureMetadata> {
    let name = wav_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("Invalid fixture name for {}", wav_path.display()))?
        .to_string();
    let expect_path = wav_path.with_extension("expect.json");
    Ok(FixtureMetadata {
        name,
        wav_path: wav_path.to_path_buf(),
        expect_path: expect_path.exists().then_some(expect_path),
    })
}

pub fn load_expectations(path: &Path) -> Result<TalkExpectations> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading expectation {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

/// Replays decoded fixtures through the talk pipeline.
pub struct FixtureReplayer {
    config: AppConfig,
}

impl FixtureReplayer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Replay `data` and sample the level once per animation frame.
    ///
    /// Recordings faster than `sampler.frequency_hz` are decimated by an
    /// integer factor; slower ones are replayed at their own rate.
    pub fn run(&self, data: &FixtureData) -> Result<LevelTrace> {
        if data.sample_rate == 0 {
            return Err(MicError::FixtureFailed {
                reason: format!("{} has a sample rate of 0", data.metadata.name),
            }
            .into());
        }

        let decimation = (data.sample_rate / self.config.sampler.frequency_hz.max(1)).max(1);
        let sampler_hz = data.sample_rate / decimation;
        let decimated: Vec<f32> = data
            .samples
            .iter()
            .step_by(decimation as usize)
            .copied()
            .collect();
        let sample_count = decimated.len();
        let source = ReplaySource::from_pcm(&decimated, self.config.sampler.adc_bits);

        // replays run offline, next to whatever owns the process-wide claim
        let guard = InstanceGuard::new();
        let clock = Arc::new(ManualClock::new(0));
        let mut mic = Mic::with_guard(&guard, &data.metadata.name, source, &self.config)
            .with_context(|| format!("building mic for {}", data.metadata.name))?
            .with_clock(clock.clone());
        let frames = FrameLoop::new(mic.level_handle(), self.config.frame.clone());

        let fps = self.config.frame.fps.max(1);
        let frame_period_us = 1_000_000 / u64::from(fps);
        let mut next_frame_us = frame_period_us;
        let mut reports = Vec::new();

        for index in 1..=sample_count as u64 {
            let now_us = index * u64::from(decimation) * 1_000_000 / u64::from(data.sample_rate);
            clock.set(now_us);
            mic.update();

            while now_us >= next_frame_us {
                reports.push(frames.report(reports.len() as u64, next_frame_us / 1_000));
                next_frame_us += frame_period_us;
            }
        }

        log::debug!(
            "[Fixtures] Replayed {} ({} samples at {} Hz, {} frames)",
            data.metadata.name,
            sample_count,
            sampler_hz,
            reports.len()
        );

        Ok(LevelTrace {
            fixture: data.metadata.name.clone(),
            sample_rate: data.sample_rate,
            sampler_hz,
            fps,
            frames: reports,
            counters: mic.counters(),
        })
    }
}

/// Decode a WAV file to PCM in [-1, 1], keeping only the first channel.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    if channels > 1 {
        log::warn!(
            "[Fixtures] {} has {} channels, using the first",
            path.display(),
            channels
        );
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("decoding {}", path.display()))?,
        (hound::SampleFormat::Int, bits @ 8..=32) => {
            let full_scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("decoding {}", path.display()))?
        }
        (_, other) => {
            return Err(anyhow!(
                "Unsupported bits per sample {} in {}",
                other,
                path.display()
            ))
        }
    };

    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok((samples, spec.sample_rate))
}
