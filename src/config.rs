//! Configuration management for envelope tuning
//!
//! This module provides runtime configuration loading from JSON files, so the
//! envelope constants can be tuned without reflashing/recompiling. The scaling
//! constants of the envelope have changed across hardware revisions, which is
//! why every one of them is a named field here instead of a literal in the
//! pipeline.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::MAX_TIMER_FREQUENCY_HZ;
use crate::error::MicError;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub frame: FrameConfig,
}

/// How raw samples are turned into an activity level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Standard deviation of the raw sample window
    DirectStatistic,
    /// Rate-of-change envelope with noise floor removal
    #[default]
    FilteredEnvelope,
}

/// Sampling interrupt and window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub strategy: SamplingStrategy,
    /// Timer interrupt rate in Hz
    pub frequency_hz: u32,
    /// Raw sample window (direct statistic) or noise floor input window
    /// (filtered envelope)
    pub window_size: usize,
    /// ADC resolution; samples are in [0, 2^adc_bits - 1]
    pub adc_bits: u8,
    /// Standard deviation that maps to a level of 1.0 in the direct strategy
    pub direct_full_scale: f64,
    /// Pending samples the interrupt may queue for the main loop
    pub mailbox_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::FilteredEnvelope,
            // 64us timer period
            frequency_hz: 15_625,
            window_size: 100,
            adc_bits: 12,
            direct_full_scale: 512.0,
            mailbox_capacity: 1024,
        }
    }
}

impl SamplerConfig {
    /// Largest code the ADC can produce.
    pub fn adc_max(&self) -> u16 {
        ((1u32 << self.adc_bits.min(16)) - 1) as u16
    }
}

/// Named envelope calibrations seen on hardware so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeProfile {
    Amplified,
    Unscaled,
}

impl std::str::FromStr for EnvelopeProfile {
    type Err = MicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amplified" => Ok(EnvelopeProfile::Amplified),
            "unscaled" => Ok(EnvelopeProfile::Unscaled),
            other => Err(MicError::InvalidConfig {
                reason: format!("unknown envelope profile '{}'", other),
            }),
        }
    }
}

/// Filtered envelope constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Multiplier applied to every raw ADC code
    pub input_gain: f32,
    /// Amplification of |rate of change| before smoothing
    pub amplitude_scale: f32,
    /// Fixed offset removed together with the noise floor
    pub noise_offset: f32,
    /// Upper clamp for `amplitude - floor - offset`
    pub max_range: f32,
    /// Divisor applied to the clamped amplitude
    pub output_scale: f32,
    /// Second divisor mapping the scaled amplitude into [0, 1]
    pub clipping_factor: f32,
    /// History length of both smoothing filters
    pub smoothing_window: usize,
    /// Blend weight of both smoothing filters
    pub smoothing_gain: f32,
    /// Skip repeated minima in the noise floor history
    pub ignore_same: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self::amplified()
    }
}

impl EnvelopeConfig {
    /// Calibration used with the 32x oversampled free-running ADC.
    pub fn amplified() -> Self {
        Self {
            input_gain: 0.2,
            amplitude_scale: 10_000.0,
            noise_offset: 10_000.0,
            max_range: 40_000.0,
            output_scale: 100.0,
            clipping_factor: 0.2,
            smoothing_window: 5,
            smoothing_gain: 0.2,
            ignore_same: true,
        }
    }

    /// Same curve without the amplitude multiplier; offsets and ranges are
    /// expressed in raw rate units and clipping is disabled.
    pub fn unscaled() -> Self {
        Self {
            input_gain: 0.2,
            amplitude_scale: 1.0,
            noise_offset: 1.0,
            max_range: 4.0,
            output_scale: 0.01,
            clipping_factor: 1.0,
            smoothing_window: 5,
            smoothing_gain: 0.2,
            ignore_same: true,
        }
    }

    pub fn from_profile(profile: EnvelopeProfile) -> Self {
        match profile {
            EnvelopeProfile::Amplified => Self::amplified(),
            EnvelopeProfile::Unscaled => Self::unscaled(),
        }
    }
}

/// Main loop cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub fps: u32,
    /// Level above which the face is considered talking
    pub talk_threshold: f32,
    /// Log pipeline counters every N frames (0 disables)
    pub log_every_n_frames: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            talk_threshold: 0.2,
            log_every_n_frames: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults when the file is missing,
    /// unparsable, or fails validation (a warning is logged in each case)
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_file(&path) {
            Ok(config) => {
                log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                config
            }
            Err(err) => {
                log::warn!(
                    "[Config] {} ({:?}). Using defaults.",
                    err,
                    path.as_ref()
                );
                Self::default()
            }
        }
    }

    /// Strict variant of [`AppConfig::load_from_file`].
    pub fn try_load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MicError> {
        let contents = fs::read_to_string(&path).map_err(|err| MicError::InvalidConfig {
            reason: format!("failed to read config file: {}", err),
        })?;
        let config = Self::from_json_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document. `envelope.profile` names the base calibration;
    /// any other `envelope` field given alongside it overrides that profile.
    pub fn from_json_str(contents: &str) -> Result<Self, MicError> {
        let parse_error = |err: serde_json::Error| MicError::InvalidConfig {
            reason: format!("failed to parse JSON: {}", err),
        };
        let mut value: serde_json::Value = serde_json::from_str(contents).map_err(parse_error)?;

        let envelope = value.get_mut("envelope").and_then(|e| e.as_object_mut());
        if let Some(envelope) = envelope {
            if let Some(profile) = envelope.remove("profile") {
                let name = profile.as_str().ok_or_else(|| MicError::InvalidConfig {
                    reason: "envelope.profile must be a string".to_string(),
                })?;
                let base = EnvelopeConfig::from_profile(name.parse()?);
                let mut merged = match serde_json::to_value(base).map_err(parse_error)? {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                merged.extend(std::mem::take(envelope));
                *envelope = merged;
            }
        }

        serde_json::from_value(value).map_err(parse_error)
    }

    /// Load `talk_envelope.json` from the working directory.
    pub fn load() -> Self {
        Self::load_from_file("talk_envelope.json")
    }

    /// Reject values that would make the pipeline divide by zero or allocate
    /// empty windows.
    pub fn validate(&self) -> Result<(), MicError> {
        let invalid = |reason: &str| {
            Err(MicError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.sampler.frequency_hz == 0 || self.sampler.frequency_hz > MAX_TIMER_FREQUENCY_HZ {
            return invalid("sampler.frequency_hz must be in 1..=1000000");
        }
        if self.sampler.window_size == 0 {
            return invalid("sampler.window_size must be greater than 0");
        }
        if self.sampler.adc_bits == 0 || self.sampler.adc_bits > 16 {
            return invalid("sampler.adc_bits must be in 1..=16");
        }
        if !(self.sampler.direct_full_scale > 0.0) {
            return invalid("sampler.direct_full_scale must be positive");
        }
        if self.sampler.mailbox_capacity == 0 {
            return invalid("sampler.mailbox_capacity must be greater than 0");
        }
        if self.envelope.smoothing_window == 0 {
            return invalid("envelope.smoothing_window must be greater than 0");
        }
        if self.envelope.output_scale == 0.0 || self.envelope.clipping_factor == 0.0 {
            return invalid("envelope.output_scale and clipping_factor must be non-zero");
        }
        if !(self.envelope.max_range >= 0.0) {
            return invalid("envelope.max_range must not be negative");
        }
        if self.frame.fps == 0 {
            return invalid("frame.fps must be greater than 0");
        }
        Ok(())
    }
}
