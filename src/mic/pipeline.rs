// Per-sample processing shared by the polled, timer and mailbox modes.

use std::sync::{Arc, Mutex};

use super::shared::{enter, LevelCell, SharedStatistic};
use crate::analysis::{EnvelopeFollower, RollingWindowStatistic, WindowSnapshot};
use crate::config::{AppConfig, SamplingStrategy};
use crate::error::MicError;
use crate::telemetry::PipelineCounters;

/// Writer half: owned by whichever context processes samples.
pub(crate) struct Pipeline {
    stage: Stage,
    counters: Arc<PipelineCounters>,
}

enum Stage {
    Direct(SharedStatistic),
    Envelope {
        follower: EnvelopeFollower,
        published: Arc<LevelCell>,
    },
}

impl Pipeline {
    /// Build the writer and its matching reader.
    pub(crate) fn build(config: &AppConfig) -> (Pipeline, LevelReader) {
        let counters = Arc::new(PipelineCounters::new());
        let window_size = config.sampler.window_size;

        let (stage, source) = match config.sampler.strategy {
            SamplingStrategy::DirectStatistic => {
                let statistic = Arc::new(Mutex::new(RollingWindowStatistic::new(window_size)));
                (
                    Stage::Direct(Arc::clone(&statistic)),
                    ReaderSource::Window {
                        statistic,
                        capacity: window_size,
                        full_scale: config.sampler.direct_full_scale,
                    },
                )
            }
            SamplingStrategy::FilteredEnvelope => {
                let published = Arc::new(LevelCell::default());
                (
                    Stage::Envelope {
                        follower: EnvelopeFollower::new(&config.envelope, window_size),
                        published: Arc::clone(&published),
                    },
                    ReaderSource::Published(published),
                )
            }
        };

        (
            Pipeline {
                stage,
                counters: Arc::clone(&counters),
            },
            LevelReader { source, counters },
        )
    }

    #[inline]
    pub(crate) fn process(&mut self, raw: u16, now_us: u64) {
        match &mut self.stage {
            Stage::Direct(statistic) => {
                enter(statistic).add(raw);
                self.counters.record_tick();
            }
            Stage::Envelope {
                follower,
                published,
            } => {
                let step = follower.step(raw, now_us);
                published.store(step.output);
                self.counters.record_step(&step);
            }
        }
    }

    pub(crate) fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }
}

/// Reader half: cloned freely into the main loop.
#[derive(Clone)]
pub(crate) struct LevelReader {
    source: ReaderSource,
    counters: Arc<PipelineCounters>,
}

#[derive(Clone)]
enum ReaderSource {
    Published(Arc<LevelCell>),
    Window {
        statistic: SharedStatistic,
        capacity: usize,
        full_scale: f64,
    },
}

impl LevelReader {
    pub(crate) fn level(&self) -> f32 {
        match &self.source {
            ReaderSource::Published(cell) => cell.load(),
            ReaderSource::Window {
                statistic,
                capacity,
                full_scale,
            } => {
                let mut snapshot = WindowSnapshot::with_capacity(*capacity);
                enter(statistic).snapshot_into(&mut snapshot);
                self.counters.record_window_snapshot();
                direct_level(snapshot.std_dev(), *full_scale)
            }
        }
    }

    /// Consistent copy of the raw window (direct strategy only).
    pub(crate) fn window_snapshot(&self) -> Result<Option<WindowSnapshot>, MicError> {
        match &self.source {
            ReaderSource::Published(_) => Ok(None),
            ReaderSource::Window {
                statistic,
                capacity,
                ..
            } => {
                let mut snapshot = WindowSnapshot::with_capacity(*capacity);
                statistic
                    .lock()
                    .map_err(|_| MicError::LockPoisoned {
                        component: "RollingWindowStatistic".to_string(),
                    })?
                    .snapshot_into(&mut snapshot);
                self.counters.record_window_snapshot();
                Ok(Some(snapshot))
            }
        }
    }

    pub(crate) fn strategy(&self) -> SamplingStrategy {
        match self.source {
            ReaderSource::Published(_) => SamplingStrategy::FilteredEnvelope,
            ReaderSource::Window { .. } => SamplingStrategy::DirectStatistic,
        }
    }

    pub(crate) fn counters(&self) -> &Arc<PipelineCounters> {
        &self.counters
    }
}

/// Map a raw-window standard deviation onto [0, 1].
#[inline]
pub(crate) fn direct_level(std_dev: f64, full_scale: f64) -> f32 {
    let level = (std_dev / full_scale) as f32;
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_level_clamps() {
        assert_eq!(direct_level(0.0, 512.0), 0.0);
        assert_eq!(direct_level(256.0, 512.0), 0.5);
        assert_eq!(direct_level(5_000.0, 512.0), 1.0);
        assert_eq!(direct_level(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_direct_pipeline_reads_window() {
        let mut config = AppConfig::default();
        config.sampler.strategy = SamplingStrategy::DirectStatistic;
        config.sampler.window_size = 4;
        config.sampler.direct_full_scale = 1_000.0;
        let (mut pipeline, reader) = Pipeline::build(&config);
        assert_eq!(reader.strategy(), SamplingStrategy::DirectStatistic);

        for (i, raw) in [0u16, 1000, 0, 1000].into_iter().enumerate() {
            pipeline.process(raw, i as u64);
        }
        // population std of [0, 1000, 0, 1000] is 500
        assert!((reader.level() - 0.5).abs() < 1e-6);

        let snapshot = reader.window_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.values(), &[0, 1000, 0, 1000]);
        assert_eq!(pipeline.counters().snapshot().ticks, 4);
        assert_eq!(reader.counters().snapshot().window_snapshots, 2);
    }

    #[test]
    fn test_envelope_pipeline_publishes_output() {
        let (mut pipeline, reader) = Pipeline::build(&AppConfig::default());
        assert_eq!(reader.strategy(), SamplingStrategy::FilteredEnvelope);
        assert!(reader.window_snapshot().unwrap().is_none());

        let mut now = 0;
        for i in 0..2_000u64 {
            now += 64;
            let raw = if (i / 8) % 2 == 0 { 2648 } else { 1448 };
            pipeline.process(raw, now);
            let level = reader.level();
            assert!((0.0..=1.0).contains(&level));
        }
        assert_eq!(reader.counters().snapshot().ticks, 2_000);
    }
}
