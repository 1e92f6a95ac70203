//! Mic - talk activity orchestrator
//!
//! Owns the analog source, the clock and one of the two pipelines, and
//! exposes the latest level in [0, 1]. Three ways to drive it:
//!
//! - polled: call [`Mic::update`] from the main loop
//! - timer: [`Mic::split`] into a [`MicSampler`] (sole writer, moved into the
//!   periodic callback) and a [`MicLevel`] (reader for the main loop)
//! - mailbox: [`Mic::split_mailbox`] so the timer callback only posts
//!   timestamped samples and the main loop runs the filters via
//!   [`MailboxPump::drain`]
//!
//! Only one `Mic` may exist per process (it owns the sampling interrupt).
//! [`Mic::new`] panics on a second construction; [`Mic::try_new`] reports
//! `MicError::AlreadyConstructed` instead. Offline replays inside the crate
//! use a private guard and never take the process-wide claim.

mod guard;
mod pipeline;
mod shared;

pub(crate) use guard::InstanceGuard;
pub use shared::LevelCell;

use std::sync::Arc;

use crate::analysis::WindowSnapshot;
use crate::audio::{
    AnalogSource, MailboxConsumer, MailboxProducer, MicrosClock, PeriodicTimer, SampleMailbox,
    SystemClock, TimedSample,
};
use crate::config::{AppConfig, SamplingStrategy};
use crate::error::{log_mic_error, MicError};
use crate::telemetry::{CounterSnapshot, PipelineCounters};
use pipeline::{LevelReader, Pipeline};

/// Process-wide claim on the sampling interrupt.
static MIC_GUARD: InstanceGuard = InstanceGuard::new();

pub struct Mic {
    channel: String,
    source: Box<dyn AnalogSource>,
    clock: Arc<dyn MicrosClock>,
    pipeline: Pipeline,
    level: MicLevel,
}

impl Mic {
    /// Construct the process's microphone with default tuning.
    ///
    /// # Arguments
    /// * `channel` - ADC pin or channel identifier (for diagnostics)
    /// * `window_size` - Raw window (direct) or noise floor window (envelope)
    /// * `source` - The ADC to sample
    ///
    /// # Panics
    /// Panics if a `Mic` was already constructed in this process, or if
    /// `window_size` is 0
    pub fn new(channel: &str, window_size: usize, source: impl AnalogSource + 'static) -> Self {
        match Self::try_new(channel, window_size, source) {
            Ok(mic) => mic,
            Err(err) => {
                log_mic_error(&err, "Mic::new");
                panic!("{}", err);
            }
        }
    }

    /// Fallible [`Mic::new`].
    pub fn try_new(
        channel: &str,
        window_size: usize,
        source: impl AnalogSource + 'static,
    ) -> Result<Self, MicError> {
        let mut config = AppConfig::default();
        config.sampler.window_size = window_size;
        Self::from_config(channel, source, &config)
    }

    /// Construct the process's microphone from a full configuration.
    pub fn from_config(
        channel: &str,
        source: impl AnalogSource + 'static,
        config: &AppConfig,
    ) -> Result<Self, MicError> {
        Self::with_guard(&MIC_GUARD, channel, source, config)
    }

    /// Construct against an explicit guard.
    ///
    /// The configuration is validated before the guard is claimed, so a
    /// rejected configuration leaves the guard free.
    pub(crate) fn with_guard(
        guard: &InstanceGuard,
        channel: &str,
        source: impl AnalogSource + 'static,
        config: &AppConfig,
    ) -> Result<Self, MicError> {
        if config.sampler.window_size == 0 {
            return Err(MicError::InvalidWindow { size: 0 });
        }
        config.validate()?;
        guard.claim(channel)?;

        let (pipeline, reader) = Pipeline::build(config);
        tracing::info!(
            channel,
            strategy = ?config.sampler.strategy,
            window_size = config.sampler.window_size,
            adc_bits = source.resolution_bits(),
            "mic constructed"
        );

        Ok(Self {
            channel: channel.to_string(),
            source: Box::new(source),
            clock: Arc::new(SystemClock::new()),
            pipeline,
            level: MicLevel { reader },
        })
    }

    /// Replace the microsecond clock (defaults to [`SystemClock`]).
    pub fn with_clock(mut self, clock: Arc<dyn MicrosClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Take one sample and run it through the pipeline.
    ///
    /// Read the resulting level with [`Mic::get`]. For the direct strategy
    /// the standard deviation is only computed there, never per sample.
    pub fn update(&mut self) {
        let raw = self.source.read();
        let now_us = self.clock.now_micros();
        self.pipeline.process(raw, now_us);
    }

    /// Latest level in [0, 1].
    pub fn get(&self) -> f32 {
        self.level.level()
    }

    /// `get() > threshold`
    pub fn talking(&self, threshold: f32) -> bool {
        self.level.is_active(threshold)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.level.strategy()
    }

    /// Another read handle to this microphone's level.
    pub fn level_handle(&self) -> MicLevel {
        self.level.clone()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.level.counters()
    }

    /// Hand sampling to a timer context.
    pub fn split(self) -> (MicSampler, MicLevel) {
        let sampler = MicSampler {
            channel: self.channel,
            source: self.source,
            clock: self.clock,
            pipeline: self.pipeline,
        };
        (sampler, self.level)
    }

    /// Hand sampling to a timer context that only queues samples.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn split_mailbox(self, capacity: usize) -> (MailboxSampler, MailboxPump, MicLevel) {
        let (producer, consumer) = SampleMailbox::new(capacity);
        let sampler = MailboxSampler {
            channel: self.channel,
            source: self.source,
            clock: self.clock,
            producer,
            counters: Arc::clone(self.pipeline.counters()),
        };
        let pump = MailboxPump {
            consumer,
            pipeline: self.pipeline,
        };
        (sampler, pump, self.level)
    }
}

/// Write side of a split [`Mic`]; runs the whole pipeline per tick.
pub struct MicSampler {
    channel: String,
    source: Box<dyn AnalogSource>,
    clock: Arc<dyn MicrosClock>,
    pipeline: Pipeline,
}

impl MicSampler {
    /// One timer tick: read, timestamp, process, publish.
    #[inline]
    pub fn tick(&mut self) {
        let raw = self.source.read();
        let now_us = self.clock.now_micros();
        self.pipeline.process(raw, now_us);
    }

    /// Move this sampler into `timer`'s periodic callback.
    pub fn attach<T: PeriodicTimer + ?Sized>(
        mut self,
        timer: &mut T,
        frequency_hz: u32,
    ) -> Result<(), MicError> {
        tracing::info!(channel = %self.channel, frequency_hz, "attaching sampler");
        timer.register(frequency_hz, Box::new(move || self.tick()))
    }
}

/// Write side of a mailbox split; the tick only reads and posts.
pub struct MailboxSampler {
    channel: String,
    source: Box<dyn AnalogSource>,
    clock: Arc<dyn MicrosClock>,
    producer: MailboxProducer,
    counters: Arc<PipelineCounters>,
}

impl MailboxSampler {
    #[inline]
    pub fn tick(&mut self) {
        let sample = TimedSample {
            value: self.source.read(),
            at_us: self.clock.now_micros(),
        };
        if !self.producer.post(sample) {
            self.counters.record_overrun();
        }
    }

    pub fn attach<T: PeriodicTimer + ?Sized>(
        mut self,
        timer: &mut T,
        frequency_hz: u32,
    ) -> Result<(), MicError> {
        tracing::info!(channel = %self.channel, frequency_hz, "attaching mailbox sampler");
        timer.register(frequency_hz, Box::new(move || self.tick()))
    }
}

/// Main loop side of a mailbox split.
pub struct MailboxPump {
    consumer: MailboxConsumer,
    pipeline: Pipeline,
}

impl MailboxPump {
    /// Run every queued sample through the pipeline, oldest first.
    ///
    /// # Returns
    /// Number of samples processed
    pub fn drain(&mut self) -> usize {
        let pipeline = &mut self.pipeline;
        self.consumer
            .drain(|sample| pipeline.process(sample.value, sample.at_us))
    }

    pub fn pending(&self) -> usize {
        self.consumer.pending()
    }
}

/// Cloneable read handle to the level.
#[derive(Clone)]
pub struct MicLevel {
    reader: LevelReader,
}

impl MicLevel {
    /// Current level in [0, 1].
    ///
    /// Envelope strategy: one atomic load. Direct strategy: the raw window
    /// is copied inside the critical section and its standard deviation is
    /// computed after leaving it.
    pub fn level(&self) -> f32 {
        self.reader.level()
    }

    /// `level() > threshold`
    pub fn is_active(&self, threshold: f32) -> bool {
        self.level() > threshold
    }

    /// Raw window copy for the direct strategy, `None` for the envelope.
    pub fn window_snapshot(&self) -> Result<Option<WindowSnapshot>, MicError> {
        self.reader.window_snapshot()
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.reader.strategy()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.reader.counters().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ManualClock, ManualTimer, ReplaySource, SyntheticMic};
    use crate::config::EnvelopeConfig;

    fn envelope_mic(guard: &InstanceGuard, source: impl AnalogSource + 'static) -> Mic {
        Mic::with_guard(guard, "A0", source, &AppConfig::default()).unwrap()
    }

    #[test]
    fn test_guard_rejects_second_mic() {
        let guard = InstanceGuard::new();
        let _first = envelope_mic(&guard, || 2048u16);
        let second = Mic::with_guard(&guard, "A1", || 2048u16, &AppConfig::default());
        assert!(matches!(
            second,
            Err(MicError::AlreadyConstructed { ref channel }) if channel == "A0"
        ));
    }

    #[test]
    fn test_invalid_window_leaves_guard_free() {
        let guard = InstanceGuard::new();
        let mut config = AppConfig::default();
        config.sampler.window_size = 0;
        let err = Mic::with_guard(&guard, "A0", || 0u16, &config).err();
        assert_eq!(err, Some(MicError::InvalidWindow { size: 0 }));
        assert!(guard.claimed_by().is_none());
    }

    #[test]
    fn test_polled_update_stays_in_range() {
        let guard = InstanceGuard::new();
        let clock = Arc::new(ManualClock::new(0));
        let mut mic = envelope_mic(&guard, SyntheticMic::new(15_625, 9))
            .with_clock(clock.clone());

        for _ in 0..5_000 {
            clock.advance(64);
            mic.update();
            assert!((0.0..=1.0).contains(&mic.get()));
        }
        assert_eq!(mic.counters().ticks, 5_000);
        assert_eq!(mic.channel(), "A0");
    }

    #[test]
    fn test_identical_timestamps_are_guarded() {
        let guard = InstanceGuard::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let mut next = 0u16;
        let mut mic = envelope_mic(&guard, move || {
            next = (next + 1_500) % 4_096;
            next
        })
        .with_clock(clock);

        for _ in 0..100 {
            mic.update();
            let level = mic.get();
            assert!(level.is_finite());
            assert!((0.0..=1.0).contains(&level));
        }
        // every update after the first saw zero elapsed time
        assert_eq!(mic.counters().zero_elapsed, 99);
    }

    #[test]
    fn test_split_sampler_publishes_to_level() {
        let guard = InstanceGuard::new();
        let clock = Arc::new(ManualClock::new(0));
        let tick_clock = Arc::clone(&clock);
        let mut phase = 0u64;
        let source = move || {
            tick_clock.advance(64);
            phase += 1;
            if (phase / 8) % 2 == 0 {
                2648u16
            } else {
                1448u16
            }
        };
        let mic = envelope_mic(&guard, source).with_clock(clock);
        let (sampler, level) = mic.split();
        let reader = level.clone();

        let mut timer = ManualTimer::new();
        sampler.attach(&mut timer, 15_625).unwrap();
        assert_eq!(level.level(), 0.0);

        let mut peak = 0.0_f32;
        for _ in 0..400 {
            timer.fire(10);
            peak = peak.max(reader.level());
        }
        assert!(peak > 0.5, "peak level was {}", peak);
        assert_eq!(level.counters().ticks, 4_000);
    }

    #[test]
    fn test_direct_strategy_tracks_std_dev() {
        let guard = InstanceGuard::new();
        let mut config = AppConfig::default();
        config.sampler.strategy = SamplingStrategy::DirectStatistic;
        config.sampler.window_size = 100;
        config.sampler.direct_full_scale = 500.0;

        let samples: Vec<u16> = (0..100).map(|i| if i % 2 == 0 { 0 } else { 1000 }).collect();
        let mut mic =
            Mic::with_guard(&guard, "A0", ReplaySource::new(samples, 12), &config).unwrap();
        assert_eq!(mic.strategy(), SamplingStrategy::DirectStatistic);

        for _ in 0..100 {
            mic.update();
        }
        // polling only feeds the window; the deviation is computed on read
        assert_eq!(mic.counters().ticks, 100);
        assert_eq!(mic.counters().window_snapshots, 0);

        // std of alternating 0/1000 is 500
        assert!((mic.get() - 1.0).abs() < 1e-6);
        assert_eq!(mic.counters().window_snapshots, 1);
        assert!(mic.talking(0.9));

        let snapshot = mic.level_handle().window_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.values().len(), 100);
        assert!((snapshot.mean() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_synthetic_speech_is_detected_in_both_profiles() {
        for envelope in [EnvelopeConfig::amplified(), EnvelopeConfig::unscaled()] {
            let guard = InstanceGuard::new();
            let mut config = AppConfig::default();
            config.envelope = envelope;
            let clock = Arc::new(ManualClock::new(0));
            // default schedule: 600 ms burst, then 900 ms gap
            let mut mic = Mic::with_guard(&guard, "A0", SyntheticMic::new(15_625, 42), &config)
                .unwrap()
                .with_clock(clock.clone());

            let mut burst_frames = 0;
            let mut burst_talking = 0;
            for index in 0..1_500_000 / 64_u64 {
                clock.advance(64);
                mic.update();
                let at_ms = index * 64 / 1_000;
                if (100..550).contains(&at_ms) {
                    burst_frames += 1;
                    if mic.talking(0.2) {
                        burst_talking += 1;
                    }
                }
                if (700..1_450).contains(&at_ms) {
                    assert!(!mic.talking(0.2), "talking in the gap at {} ms", at_ms);
                }
            }
            assert!(
                burst_talking * 10 >= burst_frames * 8,
                "only {} of {} burst samples were talking",
                burst_talking,
                burst_frames
            );
        }
    }

    #[test]
    fn test_mailbox_drain_matches_polled_mode() {
        let samples: Vec<u16> = (0..3_000u32)
            .map(|i| if (i / 8) % 2 == 0 { 2648 } else { 1448 })
            .collect();

        let polled_guard = InstanceGuard::new();
        let polled_clock = Arc::new(ManualClock::new(0));
        let mut polled = envelope_mic(&polled_guard, ReplaySource::new(samples.clone(), 12))
            .with_clock(polled_clock.clone());
        for _ in 0..samples.len() {
            polled_clock.advance(64);
            polled.update();
        }

        let mailbox_guard = InstanceGuard::new();
        let mailbox_clock = Arc::new(ManualClock::new(0));
        let tick_clock = Arc::clone(&mailbox_clock);
        let mut replay = ReplaySource::new(samples.clone(), 12);
        let source = move || {
            tick_clock.advance(64);
            replay.read()
        };
        let mic = envelope_mic(&mailbox_guard, source).with_clock(mailbox_clock);
        let (sampler, mut pump, level) = mic.split_mailbox(4_096);

        let mut timer = ManualTimer::new();
        sampler.attach(&mut timer, 15_625).unwrap();
        timer.fire(samples.len());
        assert_eq!(pump.pending(), samples.len());
        assert_eq!(pump.drain(), samples.len());

        assert_eq!(level.level(), polled.get());
        assert_eq!(level.counters().mailbox_overruns, 0);
    }

    #[test]
    fn test_mailbox_overrun_is_counted() {
        let guard = InstanceGuard::new();
        let mic = envelope_mic(&guard, || 2048u16);
        let (mut sampler, mut pump, level) = mic.split_mailbox(4);
        for _ in 0..10 {
            sampler.tick();
        }
        assert_eq!(pump.drain(), 4);
        assert_eq!(level.counters().mailbox_overruns, 6);
        assert_eq!(level.counters().ticks, 4);
    }
}
