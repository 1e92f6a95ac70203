//! Filtered envelope (rate-of-change talk detector)
//!
//! Turns raw ADC codes into a bounded talk level:
//!
//! ```text
//! raw ──gain──> read ──d/dt──> |rate| * amplitude_scale
//!        ──AdaptiveSmoothingFilter──> amplitude
//!        ──NoiseFloorTracker──> floor
//!   clamp(amplitude - floor - noise_offset, 0, max_range)
//!        / output_scale / clipping_factor
//!        ──AdaptiveSmoothingFilter──> clamp(.., 0, 1) ──> output
//! ```
//!
//! The follower is pure state: callers hand it the sample and a microsecond
//! timestamp, so the same code runs inside the timer interrupt, in a polled
//! main loop, and in offline fixture replays.
//!
//! Guards (nothing here returns an error):
//! - the first sample only primes the previous read (rate 0), so the jump
//!   from the initial zero does not show up as a burst
//! - zero elapsed time reuses the previous rate instead of dividing by zero
//! - non-finite intermediates are treated as 0 before clamping

use serde::Serialize;

use super::noise_floor::NoiseFloorTracker;
use super::smoothing::AdaptiveSmoothingFilter;
use crate::config::EnvelopeConfig;

/// Every intermediate value of one envelope update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnvelopeStep {
    pub read: f32,
    pub change: f32,
    pub elapsed_us: u64,
    pub rate: f32,
    pub amplitude: f32,
    pub floor: f32,
    pub normalized: f32,
    pub output: f32,
    /// The elapsed-time guard fired and the previous rate was reused
    pub reused_rate: bool,
}

#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    input_gain: f32,
    amplitude_scale: f32,
    noise_offset: f32,
    max_range: f32,
    output_scale: f32,
    clipping_factor: f32,

    amplitude_filter: AdaptiveSmoothingFilter,
    floor_tracker: NoiseFloorTracker,
    output_filter: AdaptiveSmoothingFilter,

    previous_read: f32,
    previous_time_us: u64,
    previous_rate: f32,
    primed: bool,
    output: f32,
}

impl EnvelopeFollower {
    /// Build a follower whose noise floor looks at the last `floor_window`
    /// amplitudes.
    ///
    /// # Panics
    /// Panics if `floor_window` or `config.smoothing_window` is 0
    pub fn new(config: &EnvelopeConfig, floor_window: usize) -> Self {
        Self {
            input_gain: config.input_gain,
            amplitude_scale: config.amplitude_scale,
            noise_offset: config.noise_offset,
            max_range: config.max_range,
            output_scale: config.output_scale,
            clipping_factor: config.clipping_factor,
            amplitude_filter: AdaptiveSmoothingFilter::with_gain(
                config.smoothing_window,
                config.smoothing_gain,
            ),
            floor_tracker: NoiseFloorTracker::new(floor_window, config.ignore_same),
            output_filter: AdaptiveSmoothingFilter::with_gain(
                config.smoothing_window,
                config.smoothing_gain,
            ),
            previous_read: 0.0,
            previous_time_us: 0,
            previous_rate: 0.0,
            primed: false,
            output: 0.0,
        }
    }

    /// Process one sample taken at `now_us` and return the new output.
    #[inline]
    pub fn update(&mut self, raw: u16, now_us: u64) -> f32 {
        self.step(raw, now_us).output
    }

    /// Process one sample and report every intermediate value.
    pub fn step(&mut self, raw: u16, now_us: u64) -> EnvelopeStep {
        let read = f32::from(raw) * self.input_gain;
        let change = read - self.previous_read;
        let elapsed_us = now_us.saturating_sub(self.previous_time_us);

        let reused_rate = self.primed && elapsed_us == 0;
        let rate = if !self.primed {
            0.0
        } else if reused_rate {
            self.previous_rate
        } else {
            finite_or_zero(change / elapsed_us as f32)
        };

        let amplitude = self
            .amplitude_filter
            .filter(finite_or_zero(rate.abs() * self.amplitude_scale));
        let floor = self.floor_tracker.filter(amplitude);

        // max/min instead of clamp: a misconfigured negative range must not panic
        let normalized = finite_or_zero(amplitude - floor - self.noise_offset)
            .max(0.0)
            .min(self.max_range);

        let smoothed = self
            .output_filter
            .filter(finite_or_zero(normalized / self.output_scale / self.clipping_factor));
        let output = finite_or_zero(smoothed).clamp(0.0, 1.0);

        self.previous_read = read;
        self.previous_time_us = now_us;
        self.previous_rate = rate;
        self.primed = true;
        self.output = output;

        EnvelopeStep {
            read,
            change,
            elapsed_us,
            rate,
            amplitude,
            floor,
            normalized,
            output,
            reused_rate,
        }
    }

    /// Last computed output, in [0, 1].
    #[inline]
    pub fn output(&self) -> f32 {
        self.output
    }

    /// `output() > threshold`
    #[inline]
    pub fn talking(&self, threshold: f32) -> bool {
        self.output > threshold
    }

    /// Current noise floor estimate in amplitude units.
    pub fn floor(&self) -> f32 {
        self.floor_tracker.floor()
    }
}

#[inline]
fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvelopeConfig;

    const PERIOD_US: u64 = 64;

    fn speech_like(i: u64) -> u16 {
        // 500 Hz-ish square-ish swing of +-600 codes around mid-scale
        if (i / 8) % 2 == 0 {
            2648
        } else {
            1448
        }
    }

    #[test]
    fn test_silence_stays_at_zero() {
        let mut follower = EnvelopeFollower::new(&EnvelopeConfig::amplified(), 100);
        let mut now = 0;
        for _ in 0..2_000 {
            now += PERIOD_US;
            let level = follower.update(2048, now);
            assert!((0.0..=1.0).contains(&level));
        }
        assert_eq!(follower.output(), 0.0);
        assert!(!follower.talking(0.2));
    }

    #[test]
    fn test_large_swings_raise_level() {
        let mut follower = EnvelopeFollower::new(&EnvelopeConfig::amplified(), 100);
        let mut now = 0;
        let mut peak = 0.0_f32;
        for i in 0..4_000 {
            now += PERIOD_US;
            let level = follower.update(speech_like(i), now);
            assert!((0.0..=1.0).contains(&level));
            if i >= 3_000 {
                peak = peak.max(level);
            }
        }
        assert!(peak > 0.5, "peak level was {}", peak);
    }

    #[test]
    fn test_zero_elapsed_reuses_previous_rate() {
        let mut follower = EnvelopeFollower::new(&EnvelopeConfig::amplified(), 100);
        follower.update(2048, 100);
        let first = follower.step(3000, 200);
        assert!(!first.reused_rate);

        let repeated = follower.step(1000, 200);
        assert!(repeated.reused_rate);
        assert_eq!(repeated.elapsed_us, 0);
        assert_eq!(repeated.rate, first.rate);
        assert!(repeated.output.is_finite());
        assert!((0.0..=1.0).contains(&repeated.output));
    }

    #[test]
    fn test_step_reports_scaled_read() {
        let mut follower = EnvelopeFollower::new(&EnvelopeConfig::amplified(), 100);
        let priming = follower.step(0, 0);
        assert_eq!(priming.rate, 0.0);

        let step = follower.step(1000, 10);
        assert!((step.read - 200.0).abs() < 1e-3);
        assert!((step.change - 200.0).abs() < 1e-3);
        assert_eq!(step.elapsed_us, 10);
        assert!((step.rate - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalized_is_clamped_to_range() {
        let config = EnvelopeConfig::amplified();
        let mut follower = EnvelopeFollower::new(&config, 100);
        let mut now = 0;
        for i in 0..500u64 {
            now += 1;
            let raw = if i % 2 == 0 { 0 } else { 4095 };
            let step = follower.step(raw, now);
            assert!(step.normalized >= 0.0);
            assert!(step.normalized <= config.max_range);
            assert!((0.0..=1.0).contains(&step.output));
        }
    }

    #[test]
    fn test_backwards_clock_is_guarded() {
        let mut follower = EnvelopeFollower::new(&EnvelopeConfig::unscaled(), 10);
        follower.update(100, 1_000);
        let step = follower.step(4000, 500);
        assert!(step.reused_rate);
        assert!((0.0..=1.0).contains(&step.output));
    }
}
