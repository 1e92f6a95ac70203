//! Adaptive smoothing filter
//!
//! Blends the newest value with the average of a short history:
//!
//! ```text
//! history.push(value)
//! output = gain * value + (1 - gain) * mean(history)
//! ```
//!
//! `gain = 1` is a passthrough, `gain = 0` is a plain moving average. The
//! history starts empty and grows to its capacity, so the first outputs only
//! average what has been seen so far.

use super::window::Window;

/// Default blend weight of the newest value.
pub const DEFAULT_SMOOTHING_GAIN: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct AdaptiveSmoothingFilter {
    gain: f32,
    history: Window<f32>,
}

impl AdaptiveSmoothingFilter {
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        Self {
            gain: DEFAULT_SMOOTHING_GAIN,
            history: Window::empty(capacity),
        }
    }

    pub fn with_gain(capacity: usize, gain: f32) -> Self {
        let mut filter = Self::new(capacity);
        filter.set_gain(gain);
        filter
    }

    /// Replace the blend weight. Values outside [0, 1] extrapolate instead of
    /// blending; nothing clamps them here.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Push `value` into the history and return the blended output.
    #[inline]
    pub fn filter(&mut self, value: f32) -> f32 {
        self.history.push(value);

        let sum: f32 = self.history.iter().sum();
        let avg = sum / self.history.len() as f32;

        self.gain * value + (1.0 - self.gain) * avg
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain_is_passthrough() {
        let mut filter = AdaptiveSmoothingFilter::with_gain(5, 1.0);
        for value in [3.0, -7.5, 1000.0, 0.0, 42.25, 1e-3] {
            assert_eq!(filter.filter(value), value);
        }
    }

    #[test]
    fn test_constant_input_stabilizes() {
        let mut filter = AdaptiveSmoothingFilter::new(5);
        assert_eq!(filter.gain(), 0.2);

        let outputs: Vec<f32> = (0..6).map(|_| filter.filter(10.0)).collect();
        for output in outputs {
            assert!((output - 10.0).abs() < 1e-5, "output was {}", output);
        }
    }

    #[test]
    fn test_zero_gain_is_moving_average() {
        let mut filter = AdaptiveSmoothingFilter::with_gain(3, 0.0);
        assert_eq!(filter.filter(3.0), 3.0);
        assert_eq!(filter.filter(6.0), 4.5);
        assert_eq!(filter.filter(9.0), 6.0);
        // 3.0 is evicted
        assert_eq!(filter.filter(12.0), 9.0);
    }

    #[test]
    fn test_blend_against_partial_history() {
        let mut filter = AdaptiveSmoothingFilter::new(5);
        filter.filter(0.0);
        // history [0, 10] -> avg 5 -> 0.2 * 10 + 0.8 * 5
        let output = filter.filter(10.0);
        assert!((output - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = AdaptiveSmoothingFilter::with_gain(4, 0.0);
        filter.filter(100.0);
        filter.filter(100.0);
        filter.reset();
        assert_eq!(filter.filter(2.0), 2.0);
    }
}
