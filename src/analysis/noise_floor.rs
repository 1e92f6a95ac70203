//! Noise floor tracker
//!
//! Estimates the ambient level of a signal from the minima it keeps
//! producing. Each input goes into a sliding window; the minimum of that
//! window is appended to a short minima history and the tracker reports the
//! mean of the history.
//!
//! # Warm-up
//! The minima history starts full of zeros, so the reported floor starts at
//! zero and rises as real minima are recorded. This bias is deliberate: the
//! floor is subtracted from the envelope and starting low keeps early speech
//! visible.
//!
//! # Repeated minima
//! With `ignore_same` set, a minimum equal to the last recorded one is not
//! pushed again. A long silent stretch then leaves the older history intact
//! instead of flooding it with one value.
//!
//! The sliding minimum is kept in a bounded monotonic queue, amortised O(1)
//! per input instead of rescanning the whole window.

use super::window::Window;

#[derive(Debug, Clone)]
pub struct NoiseFloorTracker {
    inputs: MinQueue,
    minima: Window<f32>,
    ignore_same: bool,
}

impl NoiseFloorTracker {
    /// Create a tracker over `capacity` inputs with a minima history of
    /// `max(1, capacity / 10)` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize, ignore_same: bool) -> Self {
        Self::with_minima_capacity(capacity, (capacity / 10).max(1), ignore_same)
    }

    /// # Panics
    /// Panics if either capacity is 0
    pub fn with_minima_capacity(capacity: usize, minima_capacity: usize, ignore_same: bool) -> Self {
        Self {
            inputs: MinQueue::new(capacity),
            minima: Window::zeroed(minima_capacity),
            ignore_same,
        }
    }

    /// Feed one value and return the current floor estimate.
    #[inline]
    pub fn filter(&mut self, value: f32) -> f32 {
        let current_min = self.inputs.push(value);
        let last_stored = self.minima.newest().unwrap_or(0.0);

        if current_min != last_stored || !self.ignore_same {
            self.minima.push(current_min);
        }

        self.floor()
    }

    /// Mean of the minima history.
    pub fn floor(&self) -> f32 {
        let sum: f32 = self.minima.iter().sum();
        sum / self.minima.len() as f32
    }

    /// Minimum of the input window, `None` before the first input.
    pub fn current_min(&self) -> Option<f32> {
        self.inputs.min()
    }

    /// Minima history, oldest first.
    pub fn minima(&self) -> impl Iterator<Item = f32> + '_ {
        self.minima.iter()
    }

    pub fn ignore_same(&self) -> bool {
        self.ignore_same
    }

    pub fn input_capacity(&self) -> usize {
        self.inputs.window
    }

    pub fn minima_capacity(&self) -> usize {
        self.minima.capacity()
    }
}

/// Sliding-window minimum over the last `window` pushes.
///
/// Entries are kept in increasing value order with their sequence numbers;
/// the front is always the minimum of the window.
#[derive(Debug, Clone)]
struct MinQueue {
    entries: Box<[(u64, f32)]>,
    head: usize,
    len: usize,
    window: usize,
    next_seq: u64,
}

impl MinQueue {
    fn new(window: usize) -> Self {
        assert!(window > 0, "window capacity must be greater than 0");
        Self {
            entries: vec![(0, 0.0); window].into_boxed_slice(),
            head: 0,
            len: 0,
            window,
            next_seq: 0,
        }
    }

    fn push(&mut self, value: f32) -> f32 {
        let seq = self.next_seq;
        self.next_seq += 1;

        // Expire the entry that falls out of the window once `seq` is in
        while self.len > 0 && self.entries[self.head].0 + self.window as u64 <= seq {
            self.head = (self.head + 1) % self.window;
            self.len -= 1;
        }

        // Larger (or equal) values can never be the minimum again
        while self.len > 0 {
            let back = (self.head + self.len - 1) % self.window;
            if self.entries[back].1 >= value {
                self.len -= 1;
            } else {
                break;
            }
        }

        let tail = (self.head + self.len) % self.window;
        self.entries[tail] = (seq, value);
        self.len += 1;

        self.entries[self.head].1
    }

    fn min(&self) -> Option<f32> {
        if self.len == 0 {
            None
        } else {
            Some(self.entries[self.head].1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_min(values: &[f32], window: usize) -> f32 {
        let start = values.len().saturating_sub(window);
        values[start..].iter().copied().fold(f32::MAX, f32::min)
    }

    #[test]
    fn test_minima_history_starts_with_zeros() {
        let tracker = NoiseFloorTracker::new(100, true);
        assert_eq!(tracker.minima_capacity(), 10);
        assert!(tracker.minima().all(|v| v == 0.0));
        assert_eq!(tracker.floor(), 0.0);
        assert_eq!(tracker.current_min(), None);
    }

    #[test]
    fn test_constant_input_with_ignore_same_pushes_once() {
        let mut tracker = NoiseFloorTracker::new(100, true);

        let first = tracker.filter(5.0);
        assert!((first - 0.5).abs() < 1e-6);
        let expected = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0];
        assert_eq!(tracker.minima().collect::<Vec<_>>(), expected);

        for _ in 0..500 {
            let floor = tracker.filter(5.0);
            assert!((floor - 0.5).abs() < 1e-6);
        }
        assert_eq!(tracker.minima().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_constant_input_without_ignore_same_fills_history() {
        let mut tracker = NoiseFloorTracker::new(100, false);
        for _ in 0..10 {
            tracker.filter(5.0);
        }
        assert!((tracker.floor() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_small_capacity_keeps_one_minimum() {
        let mut tracker = NoiseFloorTracker::new(5, true);
        assert_eq!(tracker.minima_capacity(), 1);
        assert_eq!(tracker.filter(3.0), 3.0);
        assert_eq!(tracker.filter(1.0), 1.0);
    }

    #[test]
    fn test_increasing_sequence_floor_never_drops_below_first_value() {
        let mut tracker = NoiseFloorTracker::new(20, true);
        let first = 1.0;
        let mut floors = Vec::new();
        for i in 0..20 {
            floors.push(tracker.filter(first + i as f32));
        }
        // Input window is full and its minimum is still the first value
        assert_eq!(tracker.current_min(), Some(first));
        // One push of `first`, every other slot is still a warm-up zero
        assert!((floors[19] - first / 2.0).abs() < 1e-6);
        assert!(floors.windows(2).all(|pair| pair[1] >= pair[0]));

        // Without de-duplication the history converges to the first value
        let mut tracker = NoiseFloorTracker::new(20, false);
        let mut floor = 0.0;
        for i in 0..20 {
            floor = tracker.filter(first + i as f32);
            assert!(floor <= first + 1e-6);
        }
        assert!((floor - first).abs() < 1e-6);
    }

    #[test]
    fn test_sliding_minimum_matches_full_scan() {
        let mut queue = MinQueue::new(17);
        let mut seen = Vec::new();
        let mut state = 12345u32;
        for _ in 0..2000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let value = ((state >> 16) % 500) as f32;
            seen.push(value);
            assert_eq!(queue.push(value), brute_force_min(&seen, 17));
        }
    }

    #[test]
    fn test_tracker_follows_rising_floor() {
        let mut tracker = NoiseFloorTracker::new(10, true);
        for _ in 0..200 {
            tracker.filter(2.0);
        }
        let low = tracker.floor();
        for _ in 0..200 {
            tracker.filter(8.0);
        }
        assert!(tracker.floor() > low);
        assert_eq!(tracker.current_min(), Some(8.0));
    }
}
