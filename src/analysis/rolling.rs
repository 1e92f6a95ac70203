// RollingWindowStatistic - running mean over raw ADC samples
//
// Written from the sampling interrupt (`add` is O(1) and allocation-free) and
// queried from the main loop (`std_dev`, `min`, `max` are full O(N) passes).
//
// Warm-up: the window starts full of zeros and N is always the capacity, so
// early statistics are biased towards zero until `capacity` samples arrived.
//
// Running mean is `sum / N` over an exact integer sum updated with
// `sum += new - evicted`. Standard deviation is never maintained
// incrementally.

use super::window::Window;

/// Fixed-capacity window of raw samples with an incrementally maintained mean.
#[derive(Debug, Clone)]
pub struct RollingWindowStatistic {
    window: Window<u16>,
    sum: u64,
}

impl RollingWindowStatistic {
    /// Create a statistic over the last `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Window::zeroed(capacity),
            sum: 0,
        }
    }

    /// Insert a sample and return the new running mean.
    #[inline]
    pub fn add(&mut self, sample: u16) -> f64 {
        let evicted = self.window.push(sample).unwrap_or(0);
        self.sum = self.sum - u64::from(evicted) + u64::from(sample);
        self.mean()
    }

    /// Running mean of the window contents (unfilled slots count as zero).
    #[inline]
    pub fn mean(&self) -> f64 {
        self.sum as f64 / self.window.capacity() as f64
    }

    /// Population standard deviation, computed with a full pass.
    pub fn std_dev(&self) -> f64 {
        std_dev_of(self.window.iter(), self.mean(), self.window.capacity())
    }

    pub fn min(&self) -> u16 {
        self.window.iter().min().unwrap_or(0)
    }

    pub fn max(&self) -> u16 {
        self.window.iter().max().unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Copy the current contents into a freshly allocated snapshot.
    pub fn snapshot(&self) -> WindowSnapshot {
        let mut snapshot = WindowSnapshot::with_capacity(self.capacity());
        self.snapshot_into(&mut snapshot);
        snapshot
    }

    /// Copy the current contents into `snapshot`, reusing its storage.
    ///
    /// Only a memcpy-sized amount of work happens here, which is what the
    /// main loop does while the sampling interrupt is held off.
    pub fn snapshot_into(&self, snapshot: &mut WindowSnapshot) {
        snapshot.values.clear();
        snapshot.values.extend(self.window.iter());
        snapshot.mean = self.mean();
    }
}

/// Point-in-time copy of a [`RollingWindowStatistic`].
///
/// Statistics over a snapshot are identical to the ones the live window
/// would have produced at the moment it was taken.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    values: Vec<u16>,
    mean: f64,
}

impl WindowSnapshot {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            mean: 0.0,
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        std_dev_of(self.values.iter().copied(), self.mean, self.values.len())
    }

    pub fn min(&self) -> u16 {
        self.values.iter().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> u16 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }
}

fn std_dev_of(values: impl Iterator<Item = u16>, mean: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let dev_sum: f64 = values
        .map(|value| {
            let dev = f64::from(value) - mean;
            dev * dev
        })
        .sum();
    (dev_sum / count as f64).sqrt()
}
