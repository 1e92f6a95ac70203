// State shared between the sampling context and the main loop
//
// - LevelCell: the envelope output published as one atomic word, so a reader
//   sees either the previous or the new level, never a mix.
// - SharedStatistic: the raw window plus its running sum, which span several
//   words and are only ever touched inside a short critical section.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::analysis::RollingWindowStatistic;

/// Single-word f32 publication slot.
#[derive(Debug, Default)]
pub struct LevelCell {
    bits: AtomicU32,
}

impl LevelCell {
    pub fn new(level: f32) -> Self {
        Self {
            bits: AtomicU32::new(level.to_bits()),
        }
    }

    #[inline]
    pub fn store(&self, level: f32) {
        self.bits.store(level.to_bits(), Ordering::Release);
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

pub type SharedStatistic = Arc<Mutex<RollingWindowStatistic>>;

/// Enter the critical section around the statistic.
///
/// Poisoning is ignored: `add` has no panicking path between its two
/// field writes.
#[inline]
pub fn enter(statistic: &SharedStatistic) -> MutexGuard<'_, RollingWindowStatistic> {
    statistic.lock().unwrap_or_else(PoisonError::into_inner)
}
