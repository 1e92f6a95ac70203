//! Pipeline counters.
//!
//! Cheap relaxed atomics bumped from the sampling context and read by the
//! frame loop / CLI. Nothing here blocks, so the sampler can record from a
//! timer callback.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::analysis::EnvelopeStep;

/// Point-in-time copy of [`PipelineCounters`] for logs and JSON reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Sampler ticks processed
    pub ticks: u64,
    /// Ticks where the elapsed-time guard reused the previous rate
    pub zero_elapsed: u64,
    /// Ticks whose output hit the 1.0 ceiling
    pub saturated: u64,
    /// Samples dropped because the mailbox was full
    pub mailbox_overruns: u64,
    /// Window snapshots copied out of the critical section
    pub window_snapshots: u64,
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    ticks: AtomicU64,
    zero_elapsed: AtomicU64,
    saturated: AtomicU64,
    mailbox_overruns: AtomicU64,
    window_snapshots: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one envelope update.
    #[inline]
    pub fn record_step(&self, step: &EnvelopeStep) {
        self.record_tick();
        if step.reused_rate {
            self.zero_elapsed.fetch_add(1, Ordering::Relaxed);
        }
        if step.output >= 1.0 {
            self.saturated.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_overrun(&self) {
        self.mailbox_overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_window_snapshot(&self) {
        self.window_snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            zero_elapsed: self.zero_elapsed.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
            mailbox_overruns: self.mailbox_overruns.load(Ordering::Relaxed),
            window_snapshots: self.window_snapshots.load(Ordering::Relaxed),
        }
    }
}
