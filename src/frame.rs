//! Animation frame loop
//!
//! Polls a [`MicLevel`] once per frame at a fixed rate and hands each
//! [`FrameReport`] to a sink. What the sink does with it (mouth servo, LED
//! face, JSON lines) is not this module's concern.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::FrameConfig;
use crate::mic::MicLevel;

/// What the main loop saw on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub index: u64,
    pub timestamp_ms: u64,
    pub level: f32,
    pub talking: bool,
}

pub struct FrameLoop {
    level: MicLevel,
    config: FrameConfig,
}

impl FrameLoop {
    pub fn new(level: MicLevel, config: FrameConfig) -> Self {
        Self { level, config }
    }

    /// Frame period derived from `fps` (a zero rate is treated as 1 fps).
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.config.fps.max(1)))
    }

    /// Sample the level once, without pacing.
    pub fn report(&self, index: u64, timestamp_ms: u64) -> FrameReport {
        let level = self.level.level();
        FrameReport {
            index,
            timestamp_ms,
            level,
            talking: level > self.config.talk_threshold,
        }
    }

    /// Run `frames` paced frames, calling `sink` once per frame.
    ///
    /// # Returns
    /// Frames that started late because the previous one overran its period
    pub fn run<F: FnMut(&FrameReport)>(&mut self, frames: u64, mut sink: F) -> u64 {
        let period = self.period();
        let start = Instant::now();
        let mut deadline = start;
        let mut late = 0;
        let mut was_talking = false;

        for index in 0..frames {
            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
            } else if index > 0 && now - deadline > period {
                late += 1;
            }

            let report = self.report(index, start.elapsed().as_millis() as u64);
            if report.talking != was_talking {
                tracing::debug!(
                    frame = index,
                    level = report.level,
                    talking = report.talking,
                    "talk state changed"
                );
                was_talking = report.talking;
            }
            if self.config.log_every_n_frames > 0 && index % self.config.log_every_n_frames == 0 {
                let counters = self.level.counters();
                tracing::info!(
                    frame = index,
                    level = report.level,
                    ticks = counters.ticks,
                    zero_elapsed = counters.zero_elapsed,
                    saturated = counters.saturated,
                    mailbox_overruns = counters.mailbox_overruns,
                    "frame"
                );
            }

            sink(&report);
            deadline += period;
        }

        if late > 0 {
            tracing::warn!(late, frames, "frame loop fell behind");
        }
        late
    }
}
