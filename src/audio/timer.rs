//! Periodic sampling timers
//!
//! On a microcontroller the sampler runs in a hardware timer interrupt. On a
//! desktop [`ThreadTimer`] emulates it with a dedicated thread that fires the
//! callback on a fixed schedule, and [`ManualTimer`] lets tests fire ticks by
//! hand.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::MicError;

/// Callback run on every timer tick.
pub type TickCallback = Box<dyn FnMut() + Send + 'static>;

/// A timer that can run one callback at a fixed rate.
pub trait PeriodicTimer {
    /// Register `callback` to run `frequency_hz` times per second.
    ///
    /// # Errors
    /// `MicError::TimerFailed` if the rate is 0 or above
    /// [`MAX_TIMER_FREQUENCY_HZ`], a callback is already registered, or the
    /// timer could not be started
    fn register(&mut self, frequency_hz: u32, callback: TickCallback) -> Result<(), MicError>;
}

/// Fastest supported tick rate: one tick per microsecond, the resolution of
/// the sample timestamps.
pub const MAX_TIMER_FREQUENCY_HZ: u32 = 1_000_000;

fn check_frequency(frequency_hz: u32) -> Result<(), MicError> {
    if frequency_hz == 0 || frequency_hz > MAX_TIMER_FREQUENCY_HZ {
        return Err(MicError::TimerFailed {
            reason: format!(
                "frequency must be in 1..={} Hz (got {})",
                MAX_TIMER_FREQUENCY_HZ, frequency_hz
            ),
        });
    }
    Ok(())
}

/// Periods the thread may fall behind before it stops catching up and
/// re-anchors its schedule.
const MAX_CATCH_UP_PERIODS: u32 = 64;

/// Thread-backed periodic timer.
///
/// Ticks are scheduled against absolute deadlines so sleep jitter does not
/// accumulate. Stopped and joined on drop.
pub struct ThreadTimer {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            missed: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Stop the timer thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[ThreadTimer] Timer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Callbacks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Deadlines skipped because the thread fell too far behind.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PeriodicTimer for ThreadTimer {
    fn register(&mut self, frequency_hz: u32, mut callback: TickCallback) -> Result<(), MicError> {
        check_frequency(frequency_hz)?;
        if self.handle.is_some() {
            return Err(MicError::TimerFailed {
                reason: "a callback is already registered".to_string(),
            });
        }

        let period = Duration::from_nanos(1_000_000_000 / u64::from(frequency_hz));
        let running = Arc::clone(&self.running);
        let ticks = Arc::clone(&self.ticks);
        let missed = Arc::clone(&self.missed);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("mic-timer".to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                while running.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now < deadline {
                        std::thread::sleep(deadline - now);
                    } else if now - deadline > period * MAX_CATCH_UP_PERIODS {
                        let behind = ((now - deadline).as_nanos() / period.as_nanos()) as u64;
                        missed.fetch_add(behind, Ordering::Relaxed);
                        deadline = now;
                    }

                    callback();
                    ticks.fetch_add(1, Ordering::Relaxed);
                    deadline += period;
                }
            })
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                MicError::TimerFailed {
                    reason: err.to_string(),
                }
            })?;

        tracing::debug!(frequency_hz, "timer thread started");
        self.handle = Some(handle);
        Ok(())
    }
}

/// Timer driven explicitly by the caller.
#[derive(Default)]
pub struct ManualTimer {
    frequency_hz: u32,
    callback: Option<TickCallback>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the registered callback `count` times.
    ///
    /// # Returns
    /// Ticks actually fired (0 when nothing is registered)
    pub fn fire(&mut self, count: usize) -> usize {
        match self.callback.as_mut() {
            Some(callback) => {
                for _ in 0..count {
                    callback();
                }
                count
            }
            None => 0,
        }
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    /// Tick period in microseconds, or 0 when nothing is registered.
    pub fn period_us(&self) -> u64 {
        if self.frequency_hz == 0 {
            0
        } else {
            1_000_000 / u64::from(self.frequency_hz)
        }
    }
}

impl PeriodicTimer for ManualTimer {
    fn register(&mut self, frequency_hz: u32, callback: TickCallback) -> Result<(), MicError> {
        check_frequency(frequency_hz)?;
        if self.callback.is_some() {
            return Err(MicError::TimerFailed {
                reason: "a callback is already registered".to_string(),
            });
        }
        self.frequency_hz = frequency_hz;
        self.callback = Some(callback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_timer_fires_callback() {
        let counter = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&counter);
        let mut timer = ManualTimer::new();
        assert_eq!(timer.fire(3), 0);

        timer
            .register(
                15_625,
                Box::new(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(timer.period_us(), 64);
        assert_eq!(timer.fire(10), 10);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_manual_timer_rejects_second_registration() {
        let mut timer = ManualTimer::new();
        timer.register(100, Box::new(|| {})).unwrap();
        let err = timer.register(100, Box::new(|| {})).unwrap_err();
        assert!(matches!(err, MicError::TimerFailed { .. }));
    }

    #[test]
    fn test_zero_frequency_is_rejected() {
        let mut timer = ThreadTimer::new();
        assert!(timer.register(0, Box::new(|| {})).is_err());
        assert!(!timer.is_running());
    }

    #[test]
    fn test_sub_microsecond_period_is_rejected() {
        let mut timer = ThreadTimer::new();
        let err = timer.register(2_000_000_000, Box::new(|| {})).unwrap_err();
        assert!(matches!(err, MicError::TimerFailed { .. }));
        assert!(!timer.is_running());
        assert_eq!(timer.ticks(), 0);

        let mut manual = ManualTimer::new();
        assert!(manual
            .register(MAX_TIMER_FREQUENCY_HZ + 1, Box::new(|| {}))
            .is_err());
        manual
            .register(MAX_TIMER_FREQUENCY_HZ, Box::new(|| {}))
            .unwrap();
        assert_eq!(manual.period_us(), 1);
    }

    #[test]
    fn test_thread_timer_ticks_and_stops() {
        let counter = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&counter);
        let mut timer = ThreadTimer::new();
        timer
            .register(
                1_000,
                Box::new(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(timer.is_running());

        std::thread::sleep(Duration::from_millis(50));
        timer.stop();
        assert!(!timer.is_running());

        let fired = counter.load(Ordering::SeqCst);
        assert!(fired > 5, "only {} ticks fired", fired);
        assert_eq!(timer.ticks(), fired);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }
}
