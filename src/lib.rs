// Talk Envelope Core - microphone talk activity detection
// Interrupt-driven sampling with a bounded, allocation-free DSP pipeline

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod frame;
pub mod mic;
pub mod telemetry;

// Re-exports for convenience
pub use config::{AppConfig, SamplingStrategy};
pub use error::{ErrorCode, MicError};
pub use mic::{Mic, MicLevel, MicSampler};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ManualClock;
    use crate::mic::InstanceGuard;
    use std::sync::Arc;

    #[test]
    fn test_module_structure() {
        let guard = InstanceGuard::new();
        let clock = Arc::new(ManualClock::new(0));
        let mut mic = Mic::with_guard(&guard, "A0", || 2048u16, &AppConfig::default())
            .unwrap()
            .with_clock(clock.clone());
        clock.advance(64);
        mic.update();
        assert_eq!(mic.get(), 0.0);
        assert!(!mic.talking(0.2));
    }
}
