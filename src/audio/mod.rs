// Audio module - hardware boundary of the sampler
//
// Sources produce ADC codes, clocks timestamp them, timers decide when the
// sampler runs, and the mailbox carries samples out of the timer context.

pub mod clock;
#[cfg(feature = "live")]
pub mod cpal_source;
pub mod mailbox;
pub mod source;
pub mod synthetic;
pub mod timer;

// Re-export commonly used types for convenience
pub use clock::{ManualClock, MicrosClock, SystemClock};
#[cfg(feature = "live")]
pub use cpal_source::{open_default_input, CpalMicSource, LiveInput};
pub use mailbox::{MailboxConsumer, MailboxProducer, SampleMailbox, TimedSample};
pub use source::{to_adc_sample, AnalogSource, ReplaySource};
pub use synthetic::SyntheticMic;
pub use timer::{ManualTimer, PeriodicTimer, ThreadTimer, TickCallback, MAX_TIMER_FREQUENCY_HZ};
