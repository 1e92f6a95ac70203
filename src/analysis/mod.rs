// Analysis module - DSP building blocks for the talk activity pipeline
//
// Everything here is pure, allocation-free after construction, and
// single-threaded; the mic module decides which thread owns each instance.
//
// Pipeline (filtered envelope strategy):
// - EnvelopeFollower: gain → rate of change → smoothing → noise floor removal
// - AdaptiveSmoothingFilter: short-history blend used twice by the follower
// - NoiseFloorTracker: rolling minimum of minima
// - RollingWindowStatistic: raw sample window for the direct strategy

pub mod envelope;
pub mod noise_floor;
pub mod rolling;
pub mod smoothing;
pub mod window;

pub use envelope::{EnvelopeFollower, EnvelopeStep};
pub use noise_floor::NoiseFloorTracker;
pub use rolling::{RollingWindowStatistic, WindowSnapshot};
pub use smoothing::{AdaptiveSmoothingFilter, DEFAULT_SMOOTHING_GAIN};
pub use window::Window;
