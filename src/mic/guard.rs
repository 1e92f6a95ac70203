use once_cell::sync::OnceCell;

use crate::error::MicError;

/// One-shot claim on the sampling interrupt.
///
/// The first `claim` wins and records its channel; every later claim fails
/// with `MicError::AlreadyConstructed`. The guard holds only the channel
/// name, never a pointer to the microphone it protects.
#[derive(Debug)]
pub struct InstanceGuard {
    claimed: OnceCell<String>,
}

impl InstanceGuard {
    pub const fn new() -> Self {
        Self {
            claimed: OnceCell::new(),
        }
    }

    pub fn claim(&self, channel: &str) -> Result<(), MicError> {
        self.claimed
            .set(channel.to_string())
            .map_err(|_| MicError::AlreadyConstructed {
                channel: self.claimed_by().unwrap_or(channel).to_string(),
            })
    }

    /// Channel of the instance that holds the claim, if any.
    pub fn claimed_by(&self) -> Option<&str> {
        self.claimed.get().map(String::as_str)
    }
}

impl Default for InstanceGuard {
    fn default() -> Self {
        Self::new()
    }
}
