//! Bounded busy-wait polling.
//!
//! There is no timer during early boot, so every wait on the hardware is a fixed
//! number of register samples. The outcome is returned to the caller, which
//! decides whether running out of retries is fatal.

/// Number of samples taken by the controller's waits
pub const DEFAULT_POLL_BUDGET: u32 = 0xFFFF;

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub enum PollOutcome {
    /// The condition became true within the budget
    Ready,
    /// The budget ran out first
    TimedOut,
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, PollOutcome::TimedOut)
    }

    /// Turn a timeout into `err`, for call sites where a timeout is fatal
    pub fn ready_or<E>(self, err: E) -> Result<(), E> {
        match self {
            PollOutcome::Ready => Ok(()),
            PollOutcome::TimedOut => Err(err),
        }
    }
}

/// Sample `done` up to `budget` times, stopping as soon as it returns true.
pub fn poll_until(budget: u32, mut done: impl FnMut() -> bool) -> PollOutcome {
    for _ in 0..budget {
        if done() {
            return PollOutcome::Ready;
        }
    }
    trace!("Poll budget of {} exhausted", budget);
    PollOutcome::TimedOut
}
