use std::time::Duration;

use super::device::Device;
use crate::cancel::CancellationToken;

/// Recording supervisor state machine.
///
/// State transitions:
/// ```text
/// startup → discovering_device ⇄ backoff_short
///                 ↓
///          admission_check ⇄ backoff_long (disk space)
///                 ↓      ↑
///             recording ─┘ (success)
///                 ↓ (failure: rediscover)
///        backoff_short / backoff_long (failure threshold)
///
/// any state → shutdown once cancellation is observed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorPhase {
    Startup,
    DiscoveringDevice,
    AdmissionCheck,
    Recording,
    BackoffShort,
    BackoffLong,
    Shutdown,
}

/// Why the supervisor is pausing. Decides the delay and where to go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffReason {
    /// Selector found nothing; retry discovery.
    NoDevice,
    /// One segment failed; device was already rediscovered.
    SegmentFailed,
    /// Admission check refused; device selection is kept.
    DiskSpaceLow,
    /// Failure threshold reached; counter resets after the pause.
    PersistentFailures,
}

impl BackoffReason {
    /// Phase the supervisor reports while waiting for this reason.
    pub fn phase(&self) -> SupervisorPhase {
        match self {
            Self::NoDevice | Self::SegmentFailed => SupervisorPhase::BackoffShort,
            Self::DiskSpaceLow | Self::PersistentFailures => SupervisorPhase::BackoffLong,
        }
    }
}

/// Mutable supervisor state.
///
/// Owned by the supervisor. The cancellation token is the only part written
/// from outside the main loop, and it only ever goes from false to true.
#[derive(Debug)]
pub struct SupervisorState {
    pub current_device: Option<Device>,
    pub consecutive_failures: u32,
    pub cancel: CancellationToken,
    pub pending_backoff: Option<(BackoffReason, Duration)>,
}

impl SupervisorState {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            current_device: None,
            consecutive_failures: 0,
            cancel,
            pending_backoff: None,
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
