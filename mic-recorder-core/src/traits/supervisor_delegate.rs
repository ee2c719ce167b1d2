use crate::models::error::CaptureError;
use crate::models::segment::RecordingResult;
use crate::models::state::SupervisorPhase;

/// Observer for supervisor events.
///
/// All methods are called synchronously from the supervisor's loop, so
/// implementations must return quickly.
pub trait SupervisorDelegate: Send + Sync {
    /// Called on every state-entry boundary.
    fn on_phase_changed(&self, phase: SupervisorPhase);

    /// Called when a segment file has been finalized.
    fn on_segment_finished(&self, result: &RecordingResult);

    /// Called when a segment fails, with the updated failure count.
    fn on_segment_failed(&self, error: &CaptureError, consecutive_failures: u32);
}
