/// Cancellation and progress reporting threaded through every layer of a
/// cook. Cancellation is cooperative: implementations are expected to poll
/// `check_cancellation` at natural loop boundaries, nothing is preempted.
pub trait ProgressTracker: Send + Sync {
    fn check_cancellation(&self) -> bool;

    fn report_progress(
        &self,
        current_count: u64,
        total_count: u64,
        text: &str,
    );
}
