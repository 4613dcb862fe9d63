//! Cooperative cancellation of a training run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking a running trainer to stop.
///
/// Clones share the same flag. The trainer checks it between batches and
/// between epochs and, once raised, returns the best model seen so far.
///
/// ```rust
/// use cogcam_train::StopSignal;
///
/// let signal = StopSignal::new();
/// let handle = signal.clone();
/// handle.raise();
/// assert!(signal.is_raised());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the trainer to stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether a stop was requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
