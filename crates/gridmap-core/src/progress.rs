use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation shared between a render driver and its workers.
///
/// Clones observe the same flag. Workers poll [`is_cancelled`](Self::is_cancelled)
/// between stages; nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct ProgressToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<ProgressToken>>,
}

impl ProgressToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled along with `self`, but whose own
    /// cancellation does not reach `self` or its other children.
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}
