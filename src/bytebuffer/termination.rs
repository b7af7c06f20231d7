//! Cancellation signal owned by the surrounding processing task

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a task sets when it is aborted.
///
/// Cheap to clone; every clone observes the same flag. Anything that parks a
/// caller polls it on each wake-up.
#[derive(Debug, Clone, Default)]
pub struct Termination {
    terminated: Arc<AtomicBool>,
}

impl Termination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let termination = Termination::new();
        let clone = termination.clone();
        assert!(!clone.is_terminated());

        termination.terminate();
        assert!(clone.is_terminated());
    }
}
