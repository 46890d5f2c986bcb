//! Cancellation and deadline carried through engine operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::result::{Error, Result};

/// Execution context passed to every engine operation
///
/// Clones share the same cancel flag, so a handle kept by another thread
/// can stop an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// Context that never expires on its own
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` if the context is done
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_not_done() {
        let ctx = ExecContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = ExecContext::background();
        let handle = ctx.clone();
        handle.cancel();
        assert!(ctx.is_done());
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(0));
        assert!(ctx.is_done());
    }
}
