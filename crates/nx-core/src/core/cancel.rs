use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{NxError, Result};

/// Shared flag that asks in-flight work to stop.
///
/// Clones observe the same flag. Worker loops and [`TurnGate`](super::TurnGate)
/// waits check it, so a failed block or an external caller can unblock every
/// thread waiting for its turn.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    /// Creates a token with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled along with `self`.
    ///
    /// Cancelling the child leaves `self` untouched, so a session can stop
    /// its own workers without consuming a token its caller still holds.
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Cancels this token and every child created from it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once this token or any of its ancestors was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// Returns [`NxError::Cancelled`] once the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(NxError::Cancelled)
        } else {
            Ok(())
        }
    }
}
