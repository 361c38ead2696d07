use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::Error;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Cooperative cancellation flag shared between a package and whoever may
/// want to stop a long open or write. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.inner.reason.lock() {
            *slot = Some(reason.into());
        }
        self.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().ok().and_then(|slot| slot.clone())
    }

    /// Fail with a Context error if cancellation was requested
    pub fn check(&self, operation: &'static str) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled {
                operation,
                reason: self.reason(),
            })
        } else {
            Ok(())
        }
    }
}
