//! Background execution of blocking operations.
//!
//! Filesystem and tag work is blocking, so operations run on the Tokio
//! blocking pool. The returned [`OperationHandle`] is the caller's future:
//! it can be cancelled cooperatively and awaited for the result. How the
//! result is marshalled back to a UI thread is the caller's business.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::context::{CancellationToken, OperationContext};
use crate::error::{Error, Result};

/// Handle to an operation running in the background.
#[derive(Debug)]
pub struct OperationHandle<T> {
    handle: JoinHandle<T>,
    token: CancellationToken,
}

impl<T> OperationHandle<T> {
    /// Request cooperative cancellation of the operation.
    pub fn cancel(&self) {
        debug!("Cancellation requested for background operation");
        self.token.cancel();
    }

    /// The token observed by the operation.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the operation to return.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Task`] if the worker panicked or was aborted.
    pub async fn join(self) -> Result<T> {
        self.handle.await.map_err(|e| {
            warn!("Background operation did not complete: {}", e);
            Error::Task(e.to_string())
        })
    }
}

/// Run `operation` on the blocking pool with the given context.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_operation<T, F>(ctx: OperationContext, operation: F) -> OperationHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&OperationContext) -> T + Send + 'static,
{
    let token = ctx.token();
    let handle = tokio::task::spawn_blocking(move || operation(&ctx));
    OperationHandle { handle, token }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_operation_returns_value() {
        let handle = spawn_operation(OperationContext::new(), |_ctx| 21 * 2);
        let value = handle.join().await.expect("operation should complete");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancel_is_observed_by_worker() {
        let handle = spawn_operation(OperationContext::new(), |ctx| {
            let mut polls = 0;
            while !ctx.is_cancelled() && polls < 500 {
                std::thread::sleep(Duration::from_millis(5));
                polls += 1;
            }
            ctx.is_cancelled()
        });

        handle.cancel();
        let observed = handle.join().await.expect("operation should complete");
        assert!(observed);
    }

    #[tokio::test]
    async fn test_panicking_operation_maps_to_task_error() {
        let handle = spawn_operation(OperationContext::new(), |_ctx| -> u32 {
            panic!("boom");
        });
        let err = handle.join().await.expect_err("panic should surface");
        assert!(matches!(err, Error::Task(_)));
    }
}
