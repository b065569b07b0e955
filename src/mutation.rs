//! # Async Mutation Channel
//!
//! Non-blocking completion for secret patches.
//!
//! A [`PatchHandle`] represents one in-flight request running on the tokio
//! runtime. The caller's [`PatchCallback`] is invoked exactly once: with the
//! resulting data map, with the classified failure, or with
//! [`GatewayError::Cancelled`] if the handle is cancelled first. There is no
//! ordering guarantee relative to calls issued after the handle was returned.
//!
//! Timeouts and cancellation policy belong to the caller; this module only
//! binds the callback to the task.

use crate::error::GatewayError;
use crate::gateway::SecretData;
use std::fmt;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Outcome delivered to a [`PatchCallback`]
pub type PatchResult = Result<SecretData, GatewayError>;

/// Completion callback for an async patch
pub type PatchCallback = Box<dyn FnOnce(PatchResult) + Send + 'static>;

/// Fires the callback on completion, or with `Cancelled` if dropped first
struct CallbackGuard {
    callback: Option<PatchCallback>,
}

impl CallbackGuard {
    fn new(callback: PatchCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn complete(mut self, result: PatchResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(GatewayError::Cancelled));
        }
    }
}

/// Handle to an in-flight async patch
pub struct PatchHandle {
    task: JoinHandle<()>,
}

impl fmt::Debug for PatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl PatchHandle {
    /// Run `request` on the runtime and deliver its outcome to `callback`
    pub fn spawn<F>(request: F, callback: PatchCallback) -> Self
    where
        F: Future<Output = PatchResult> + Send + 'static,
    {
        let guard = CallbackGuard::new(callback);
        let task = tokio::spawn(async move {
            let result = request.await;
            guard.complete(result);
        });
        Self { task }
    }

    /// Abort the request. If it had not completed yet, the callback receives
    /// [`GatewayError::Cancelled`]; the remote side may still have applied
    /// the patch.
    pub fn cancel(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the callback has been invoked
    pub async fn join(self) {
        // An aborted task still ran the guard's drop before reporting back.
        let _ = self.task.await;
    }
}

/// Callback that forwards the outcome into a oneshot channel
#[must_use]
pub fn channel_callback() -> (PatchCallback, oneshot::Receiver<PatchResult>) {
    let (tx, rx) = oneshot::channel();
    let callback: PatchCallback = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (callback, rx)
}
