//! Turn cancellation (spec §4.7.3, §5).
//!
//! A `watch` channel rather than a plain `AtomicBool` so that
//! [`CancelToken::cancelled`] can be raced against a tool dispatch or an
//! approval wait with `tokio::select!` instead of having to poll.

use tokio::sync::watch;

/// The orchestrator-facing half: checked at every suspension point.
#[derive(Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called. A clone
    /// already past that point resolves immediately.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        while self.0.changed().await.is_ok() {
            if self.is_cancelled() {
                return;
            }
        }
    }
}

/// The caller-facing half: held by whoever can cancel a running turn (the
/// CLI's signal handler, a parent orchestrator cancelling a sub-agent).
#[derive(Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_pending_waiter() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        handle.cancel();
        waiter.await.unwrap();
    }

    #[test]
    fn already_cancelled_token_reports_immediately() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
