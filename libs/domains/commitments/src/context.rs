//! Call context carrying cancellation.
//!
//! Every network-bound operation in this crate takes a `Context`. Awaiting
//! through [`Context::run`] makes the operation return
//! [`CommitmentError::Cancelled`] as soon as the paired [`CancelHandle`] fires.

use std::future::Future;

use tokio::sync::watch;

use crate::error::{CommitmentError, CommitmentResult};

#[derive(Debug, Clone)]
pub struct Context {
    cancel: watch::Receiver<bool>,
}

/// Cancels every [`Context`] cloned from the one it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { cancel: rx }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel: rx }, CancelHandle { tx })
    }

    /// Wrap an existing shutdown receiver (`true` means stop)
    pub fn from_shutdown(rx: watch::Receiver<bool>) -> Self {
        Self { cancel: rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn check(&self) -> CommitmentResult<()> {
        if self.is_cancelled() {
            Err(CommitmentError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the context is cancelled; pends forever otherwise
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` unless the context is cancelled first
    pub async fn run<T, F>(&self, fut: F) -> CommitmentResult<T>
    where
        F: Future<Output = CommitmentResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CommitmentError::Cancelled),
            result = fut => result,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
