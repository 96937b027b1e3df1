//! Cancellation and deadlines for provider calls
//!
//! Every provider operation takes a [`Context`]. Cancelling the context, or
//! letting its deadline pass, abandons the call that is in flight.

use crate::error::CallError;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Context carries the cancellation signal and optional deadline of a call
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    parent: Option<Context>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done: done_rx,
                done_tx,
                parent: None,
            }),
        }
    }

    /// Derives a context that also expires after `timeout`.
    ///
    /// Cancelling the returned context does not cancel `self`, but
    /// cancelling `self` cancels the returned context.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.deadline() {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: Some(deadline),
                done: done_rx,
                done_tx,
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
            || self.inner.parent.as_ref().is_some_and(Context::is_cancelled)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }

    /// Resolves once this context or one of its ancestors is cancelled.
    pub async fn cancelled(&self) {
        let mut ctx = self;
        let mut waiters = Vec::new();
        loop {
            waiters.push(ctx.inner.done.clone());
            match &ctx.inner.parent {
                Some(parent) => ctx = parent,
                None => break,
            }
        }

        let waits = waiters.into_iter().map(|mut done| {
            Box::pin(async move {
                // A closed channel cannot be cancelled any more.
                let closed = done.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    std::future::pending::<()>().await;
                }
            })
        });
        futures::future::select_all(waits).await;
    }

    /// Drives `fut` until it finishes, the context is cancelled, or the
    /// deadline passes, whichever happens first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, CallError>>,
    {
        if self.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let expired = async {
            match self.deadline() {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = self.cancelled() => Err(CallError::Cancelled),
            _ = expired => Err(CallError::DeadlineExceeded),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
