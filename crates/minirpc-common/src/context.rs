//! Per-call context: deadline, oneway flag and cancellation.
//!
//! A [`Context`] travels with every call on both sides. The client races the
//! network exchange against [`Context::done`]; the server rebuilds a context
//! from the propagated deadline and hands it to the service method.
//!
//! Cancellation is cooperative. Finishing a context never aborts work that is
//! already running; it only stops callers from waiting on it.
//!
//! # Example
//!
//! ```
//! use minirpc_common::Context;
//! use std::time::Duration;
//!
//! let ctx = Context::background().with_timeout(Duration::from_secs(1));
//! assert!(ctx.deadline().is_some());
//! assert!(ctx.err().is_none());
//!
//! let notify = Context::background().with_oneway();
//! assert!(notify.is_oneway());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use crate::protocol::error::MinirpcError;

/// Deadline, oneway flag and cancellation signal for one call.
///
/// Contexts are cheap to clone; clones share the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<SystemTime>,
    oneway: bool,
    cancel: Option<Arc<CancelSignal>>,
}

/// One cancellation flag plus the flags of the contexts it was derived from.
#[derive(Debug)]
struct CancelSignal {
    rx: watch::Receiver<bool>,
    parent: Option<Arc<CancelSignal>>,
}

impl CancelSignal {
    fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut rx = self.rx.clone();
            match &self.parent {
                Some(parent) => tokio::select! {
                    _ = wait_cancelled(&mut rx) => {}
                    _ = parent.cancelled() => {}
                },
                None => wait_cancelled(&mut rx).await,
            }
        })
    }
}

/// Cancels the context it was created with, and every context derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context whose deadline is `timeout` from now, or the
    /// existing deadline if that is earlier.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = SystemTime::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Derives a context with an absolute deadline, keeping an existing
    /// earlier one.
    pub fn with_deadline(mut self, deadline: SystemTime) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Derives a context marked for fire-and-forget calls.
    pub fn with_oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    /// Derives a cancellable context.
    ///
    /// The derived context is done once either the returned handle or any
    /// cancellation already attached to `self` fires. Needs no runtime.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(Arc::new(CancelSignal {
            rx,
            parent: self.cancel.take(),
        }));
        (self, CancelHandle { tx })
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    /// Time left before the deadline, `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| {
            d.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<MinirpcError> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Some(MinirpcError::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Some(MinirpcError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes,
    /// yielding the matching error. Never resolves for a background context.
    pub async fn done(&self) -> MinirpcError {
        let cancelled = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        let expired = async {
            match self.remaining() {
                Some(left) => tokio::time::sleep(left).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => MinirpcError::Cancelled,
            _ = expired => MinirpcError::DeadlineExceeded,
        }
    }
}

/// Waits until the flag is set. If every sender is gone without cancelling,
/// the wait never completes.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
