//! Cancellation and deadline propagation for individual calls.
//!
//! A [`Context`] is handed to every call and bound to the request it produces.
//! The transport races its I/O against the context, so canceling the context or
//! letting its deadline pass makes the call return promptly with a
//! [`ContextError`] as the underlying cause.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`Context`] is done.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context was canceled explicitly.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal plus optional deadline for one call.
///
/// Cloning a `Context` shares the same cancellation signal. Use
/// [`Context::child`] for a context that can be canceled without affecting
/// its parent.
///
/// # Examples
///
/// ```
/// use opaclient::Context;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let ctx = Context::with_timeout(Duration::from_secs(5));
/// assert!(ctx.err().is_none());
///
/// ctx.cancel();
/// assert!(ctx.is_canceled());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a context that is canceled when `self` is, but can also be
    /// canceled on its own. It keeps the parent deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Same as [`Context::child`], with a deadline no later than `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`Context::cancel`] was called on this context or a parent.
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The instant this context expires at, if it has a deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ContextError::Canceled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }

    /// Runs `future` unless the context finishes first.
    ///
    /// A context that is already done fails without polling `future`.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = future => Ok(output),
        }
    }
}
