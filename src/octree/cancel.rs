//! Cooperative cancellation tokens
//!
//! A token is cancelled when it, or any token it was derived from, has been
//! cancelled. Workers poll; nothing is ever interrupted forcibly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TokenInner {
    flag: AtomicBool,
    parent: Option<Arc<TokenInner>>,
}

/// Shared cancellation flag with parent propagation
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a token that is cancelled together with this one.
    /// Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                flag: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.inner);
        while let Some(inner) = node {
            if inner.flag.load(Ordering::Acquire) {
                return true;
            }
            node = inner.parent.as_ref();
        }
        false
    }
}
