//! Cooperative cancellation flag shared between a caller and a running scan.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancellation flag.
///
/// All clones observe the same state.  Once cancelled a token stays
/// cancelled; calling [`CancelToken::cancel`] again has no further effect.
///
/// ```
/// # use toio_rs::cancel::CancelToken;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancelToken::new();
/// let watcher = token.clone();
/// token.cancel();
/// watcher.cancelled().await;
/// assert!(watcher.is_cancelled());
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Request cancellation and wake every pending [`CancelToken::cancelled`].
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// `true` when `other` is a clone of this token.
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Resolve once the token is cancelled.  Returns immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while
        // this future is pending.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
