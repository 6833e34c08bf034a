//! Cancellation scopes.
//!
//! A [`CancelToken`] is one node in a tree of scopes. Cancelling a node
//! cancels every descendant and runs the callbacks registered on each of
//! them, synchronously, on the cancelling thread. Owners of a scope (a game
//! state, a screen, the asset context itself) create a child per request and
//! cancel their own node when they exit.
//!
//! ```
//! use archetype_lifecycle::cancel::CancelToken;
//!
//! let state_scope = CancelToken::new();
//! let request = state_scope.child();
//! state_scope.cancel();
//! assert!(request.is_cancelled());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

type Callback = Box<dyn FnOnce() + Send>;

struct Node {
    cancelled: watch::Sender<bool>,
    callbacks: Mutex<Vec<Callback>>,
    children: Mutex<Vec<Weak<Node>>>,
}

impl Node {
    fn new() -> Arc<Self> {
        let (cancelled, _) = watch::channel(false);
        Arc::new(Self {
            cancelled,
            callbacks: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    fn cancel(&self) {
        // The flag is set before either list is drained so that concurrent
        // registrations either land in the list or observe the flag.
        if self.cancelled.send_replace(true) {
            return;
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Handle to one cancellation scope
#[derive(Clone)]
pub struct CancelToken {
    node: Arc<Node>,
}

impl CancelToken {
    /// Create a new root scope
    pub fn new() -> Self {
        Self { node: Node::new() }
    }

    /// Create a child scope, cancelled together with this one.
    ///
    /// A child of an already cancelled scope starts out cancelled.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut children = self.node.children.lock();
            if !self.node.is_cancelled() {
                children.retain(|weak| weak.strong_count() > 0);
                children.push(Arc::downgrade(&child.node));
                return child;
            }
        }
        child.cancel();
        child
    }

    /// Cancel this scope and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.node.is_cancelled()
    }

    /// Run `callback` once when this scope is cancelled.
    ///
    /// Runs immediately when the scope is already cancelled.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut callbacks = self.node.callbacks.lock();
            if !self.node.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Resolves once the scope is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.node.cancelled.subscribe();
        // The sender lives in `self.node`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel this scope when the returned guard is dropped
    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard { token: Some(self) }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels its scope on drop, for owners whose exit is a scope exit
#[derive(Debug)]
pub struct CancelGuard {
    token: Option<CancelToken>,
}

impl CancelGuard {
    /// Give the token back without cancelling it
    pub fn disarm(mut self) -> CancelToken {
        match self.token.take() {
            Some(token) => token,
            None => CancelToken::new(),
        }
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
