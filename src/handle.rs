//! Ownership handles for single asynchronous loads.
//!
//! A [`ResourceHandle`] owns exactly one content store reservation. It is
//! returned in the pending state as soon as the request is issued, resolves
//! in the background, and releases its reservation exactly once:
//!
//! - explicitly, through [`ResourceHandle::release`] (any number of calls)
//! - on its own, when resolution fails
//! - when its cancel scope is cancelled, before or after resolution
//!
//! Dropping a handle does not release it. An unreleased handle keeps its
//! reservation until its scope is cancelled, which is what the leak tracker
//! in [`crate::diagnostics`] reports on.

use crate::cancel::CancelToken;
use crate::error::{AssetError, Result};
use crate::store::{
    Asset, ContentStore, Instance, InstanceId, Request, ReservationId, Resolved, Resource,
};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Lifecycle of an asynchronous request
#[derive(Clone, Debug, PartialEq)]
pub enum LoadState {
    Pending,
    Succeeded,
    Failed(AssetError),
    Cancelled,
}

impl LoadState {
    /// Succeeded, failed or cancelled
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadState::Pending)
    }

    pub(crate) fn into_result(self, key: &str) -> Result<()> {
        match self {
            LoadState::Succeeded => Ok(()),
            LoadState::Failed(err) => Err(err),
            LoadState::Cancelled | LoadState::Pending => Err(AssetError::Cancelled(key.to_string())),
        }
    }
}

/// What a resolved handle holds on to
enum Held {
    Asset(Resource),
    /// The scene owns instances; the handle only observes them.
    Instance(Weak<Instance>, InstanceId),
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

struct Shared {
    key: String,
    reservation: ReservationId,
    store: Arc<dyn ContentStore>,
    token: CancelToken,
    state: watch::Sender<LoadState>,
    held: Mutex<Option<Held>>,
    released: AtomicBool,
    hooks: Mutex<Vec<ReleaseHook>>,
}

impl Shared {
    /// The single release path. Returns false when already released.
    ///
    /// `pending_outcome` becomes the terminal state if the request had not
    /// resolved yet.
    fn release(&self, pending_outcome: LoadState) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        // No locks may be held here: cancelling runs this handle's own
        // cancel callback, which re-enters `release`.
        self.token.cancel();

        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }

        let held = self.held.lock().take();
        self.store.release(self.reservation);
        drop(held);

        self.state.send_if_modified(|state| {
            if *state == LoadState::Pending {
                *state = pending_outcome;
                true
            } else {
                false
            }
        });
        tracing::debug!(key = %self.key, reservation = %self.reservation, "handle released");
        true
    }

    fn settle(&self, resolved: Resolved) {
        {
            let mut held = self.held.lock();
            if self.released.load(Ordering::Acquire) {
                // Released while in flight; the store already dropped it.
                return;
            }
            *held = Some(match resolved {
                Resolved::Asset(resource) => Held::Asset(resource),
                Resolved::Instance(instance) => {
                    Held::Instance(Arc::downgrade(&instance), instance.id())
                }
            });
        }
        self.state.send_replace(LoadState::Succeeded);
    }

    async fn drive(self: Arc<Self>) {
        let outcome = tokio::select! {
            biased;
            // Cancellation already released through the token callback.
            _ = self.token.cancelled() => return,
            outcome = self.store.resolve(self.reservation) => outcome,
        };

        match outcome {
            Ok(resolved) => self.settle(resolved),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "load failed");
                self.release(LoadState::Failed(err));
            }
        }
    }
}

/// Identity of one handle and its clones, for leak tracking.
///
/// Owned by the handle values only, so it dies when the last clone is
/// dropped. Cancel callbacks keep `Shared` alive, not this.
#[derive(Debug)]
struct Lease {
    _reservation: ReservationId,
}

/// Handle to one asset load or instance, released exactly once
pub struct ResourceHandle<T: Asset> {
    shared: Arc<Shared>,
    lease: Arc<Lease>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Asset> ResourceHandle<T> {
    /// Issue `request` against `store` and return immediately.
    ///
    /// The handle's scope is a child of `token`; cancelling `token` at any
    /// point releases the handle. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn ContentStore>, request: Request, token: &CancelToken) -> Self {
        let reservation = store.reserve(&request);
        let (state, _) = watch::channel(LoadState::Pending);
        let shared = Arc::new(Shared {
            key: request.key().to_string(),
            reservation,
            store,
            token: token.child(),
            state,
            held: Mutex::new(None),
            released: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        });

        // Registered before the driver starts, so a scope that is already
        // cancelled releases right here.
        let on_cancel = Arc::clone(&shared);
        shared
            .token
            .on_cancel(move || {
                on_cancel.release(LoadState::Cancelled);
            });

        if !shared.released.load(Ordering::Acquire) {
            tokio::spawn(Arc::clone(&shared).drive());
        }

        Self {
            shared,
            lease: Arc::new(Lease {
                _reservation: reservation,
            }),
            _marker: PhantomData,
        }
    }

    /// Key the request was issued for
    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn reservation(&self) -> ReservationId {
        self.shared.reservation
    }

    pub fn state(&self) -> LoadState {
        self.shared.state.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.shared.state.borrow().is_terminal()
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Wait until the request reaches a terminal state.
    ///
    /// Any number of tasks may wait on the same handle.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.shared.state.subscribe();
        let state = match rx.wait_for(LoadState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => LoadState::Cancelled,
        };
        state.into_result(&self.shared.key)
    }

    /// Resolved value, or `None` while pending, after failure, after
    /// release, or when the value is not a `T`
    pub fn value(&self) -> Option<Arc<T>> {
        let held = self.shared.held.lock();
        match held.as_ref()? {
            Held::Asset(resource) => resource.downcast::<T>(),
            Held::Instance(instance, _) => {
                let instance: Arc<dyn Any + Send + Sync> = instance.upgrade()?;
                instance.downcast::<T>().ok()
            }
        }
    }

    /// Underlying resource; for instances, the template they were built from
    pub fn resource(&self) -> Option<Resource> {
        let held = self.shared.held.lock();
        match held.as_ref()? {
            Held::Asset(resource) => Some(resource.clone()),
            Held::Instance(instance, _) => instance.upgrade().map(|i| i.template().clone()),
        }
    }

    /// Id of the owned instance, for instantiate requests that succeeded
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self.shared.held.lock().as_ref()? {
            Held::Instance(_, id) => Some(*id),
            Held::Asset(_) => None,
        }
    }

    /// Run `hook` when the handle is released, or now if it already was
    pub fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.shared.hooks.lock();
            if !self.shared.released.load(Ordering::Acquire) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Release the reservation and destroy any owned instance.
    ///
    /// Idempotent; returns true only for the call that released. Releasing
    /// a pending handle cancels the request.
    pub fn release(&self) -> bool {
        self.shared.release(LoadState::Cancelled)
    }

    /// Object used as this handle's identity for leak tracking.
    ///
    /// Instances are tracked themselves, so destroying one without a release
    /// shows up in a sweep. Assets are shared by every load of the same key,
    /// so each handle is tracked by its own lease, which dies when the last
    /// clone of an unreleased handle is dropped.
    pub(crate) fn tracked_target(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        match self.shared.held.lock().as_ref()? {
            Held::Asset(_) => Some(Arc::clone(&self.lease) as Arc<dyn Any + Send + Sync>),
            Held::Instance(instance, _) => {
                instance.upgrade().map(|i| i as Arc<dyn Any + Send + Sync>)
            }
        }
    }
}

impl<T: Asset> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            lease: Arc::clone(&self.lease),
            _marker: PhantomData,
        }
    }
}

impl<T: Asset> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.shared.key)
            .field("reservation", &self.shared.reservation)
            .field("state", &*self.shared.state.borrow())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct Sprite;
    impl Asset for Sprite {}

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("ui/icon", "icon", Sprite, &[]);
        store
    }

    #[tokio::test]
    async fn test_pending_then_succeeded() {
        let store = store();
        let handle: ResourceHandle<Sprite> =
            ResourceHandle::spawn(store.clone(), Request::asset("ui/icon"), &CancelToken::new());
        assert_eq!(handle.state(), LoadState::Pending);
        assert!(handle.value().is_none());

        handle.wait().await.unwrap();
        assert!(handle.value().is_some());
        assert!(handle.instance_id().is_none());

        assert!(handle.release());
        assert!(!handle.release());
        assert!(handle.value().is_none());
        assert_eq!(store.stats().released, 1);
    }

    #[tokio::test]
    async fn test_release_hook_runs_once() {
        let store = store();
        let handle: ResourceHandle<Sprite> =
            ResourceHandle::spawn(store, Request::asset("ui/icon"), &CancelToken::new());
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        handle.on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.release();
        handle.release();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scope_releases_before_spawn() {
        let store = store();
        let scope = CancelToken::new();
        scope.cancel();
        let handle: ResourceHandle<Sprite> =
            ResourceHandle::spawn(store.clone(), Request::asset("ui/icon"), &scope);
        assert!(handle.is_released());
        assert_eq!(handle.state(), LoadState::Cancelled);
        assert_eq!(store.outstanding(), 0);
    }
}
