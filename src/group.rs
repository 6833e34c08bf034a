//! Labeled group loading.
//!
//! A [`GroupLoader`] issues one batched request for every resource tagged
//! with a label and indexes the items by file name as they arrive. Names
//! are unique within a loader: the first item to arrive under a name wins
//! and later duplicates are logged and dropped.
//!
//! A group owns a single reservation and is released as a unit. It never
//! releases itself, not even on failure or cancellation: items that arrived
//! before the failure stay queryable until the owner calls
//! [`GroupLoader::release`].

use crate::cancel::CancelToken;
use crate::error::{AssetError, Result};
use crate::handle::LoadState;
use crate::store::{short_type_name, Asset, ContentStore, Request, ReservationId, Resource};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// How `get` reacts to a name that is not in the index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupPolicy {
    /// Treat a miss as an authoring bug and panic
    Assert,
    /// Log the miss and return `None`
    Log,
}

impl LookupPolicy {
    pub fn from_assert_flag(assert_on_missing: bool) -> Self {
        if assert_on_missing {
            LookupPolicy::Assert
        } else {
            LookupPolicy::Log
        }
    }
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self::from_assert_flag(cfg!(debug_assertions))
    }
}

/// Result of a typed name lookup
#[derive(Clone, Debug)]
pub enum Lookup<T> {
    Found(Arc<T>),
    WrongType {
        expected: &'static str,
        actual: &'static str,
    },
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<Arc<T>> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Batch progress as seen by waiters
#[derive(Clone, Debug, PartialEq)]
pub struct BatchStatus {
    pub state: LoadState,
    pub progress: f32,
    /// Items delivered by the store, duplicates included
    pub arrived: usize,
}

struct GroupShared {
    label: String,
    reservation: ReservationId,
    store: Arc<dyn ContentStore>,
    token: CancelToken,
    policy: LookupPolicy,
    index: Mutex<AHashMap<String, Resource>>,
    duplicates: Mutex<Vec<String>>,
    status: watch::Sender<BatchStatus>,
    released: AtomicBool,
}

impl GroupShared {
    fn accept(&self, resource: Resource) {
        {
            let mut index = self.index.lock();
            if self.released.load(Ordering::Acquire) {
                return;
            }
            if index.contains_key(resource.name()) {
                tracing::warn!(label = %self.label, name = resource.name(), "duplicate asset name, keeping the first");
                self.duplicates.lock().push(resource.name().to_string());
            } else {
                index.insert(resource.name().to_string(), resource);
            }
        }

        let progress = self.store.progress(self.reservation);
        self.status.send_modify(|status| {
            status.arrived += 1;
            status.progress = progress;
        });
    }

    fn finish(&self, state: LoadState) {
        self.status.send_if_modified(|status| {
            if status.state.is_terminal() {
                return false;
            }
            if state == LoadState::Succeeded {
                status.progress = 1.0;
            }
            status.state = state.clone();
            true
        });
    }

    async fn drive(self: Arc<Self>) {
        let sink_target = Arc::clone(&self);
        let sink = move |resource: Resource| sink_target.accept(resource);

        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AssetError::Cancelled(self.label.clone())),
            outcome = self.store.resolve_batch(self.reservation, &sink) => outcome,
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(label = %self.label, count = self.index.lock().len(), "group loaded");
                self.finish(LoadState::Succeeded);
            }
            Err(AssetError::Cancelled(_)) => self.finish(LoadState::Cancelled),
            Err(err) => {
                tracing::error!(label = %self.label, error = %err, "group load failed");
                self.finish(LoadState::Failed(err));
            }
        }
    }
}

/// Name-indexed batch of resources sharing a label
#[derive(Clone)]
pub struct GroupLoader {
    shared: Arc<GroupShared>,
}

impl GroupLoader {
    /// Issue the batched request for `label` and return immediately.
    ///
    /// The index is empty until items begin to arrive. Must be called inside
    /// a tokio runtime.
    pub fn load(
        store: Arc<dyn ContentStore>,
        label: &str,
        token: &CancelToken,
        policy: LookupPolicy,
    ) -> Self {
        let reservation = store.reserve(&Request::label(label));
        let (status, _) = watch::channel(BatchStatus {
            state: LoadState::Pending,
            progress: 0.0,
            arrived: 0,
        });
        let shared = Arc::new(GroupShared {
            label: label.to_string(),
            reservation,
            store,
            token: token.child(),
            policy,
            index: Mutex::new(AHashMap::new()),
            duplicates: Mutex::new(Vec::new()),
            status,
            released: AtomicBool::new(false),
        });

        tokio::spawn(Arc::clone(&shared).drive());
        Self { shared }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn reservation(&self) -> ReservationId {
        self.shared.reservation
    }

    pub fn state(&self) -> LoadState {
        self.shared.status.borrow().state.clone()
    }

    pub fn status(&self) -> BatchStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.shared.status.borrow().state.is_terminal()
    }

    /// Wait for the whole batch to reach a terminal state
    pub async fn wait(&self) -> Result<()> {
        self.wait_with_progress(|_| {}).await
    }

    /// Wait for the batch, reporting progress on every change
    pub async fn wait_with_progress(&self, mut progress: impl FnMut(f32)) -> Result<()> {
        let mut rx = self.shared.status.subscribe();
        loop {
            let status = rx.borrow_and_update().clone();
            progress(status.progress);
            if status.state.is_terminal() {
                return status.state.into_result(&self.shared.label);
            }
            if rx.changed().await.is_err() {
                return Err(AssetError::Cancelled(self.shared.label.clone()));
            }
        }
    }

    /// Typed lookup that distinguishes a wrong type from a missing name
    pub fn lookup<T: Asset>(&self, name: &str) -> Lookup<T> {
        let index = self.shared.index.lock();
        match index.get(name) {
            Some(resource) => match resource.downcast::<T>() {
                Some(value) => Lookup::Found(value),
                None => Lookup::WrongType {
                    expected: short_type_name(std::any::type_name::<T>()),
                    actual: resource.short_type_name(),
                },
            },
            None => Lookup::NotFound,
        }
    }

    /// Named item as a `T`.
    ///
    /// A miss is treated as a missing asset in the label: it panics under
    /// [`LookupPolicy::Assert`] and logs under [`LookupPolicy::Log`]. Use
    /// [`GroupLoader::try_get`] where absence is expected.
    pub fn get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        let lookup = self.lookup::<T>(name);
        let message = match &lookup {
            Lookup::Found(_) => return lookup.found(),
            Lookup::NotFound => format!("asset not found: {name} (label {})", self.shared.label),
            Lookup::WrongType { expected, actual } => format!(
                "asset {name} (label {}) is a {actual}, not a {expected}",
                self.shared.label
            ),
        };

        tracing::error!("{message}");
        if self.shared.policy == LookupPolicy::Assert {
            panic!("{message}");
        }
        None
    }

    /// Named item as a `T`, quietly `None` when absent or of another type
    pub fn try_get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup::<T>(name).found()
    }

    /// Number of distinct names indexed
    pub fn count(&self) -> usize {
        self.shared.index.lock().len()
    }

    /// Indexed names in ordinal order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.index.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names that arrived more than once and were dropped
    pub fn duplicates(&self) -> Vec<String> {
        self.shared.duplicates.lock().clone()
    }

    /// `name : Type` listing sorted by name
    pub fn dump(&self) -> String {
        let index = self.shared.index.lock();
        let mut entries: Vec<(&String, &Resource)> = index.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = format!("### GroupLoader: {}\n", self.shared.label);
        for (name, resource) in entries {
            let _ = writeln!(out, "   {name} : {}", resource.short_type_name());
        }
        out
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Whether both loaders refer to the same batch
    pub fn same_batch(&self, other: &GroupLoader) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Release the whole batch. Idempotent.
    ///
    /// Every name lookup fails afterwards; items obtained earlier must not
    /// be kept past this call.
    pub fn release(&self) -> bool {
        let shared = &self.shared;
        if shared.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        shared.token.cancel();
        shared.index.lock().clear();
        shared.store.release(shared.reservation);
        shared.finish(LoadState::Cancelled);
        tracing::debug!(label = %shared.label, reservation = %shared.reservation, "group released");
        true
    }
}

impl fmt::Debug for GroupLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupLoader")
            .field("label", &self.shared.label)
            .field("reservation", &self.shared.reservation)
            .field("status", &*self.shared.status.borrow())
            .field("released", &self.is_released())
            .finish()
    }
}
