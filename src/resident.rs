//! Process-lifetime assets.
//!
//! [`ResidentAssets`] loads one label (the common label) once and keeps it
//! for as long as it exists. It is the one owner in the crate that never
//! releases what it loaded: shutting down cancels a load still in flight,
//! but a loaded group stays reserved until the content store itself goes
//! away.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::group::{GroupLoader, Lookup, LookupPolicy};
use crate::store::{Asset, ContentStore};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;

/// Load progress of the resident label
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResidentPhase {
    NotLoaded,
    Loading,
    Loaded,
}

struct ResidentState {
    phase: ResidentPhase,
    group: Option<GroupLoader>,
}

/// Owner of the resident label
pub struct ResidentAssets {
    store: Arc<dyn ContentStore>,
    label: String,
    policy: LookupPolicy,
    token: CancelToken,
    state: Arc<Mutex<ResidentState>>,
}

/// Record the outcome of `group` if it is still the current batch.
///
/// Runs from the watcher and from every waiter; only the first call for a
/// batch changes anything.
fn settle(state: &Mutex<ResidentState>, label: &str, group: &GroupLoader, outcome: &Result<()>) {
    let abandoned = {
        let mut state = state.lock();
        let current = state
            .group
            .as_ref()
            .is_some_and(|active| active.same_batch(group));
        match outcome {
            Ok(()) if current => {
                if state.phase != ResidentPhase::Loaded {
                    tracing::info!(label, count = group.count(), "resident assets loaded");
                }
                state.phase = ResidentPhase::Loaded;
                false
            }
            Err(_) if current => {
                state.phase = ResidentPhase::NotLoaded;
                state.group = None;
                true
            }
            _ => false,
        }
    };

    if abandoned {
        tracing::warn!(label, "resident load did not complete, batch released");
        group.release();
    }
}

impl ResidentAssets {
    /// Manager for `label`, cancelled together with `parent`
    pub fn new(
        store: Arc<dyn ContentStore>,
        label: &str,
        policy: LookupPolicy,
        parent: &CancelToken,
    ) -> Self {
        Self {
            store,
            label: label.to_string(),
            policy,
            token: parent.child(),
            state: Arc::new(Mutex::new(ResidentState {
                phase: ResidentPhase::NotLoaded,
                group: None,
            })),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Load the label, or join the load already in progress.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn load(&self) -> Result<()> {
        self.load_with_progress(|_| {}).await
    }

    /// [`ResidentAssets::load`] with progress reports.
    ///
    /// Concurrent callers share one batch request and observe the same
    /// outcome. A failed or cancelled load releases its batch and returns to
    /// [`ResidentPhase::NotLoaded`], so the caller may retry. The outcome is
    /// recorded even when every caller stops waiting.
    pub async fn load_with_progress(&self, progress: impl FnMut(f32)) -> Result<()> {
        let group = {
            let mut state = self.state.lock();
            let in_flight = match state.phase {
                ResidentPhase::Loaded => return Ok(()),
                ResidentPhase::Loading => state.group.clone(),
                ResidentPhase::NotLoaded => None,
            };
            match in_flight {
                Some(group) => group,
                None => {
                    let group = GroupLoader::load(
                        Arc::clone(&self.store),
                        &self.label,
                        &self.token,
                        self.policy,
                    );
                    state.phase = ResidentPhase::Loading;
                    state.group = Some(group.clone());
                    tracing::info!(label = %self.label, "loading resident assets");
                    self.watch(group.clone());
                    group
                }
            }
        };

        let outcome = group.wait_with_progress(progress).await;
        settle(&self.state, &self.label, &group, &outcome);
        outcome
    }

    /// Settle the batch once it finishes, independently of any waiter
    fn watch(&self, group: GroupLoader) {
        let state = Arc::clone(&self.state);
        let label = self.label.clone();
        tokio::spawn(async move {
            let outcome = group.wait().await;
            settle(&state, &label, &group, &outcome);
        });
    }

    pub fn phase(&self) -> ResidentPhase {
        self.state.lock().phase
    }

    pub fn is_loaded(&self) -> bool {
        self.phase() == ResidentPhase::Loaded
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == ResidentPhase::Loading
    }

    fn group(&self) -> Option<GroupLoader> {
        self.state.lock().group.clone()
    }

    /// Named resident item; a miss follows the lookup policy
    pub fn get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        match self.group() {
            Some(group) => group.get::<T>(name),
            None => {
                tracing::warn!(label = %self.label, name, "resident assets not loaded");
                None
            }
        }
    }

    /// Named resident item, quietly `None` when absent
    pub fn try_get<T: Asset>(&self, name: &str) -> Option<Arc<T>> {
        self.group()?.try_get::<T>(name)
    }

    pub fn lookup<T: Asset>(&self, name: &str) -> Lookup<T> {
        match self.group() {
            Some(group) => group.lookup::<T>(name),
            None => Lookup::NotFound,
        }
    }

    pub fn count(&self) -> usize {
        self.group().map_or(0, |group| group.count())
    }

    pub fn names(&self) -> Vec<String> {
        self.group().map(|group| group.names()).unwrap_or_default()
    }

    pub fn build_debug_text(&self) -> String {
        let phase = self.phase();
        if phase == ResidentPhase::NotLoaded {
            return format!("### Resident: {} (not loaded)\n", self.label);
        }

        let names = self.names();
        let status = if phase == ResidentPhase::Loaded {
            "loaded"
        } else {
            "loading"
        };
        let mut out = format!("### Resident: {} ({status}, {})\n", self.label, names.len());
        for name in names {
            let _ = writeln!(out, "   {name}");
        }
        out
    }

    /// Cancel a load in flight. A loaded group is kept, not released.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

impl Drop for ResidentAssets {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
