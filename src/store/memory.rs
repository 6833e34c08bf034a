use crate::error::{AssetError, Result};
use crate::store::{
    Asset, ContentStore, Instance, InstanceId, Request, ReservationId, Resolved, Resource,
};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Reservation counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reserved: u64,
    pub released: u64,
    /// `release` calls for reservations that were not open
    pub unknown_releases: u64,
    pub instantiated: u64,
    pub destroyed: u64,
}

struct Reservation {
    request: Request,
    delivered: usize,
    total: usize,
    done: bool,
    instance: Option<InstanceId>,
}

#[derive(Default)]
struct StoreState {
    /// key -> resource
    assets: AHashMap<String, Resource>,
    /// label -> keys, in registration order
    labels: AHashMap<String, Vec<String>>,
    failing: AHashSet<String>,
    /// label -> items delivered before the batch fails
    fail_after: AHashMap<String, usize>,
    reservations: AHashMap<ReservationId, Reservation>,
    /// Live instances, owned by the scene
    scene: AHashMap<InstanceId, Arc<Instance>>,
    next_reservation: u64,
    next_instance: u64,
    stats: StoreStats,
}

/// In-process content store.
///
/// Holds a catalog of keyed resources tagged with labels and a scene table
/// that owns every live instance. Resolution yields to the runtime (or
/// sleeps for the configured latency) before each item, so requests are
/// always observed pending first.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Store that waits `latency` before each resolved item
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState {
                next_reservation: 1,
                next_instance: 1,
                ..StoreState::default()
            }),
            latency,
        }
    }

    /// Register `value` under `key` with file name `name` and `labels`
    pub fn insert<T: Asset>(&self, key: &str, name: &str, value: T, labels: &[&str]) {
        let mut state = self.state.lock();
        state.assets.insert(key.to_string(), Resource::new(name, value));
        for label in labels {
            let keys = state.labels.entry(label.to_string()).or_default();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    /// Make every request for `key_or_label` fail
    pub fn fail(&self, key_or_label: &str) {
        self.state.lock().failing.insert(key_or_label.to_string());
    }

    /// Make batches for `label` fail after `delivered` items
    pub fn fail_label_after(&self, label: &str, delivered: usize) {
        self.state
            .lock()
            .fail_after
            .insert(label.to_string(), delivered);
    }

    /// Drop every injected failure
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.fail_after.clear();
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats.clone()
    }

    /// Reservations opened and not yet released
    pub fn outstanding(&self) -> usize {
        self.state.lock().reservations.len()
    }

    pub fn is_reserved(&self, reservation: ReservationId) -> bool {
        self.state.lock().reservations.contains_key(&reservation)
    }

    /// Count of instances alive in the scene
    pub fn live_instances(&self) -> usize {
        self.state.lock().scene.len()
    }

    /// Destroy an instance from the scene side, leaving its reservation open
    pub fn destroy_instance(&self, id: InstanceId) -> bool {
        let removed = self.state.lock().scene.remove(&id);
        removed.is_some()
    }

    async fn pause(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn reserve(&self, request: &Request) -> ReservationId {
        let mut state = self.state.lock();
        let id = ReservationId::new(state.next_reservation);
        state.next_reservation += 1;
        state.stats.reserved += 1;
        state.reservations.insert(
            id,
            Reservation {
                request: request.clone(),
                delivered: 0,
                total: 0,
                done: false,
                instance: None,
            },
        );
        tracing::debug!(reservation = %id, key = request.key(), "reserved");
        id
    }

    async fn resolve(&self, reservation: ReservationId) -> Result<Resolved> {
        self.pause().await;

        let mut state = self.state.lock();
        let request = match state.reservations.get(&reservation) {
            Some(entry) => entry.request.clone(),
            None => {
                return Err(AssetError::Released(reservation.to_string()));
            }
        };

        let key = request.key().to_string();
        if state.failing.contains(&key) {
            return Err(AssetError::load_failed(key, "store reported failure"));
        }

        let resolved = match request {
            Request::Asset { key } => {
                let resource = state
                    .assets
                    .get(&key)
                    .cloned()
                    .ok_or(AssetError::NotFound(key))?;
                Resolved::Asset(resource)
            }
            Request::Instantiate {
                key,
                placement,
                parent,
            } => {
                let template = state
                    .assets
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| AssetError::NotFound(key.clone()))?;
                let id = InstanceId::new(state.next_instance);
                state.next_instance += 1;
                let instance = Arc::new(Instance::new(id, key, template, placement, parent));
                state.scene.insert(id, Arc::clone(&instance));
                state.stats.instantiated += 1;
                if let Some(entry) = state.reservations.get_mut(&reservation) {
                    entry.instance = Some(id);
                }
                Resolved::Instance(instance)
            }
            Request::Label { label } => {
                return Err(AssetError::load_failed(
                    label,
                    "label reservations resolve through resolve_batch",
                ));
            }
        };

        if let Some(entry) = state.reservations.get_mut(&reservation) {
            entry.done = true;
        }
        Ok(resolved)
    }

    async fn resolve_batch(
        &self,
        reservation: ReservationId,
        sink: &(dyn Fn(Resource) + Send + Sync),
    ) -> Result<()> {
        let (label, keys, fail_after) = {
            let mut state = self.state.lock();
            let label = match state.reservations.get(&reservation) {
                Some(Reservation {
                    request: Request::Label { label },
                    ..
                }) => label.clone(),
                Some(entry) => {
                    return Err(AssetError::load_failed(
                        entry.request.key(),
                        "not a label reservation",
                    ));
                }
                None => return Err(AssetError::Released(reservation.to_string())),
            };
            if state.failing.contains(&label) {
                return Err(AssetError::load_failed(label, "store reported failure"));
            }
            let keys = state
                .labels
                .get(&label)
                .cloned()
                .ok_or_else(|| AssetError::NotFound(label.clone()))?;
            let fail_after = state.fail_after.get(&label).copied();
            if let Some(entry) = state.reservations.get_mut(&reservation) {
                entry.total = keys.len();
            }
            (label, keys, fail_after)
        };

        for (index, key) in keys.iter().enumerate() {
            self.pause().await;

            if fail_after == Some(index) {
                return Err(AssetError::load_failed(
                    label,
                    format!("batch failed after {index} items"),
                ));
            }

            let resource = {
                let mut state = self.state.lock();
                let resource = state.assets.get(key).cloned();
                match state.reservations.get_mut(&reservation) {
                    Some(entry) => entry.delivered += 1,
                    None => return Err(AssetError::Released(reservation.to_string())),
                }
                resource
            };

            // Delivered outside the lock: sinks may query progress.
            if let Some(resource) = resource {
                sink(resource);
            }
        }

        if let Some(entry) = self.state.lock().reservations.get_mut(&reservation) {
            entry.done = true;
        }
        Ok(())
    }

    fn progress(&self, reservation: ReservationId) -> f32 {
        let state = self.state.lock();
        match state.reservations.get(&reservation) {
            Some(entry) if entry.done => 1.0,
            Some(entry) if entry.total > 0 => entry.delivered as f32 / entry.total as f32,
            _ => 0.0,
        }
    }

    fn release(&self, reservation: ReservationId) {
        let mut state = self.state.lock();
        match state.reservations.remove(&reservation) {
            Some(entry) => {
                state.stats.released += 1;
                if let Some(id) = entry.instance {
                    if state.scene.remove(&id).is_some() {
                        state.stats.destroyed += 1;
                    }
                }
                tracing::debug!(reservation = %reservation, key = entry.request.key(), "released");
            }
            None => {
                state.stats.unknown_releases += 1;
                tracing::warn!(reservation = %reservation, "release of a reservation that is not open");
            }
        }
    }
}
