//! Weak-reference leak tracking.
//!
//! Each entry moves from tracked to either untracked (its handle was
//! released) or swept (the object died while still tracked). The second
//! path is the leak signal: a correctly released handle always untracks
//! first. Swept objects are reported, never destroyed.

use super::{CallSite, TrackId};
use crate::time::Clock;
use ahash::AHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Snapshot of one tracked object
#[derive(Clone, Debug, PartialEq)]
pub struct LeakEntry {
    pub id: TrackId,
    pub key: String,
    pub name: String,
    pub site: CallSite,
    pub registered: Instant,
}

struct Slot {
    target: Weak<dyn Any + Send + Sync>,
    address: usize,
    entry: LeakEntry,
}

#[derive(Default)]
struct TrackerState {
    slots: AHashMap<TrackId, Slot>,
    /// Object identity -> current entry
    by_address: AHashMap<usize, TrackId>,
    next_id: u64,
    since_report: Duration,
    swept_total: u64,
}

impl TrackerState {
    fn remove(&mut self, id: TrackId) -> Option<Slot> {
        let slot = self.slots.remove(&id)?;
        if self.by_address.get(&slot.address) == Some(&id) {
            self.by_address.remove(&slot.address);
        }
        Some(slot)
    }

    /// Count `slot` as an object that died while tracked
    fn record_swept(&mut self, slot: &Slot) {
        tracing::warn!(
            id = %slot.entry.id,
            key = %slot.entry.key,
            site = %slot.entry.site,
            "tracked object destroyed without release"
        );
        self.swept_total += 1;
    }
}

fn address_of(target: &Arc<dyn Any + Send + Sync>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

/// Registry of live objects keyed by weak reference
pub struct LeakTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl LeakTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Track `target`, replacing any entry for the same object
    pub fn track(
        &self,
        target: &Arc<dyn Any + Send + Sync>,
        key: &str,
        name: &str,
        site: CallSite,
    ) -> TrackId {
        let address = address_of(target);
        let registered = self.clock.now();

        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TrackId::new(state.next_id);
        if let Some(previous) = state.by_address.insert(address, id) {
            // The old entry may be dead with its address now reused.
            if let Some(slot) = state.slots.remove(&previous) {
                if slot.target.strong_count() == 0 {
                    state.record_swept(&slot);
                }
            }
        }
        state.slots.insert(
            id,
            Slot {
                target: Arc::downgrade(target),
                address,
                entry: LeakEntry {
                    id,
                    key: key.to_string(),
                    name: name.to_string(),
                    site,
                    registered,
                },
            },
        );
        id
    }

    /// Stop tracking `target`. No-op when it is not tracked.
    pub fn untrack(&self, target: &Arc<dyn Any + Send + Sync>) -> bool {
        let mut state = self.state.lock();
        match state.by_address.get(&address_of(target)).copied() {
            Some(id) => state.remove(id).is_some(),
            None => false,
        }
    }

    /// Stop tracking the entry `id`. Safe after the entry was swept.
    pub fn untrack_id(&self, id: TrackId) -> bool {
        self.state.lock().remove(id).is_some()
    }

    /// Drop entries whose object no longer exists and return how many.
    ///
    /// Each one is an object that died without its handle being released.
    pub fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        let dead: SmallVec<[TrackId; 8]> = state
            .slots
            .iter()
            .filter(|(_, slot)| slot.target.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            if let Some(slot) = state.remove(*id) {
                state.record_swept(&slot);
            }
        }
        dead.len()
    }

    /// Entries currently tracked, dead or alive
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `target` has a live entry
    pub fn is_tracked(&self, target: &Arc<dyn Any + Send + Sync>) -> bool {
        self.state
            .lock()
            .by_address
            .contains_key(&address_of(target))
    }

    /// Entries removed by sweeps since creation
    pub fn swept_total(&self) -> u64 {
        self.state.lock().swept_total
    }

    /// All entries, most recently registered first
    pub fn snapshot(&self) -> Vec<LeakEntry> {
        let state = self.state.lock();
        let mut entries: Vec<LeakEntry> = state.slots.values().map(|s| s.entry.clone()).collect();
        entries.sort_by(|a, b| b.registered.cmp(&a.registered).then(b.id.cmp(&a.id)));
        entries
    }

    /// Sweep, then summarize up to `limit` entries
    pub fn report_now(&self, limit: usize) -> String {
        self.sweep();
        let report = self.summary(limit);
        tracing::info!("{report}");
        report
    }

    /// Frame-driven report.
    ///
    /// Accumulates `delta` and reports once `interval` (at least one second)
    /// has passed. Returns `None` between reports and when nothing is
    /// tracked.
    pub fn report_periodic(
        &self,
        interval: Duration,
        delta: Duration,
        limit: usize,
    ) -> Option<String> {
        {
            let mut state = self.state.lock();
            state.since_report += delta;
            if state.since_report < interval.max(Duration::from_secs(1)) {
                return None;
            }
            state.since_report = Duration::ZERO;
        }

        self.sweep();
        if self.is_empty() {
            return None;
        }
        let report = self.summary(limit);
        tracing::info!("{report}");
        Some(report)
    }

    fn summary(&self, limit: usize) -> String {
        let entries = self.snapshot();
        let now = self.clock.now();

        let mut out = format!("[LeakTracker] tracked objects: {}\n", entries.len());
        for entry in entries.iter().take(limit) {
            let age = now.saturating_duration_since(entry.registered);
            let _ = writeln!(
                out,
                "  - {} \"{}\" key=\"{}\" age={:.1}s where={}",
                entry.id,
                entry.name,
                entry.key,
                age.as_secs_f32(),
                entry.site
            );
        }
        if entries.len() > limit {
            let _ = writeln!(out, "  ... and {} more", entries.len() - limit);
        }
        out
    }
}
