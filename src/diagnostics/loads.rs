//! Registry of non-resident loads, grouped by the scope they were made in.

use super::TrackId;
use crate::time::Clock;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

/// One registered load
#[derive(Clone, Debug, PartialEq)]
pub struct LoadRecord {
    pub id: TrackId,
    pub key: String,
    pub type_name: &'static str,
    pub scope: String,
    pub loaded_at: Instant,
}

struct RegistryState {
    scope: String,
    records: AHashMap<TrackId, LoadRecord>,
    next_id: u64,
}

pub struct LoadRegistry {
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
}

impl LoadRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(RegistryState {
                scope: String::new(),
                records: AHashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Tag subsequent registrations with `scope`, usually the current scene
    pub fn set_scope(&self, scope: &str) {
        self.state.lock().scope = scope.to_string();
    }

    pub fn scope(&self) -> String {
        self.state.lock().scope.clone()
    }

    pub fn register(&self, key: &str, type_name: &'static str) -> TrackId {
        let loaded_at = self.clock.now();
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TrackId::new(state.next_id);
        let scope = state.scope.clone();
        state.records.insert(
            id,
            LoadRecord {
                id,
                key: key.to_string(),
                type_name,
                scope,
                loaded_at,
            },
        );
        id
    }

    pub fn unregister(&self, id: TrackId) -> bool {
        self.state.lock().records.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records ordered by scope, then key, then registration
    pub fn snapshot(&self) -> Vec<LoadRecord> {
        let mut records: Vec<LoadRecord> = self.state.lock().records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.key.cmp(&b.key))
                .then(a.id.cmp(&b.id))
        });
        records
    }

    pub fn build_debug_text(&self, current_scope_only: bool) -> String {
        let current = self.scope();
        let now = self.clock.now();
        let records: Vec<LoadRecord> = self
            .snapshot()
            .into_iter()
            .filter(|record| !current_scope_only || record.scope == current)
            .collect();

        let mut out = format!("### Loads: {} (scope: {})\n", records.len(), display_scope(&current));
        let mut last_scope: Option<&str> = None;
        for record in &records {
            if last_scope != Some(record.scope.as_str()) {
                let _ = writeln!(out, "[{}]", display_scope(&record.scope));
                last_scope = Some(record.scope.as_str());
            }
            let age = now.saturating_duration_since(record.loaded_at);
            let _ = writeln!(
                out,
                "   {} : {} ({:.1}s)",
                record.key,
                record.type_name,
                age.as_secs_f32()
            );
        }
        out
    }
}

fn display_scope(scope: &str) -> &str {
    if scope.is_empty() {
        "-"
    } else {
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn test_records_take_current_scope() {
        let registry = LoadRegistry::new(Arc::new(ManualClock::new()));
        registry.set_scope("Title");
        let title = registry.register("ui/logo", "Sprite");
        registry.set_scope("Battle");
        registry.register("fx/spark", "Particle");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].scope, "Battle");
        assert_eq!(snapshot[1].scope, "Title");

        let current = registry.build_debug_text(true);
        assert!(current.contains("fx/spark : Particle"));
        assert!(!current.contains("ui/logo"));

        let all = registry.build_debug_text(false);
        assert!(all.find("[Battle]").unwrap() < all.find("[Title]").unwrap());

        assert!(registry.unregister(title));
        assert!(!registry.unregister(title));
        assert_eq!(registry.len(), 1);
    }
}
