//! Diagnostic observers for the asset layer.
//!
//! Nothing in this module owns content. [`LeakTracker`] holds weak
//! references only, and [`LoadRegistry`] holds plain metadata, so both can
//! be left out entirely (see `AssetConfig::diagnostics`) without touching
//! ownership logic.
//!
//! ```
//! use archetype_lifecycle::diagnostics::{CallSite, LeakTracker};
//! use archetype_lifecycle::time::SystemClock;
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! let tracker = LeakTracker::new(Arc::new(SystemClock));
//! let object: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
//! tracker.track(&object, "props/crate", "crate", CallSite::caller());
//! drop(object);
//! assert_eq!(tracker.sweep(), 1);
//! ```

pub mod leak;
pub mod loads;
pub mod report;

pub use leak::{LeakEntry, LeakTracker};
pub use loads::{LoadRecord, LoadRegistry};
pub use report::DebugReport;

use crate::handle::ResourceHandle;
use crate::store::Asset;
use crate::time::Clock;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Source location of the code that requested a load
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    /// Location of the caller of the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Entry id within a tracker or registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Leak tracker and load registry, shared by every facade of a context
#[derive(Clone)]
pub struct Diagnostics {
    leaks: Arc<LeakTracker>,
    loads: Arc<LoadRegistry>,
}

impl Diagnostics {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leaks: Arc::new(LeakTracker::new(Arc::clone(&clock))),
            loads: Arc::new(LoadRegistry::new(clock)),
        }
    }

    pub fn leaks(&self) -> &LeakTracker {
        &self.leaks
    }

    pub fn loads(&self) -> &LoadRegistry {
        &self.loads
    }

    /// Register a resolved handle with both observers.
    ///
    /// Both entries are removed when the handle is released. A handle that
    /// is already released, or whose instance is already gone, is skipped.
    pub fn observe<T: Asset>(&self, handle: &ResourceHandle<T>, site: CallSite) {
        let Some(target) = handle.tracked_target() else {
            return;
        };
        let (name, type_name) = match handle.resource() {
            Some(resource) => (resource.name().to_string(), resource.short_type_name()),
            None => (String::new(), "?"),
        };

        let track = self.leaks.track(&target, handle.key(), &name, site);
        let load = self.loads.register(handle.key(), type_name);
        drop(target);

        let leaks = Arc::clone(&self.leaks);
        let loads = Arc::clone(&self.loads);
        handle.on_release(move || {
            leaks.untrack_id(track);
            loads.unregister(load);
        });
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("tracked", &self.leaks.len())
            .field("loads", &self.loads.len())
            .finish()
    }
}
