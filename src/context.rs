//! The asset context.
//!
//! [`AssetContext`] is the explicitly constructed owner of everything the
//! asset layer keeps for a process or a test: the store, the resident
//! assets, the facade and, when enabled, the diagnostics. It is passed to
//! whoever needs it rather than reached globally. Dropping it (or calling
//! [`AssetContext::shutdown`]) cancels its scope, which releases every
//! handle still bound to it.
//!
//! ```
//! use archetype_lifecycle::prelude::*;
//! use std::sync::Arc;
//!
//! struct Font;
//! impl Asset for Font {}
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.insert("fonts/main", "main", Font, &["Common"]);
//!
//! let context = AssetContext::new(store, AssetConfig::diagnostic())?;
//! context.resident().load().await?;
//! assert!(context.resident().get::<Font>("main").is_some());
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancelToken;
use crate::config::AssetConfig;
use crate::diagnostics::{DebugReport, Diagnostics};
use crate::error::Result;
use crate::facade::LoadFacade;
use crate::group::{GroupLoader, LookupPolicy};
use crate::resident::ResidentAssets;
use crate::store::ContentStore;
use crate::time::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;

pub struct AssetContext {
    config: AssetConfig,
    store: Arc<dyn ContentStore>,
    scope: CancelToken,
    diagnostics: Option<Diagnostics>,
    facade: LoadFacade,
    resident: ResidentAssets,
}

impl AssetContext {
    pub fn new(store: Arc<dyn ContentStore>, config: AssetConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Context whose diagnostics read time from `clock`
    pub fn with_clock(
        store: Arc<dyn ContentStore>,
        config: AssetConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let scope = CancelToken::new();
        let diagnostics = config.diagnostics.then(|| Diagnostics::new(clock));
        let facade = match &diagnostics {
            Some(diagnostics) => LoadFacade::with_diagnostics(Arc::clone(&store), diagnostics.clone()),
            None => LoadFacade::new(Arc::clone(&store)),
        };
        let resident = ResidentAssets::new(
            Arc::clone(&store),
            &config.common_label,
            LookupPolicy::from_assert_flag(config.assert_on_missing),
            &scope,
        );

        tracing::debug!(
            label = %config.common_label,
            diagnostics = config.diagnostics,
            "asset context created"
        );
        Ok(Self {
            config,
            store,
            scope,
            diagnostics,
            facade,
            resident,
        })
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn facade(&self) -> &LoadFacade {
        &self.facade
    }

    pub fn resident(&self) -> &ResidentAssets {
        &self.resident
    }

    /// `None` when diagnostics are disabled in the config
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Root scope of the context. Request tokens should descend from it.
    pub fn scope(&self) -> &CancelToken {
        &self.scope
    }

    /// Start a group load for `label` with the configured lookup policy
    pub fn load_group(&self, label: &str, token: &CancelToken) -> GroupLoader {
        GroupLoader::load(
            Arc::clone(&self.store),
            label,
            token,
            LookupPolicy::from_assert_flag(self.config.assert_on_missing),
        )
    }

    /// Advance the periodic leak report by one frame
    pub fn tick(&self, delta: Duration) -> Option<String> {
        let diagnostics = self.diagnostics.as_ref()?;
        diagnostics.leaks().report_periodic(
            self.config.report_interval(),
            delta,
            self.config.periodic_detail_limit,
        )
    }

    /// Resident names, registered loads and the leak summary, bounded to
    /// `max_report_chars`
    pub fn debug_report(&self) -> String {
        let report = DebugReport::new(self.config.max_report_chars)
            .section(&self.resident.build_debug_text());

        match &self.diagnostics {
            Some(diagnostics) => report
                .section(&diagnostics.loads().build_debug_text(false))
                .section(&diagnostics.leaks().report_now(self.config.report_detail_limit))
                .finish(),
            None => report.section("(diagnostics disabled)\n").finish(),
        }
    }

    /// Cancel the context scope.
    ///
    /// Handles bound to the scope are released and a resident load in flight
    /// is cancelled. Loaded resident assets stay reserved.
    pub fn shutdown(&self) {
        if !self.scope.is_cancelled() {
            tracing::info!("asset context shutting down");
        }
        self.scope.cancel();
    }
}

impl Drop for AssetContext {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssetError;
    use crate::store::MemoryStore;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AssetConfig {
            max_report_chars: 0,
            ..AssetConfig::default()
        };
        let err = AssetContext::new(Arc::new(MemoryStore::new()), config).err();
        assert!(matches!(err, Some(AssetError::Config(_))));
    }

    #[test]
    fn test_release_config_has_no_diagnostics() {
        let context = AssetContext::new(Arc::new(MemoryStore::new()), AssetConfig::release()).unwrap();
        assert!(context.diagnostics().is_none());
        assert!(context.tick(Duration::from_secs(60)).is_none());
        assert!(context.debug_report().contains("(diagnostics disabled)"));
    }
}
