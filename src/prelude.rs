//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_lifecycle::prelude::*;
//! ```

pub use crate::cancel::CancelToken;
pub use crate::config::AssetConfig;
pub use crate::context::AssetContext;
pub use crate::diagnostics::Diagnostics;
pub use crate::error::{AssetError, Result};
pub use crate::facade::LoadFacade;
pub use crate::group::{GroupLoader, Lookup};
pub use crate::handle::{LoadState, ResourceHandle};
pub use crate::resident::ResidentAssets;
pub use crate::store::{Asset, Instance, MemoryStore, Placement};
pub use glam::{Quat, Vec3};
