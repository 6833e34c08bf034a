// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Asset lifecycle and reference tracking.
//!
//! Every load issued through this crate is backed by one reservation in a
//! [`ContentStore`](store::ContentStore) and is released exactly once,
//! whichever way the request ends. On top of that sit batched label loads
//! ([`GroupLoader`]), process-lifetime assets ([`ResidentAssets`]) and
//! weak-reference leak tracking ([`diagnostics::LeakTracker`]), all owned by
//! an explicitly constructed [`AssetContext`].

pub mod cancel;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod facade;
pub mod group;
pub mod handle;
pub mod prelude;
pub mod resident;
pub mod store;
pub mod time;

pub use cancel::{CancelGuard, CancelToken};
pub use config::AssetConfig;
pub use context::AssetContext;
pub use diagnostics::{CallSite, Diagnostics, LeakTracker, LoadRegistry};
pub use error::*;
pub use facade::LoadFacade;
pub use group::{BatchStatus, GroupLoader, Lookup, LookupPolicy};
pub use handle::{LoadState, ResourceHandle};
pub use resident::{ResidentAssets, ResidentPhase};
pub use store::{
    Asset, ContentStore, Instance, InstanceId, MemoryStore, Placement, Request, ReservationId,
    Resolved, Resource,
};
