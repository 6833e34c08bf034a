// Content store boundary
//
// The asset layer never owns content itself. Everything it hands out is
// backed by a reservation in a `ContentStore`:
// - reservations are opened synchronously when a request is issued
// - resolution is asynchronous (single asset, instance, or labeled batch)
// - every reservation is released exactly once by its owning handle

pub mod memory;

pub use memory::{MemoryStore, StoreStats};

use crate::error::Result;
use async_trait::async_trait;
use glam::{Quat, Vec3};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Trait for values that can live in a content store
pub trait Asset: Send + Sync + 'static {
    /// Get asset type name
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Opaque reservation token issued by a content store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationId(u64);

impl ReservationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a live instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// World placement of a new instance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Placement {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// What a reservation was opened for
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Load one resource by key
    Asset { key: String },
    /// Create a live instance from the template stored under key
    Instantiate {
        key: String,
        placement: Placement,
        parent: Option<InstanceId>,
    },
    /// Load every resource tagged with a label
    Label { label: String },
}

impl Request {
    pub fn asset(key: impl Into<String>) -> Self {
        Request::Asset { key: key.into() }
    }

    pub fn instantiate(
        key: impl Into<String>,
        placement: Placement,
        parent: Option<InstanceId>,
    ) -> Self {
        Request::Instantiate {
            key: key.into(),
            placement,
            parent,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Request::Label {
            label: label.into(),
        }
    }

    /// Key or label this request names
    pub fn key(&self) -> &str {
        match self {
            Request::Asset { key } | Request::Instantiate { key, .. } => key,
            Request::Label { label } => label,
        }
    }
}

/// A named, immutable, type-erased content item
#[derive(Clone)]
pub struct Resource {
    name: Arc<str>,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Resource {
    pub fn new<T: Asset>(name: impl Into<Arc<str>>, value: T) -> Self {
        let type_name = value.type_name();
        Self {
            name: name.into(),
            type_name,
            payload: Arc::new(value),
        }
    }

    /// File name of the resource (not its store key)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path
    pub fn short_type_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }

    pub fn is<T: Asset>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn downcast<T: Asset>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    /// Shared, type-erased payload
    pub fn payload(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.payload
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("type", &self.short_type_name())
            .finish()
    }
}

/// A live object created from a template resource
#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    key: String,
    template: Resource,
    placement: Placement,
    parent: Option<InstanceId>,
}

impl Instance {
    pub fn new(
        id: InstanceId,
        key: impl Into<String>,
        template: Resource,
        placement: Placement,
        parent: Option<InstanceId>,
    ) -> Self {
        Self {
            id,
            key: key.into(),
            template,
            placement,
            parent,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name inherited from the template
    pub fn name(&self) -> &str {
        self.template.name()
    }

    pub fn template(&self) -> &Resource {
        &self.template
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn parent(&self) -> Option<InstanceId> {
        self.parent
    }

    /// Root component of the instance, when it is a `C`
    pub fn component<C: Asset>(&self) -> Option<Arc<C>> {
        self.template.downcast::<C>()
    }
}

impl Asset for Instance {}

/// Outcome of resolving a single reservation
#[derive(Clone, Debug)]
pub enum Resolved {
    Asset(Resource),
    Instance(Arc<Instance>),
}

/// The content system the asset layer reserves from.
///
/// Implementations decide where content comes from; the asset layer only
/// relies on the reservation discipline: `reserve` opens a claim that stays
/// open until `release` is called for it, whatever happens in between.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Open a reservation for `request`. Never blocks.
    fn reserve(&self, request: &Request) -> ReservationId;

    /// Resolve an `Asset` or `Instantiate` reservation
    async fn resolve(&self, reservation: ReservationId) -> Result<Resolved>;

    /// Resolve a `Label` reservation, handing each item to `sink` as it arrives
    async fn resolve_batch(
        &self,
        reservation: ReservationId,
        sink: &(dyn Fn(Resource) + Send + Sync),
    ) -> Result<()>;

    /// Fraction of the reservation completed, 0.0 to 1.0
    fn progress(&self, reservation: ReservationId) -> f32;

    /// Close the reservation and destroy any instance it owns
    fn release(&self, reservation: ReservationId);
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sprite;
    impl Asset for Sprite {}

    struct Clip;
    impl Asset for Clip {}

    #[test]
    fn test_resource_downcast() {
        let resource = Resource::new("icon_a", Sprite);
        assert!(resource.is::<Sprite>());
        assert!(resource.downcast::<Sprite>().is_some());
        assert!(resource.downcast::<Clip>().is_none());
        assert_eq!(resource.short_type_name(), "Sprite");
    }

    #[test]
    fn test_short_type_name_keeps_generics() {
        assert_eq!(short_type_name("a::b::Vec<c::D>"), "Vec<c::D>");
        assert_eq!(short_type_name("u32"), "u32");
    }

    #[test]
    fn test_instance_component() {
        let template = Resource::new("door", Sprite);
        let instance = Instance::new(InstanceId::new(1), "props/door", template, Placement::default(), None);
        assert!(instance.component::<Sprite>().is_some());
        assert!(instance.component::<Clip>().is_none());
        assert_eq!(instance.name(), "door");
    }

    #[test]
    fn test_request_key() {
        assert_eq!(Request::label("Common").key(), "Common");
        assert_eq!(Request::asset("ui/icon").key(), "ui/icon");
    }
}
