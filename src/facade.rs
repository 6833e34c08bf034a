//! Single-asset entry points.
//!
//! Every operation returns a future that issues its request on first poll
//! and resolves to a ready [`ResourceHandle`] or an error. Whatever way the
//! request ends (failure, cancellation of the caller's scope, a type
//! mismatch, or the future being dropped) the reservation has been released
//! by the time control returns to the caller. Only successful loads are
//! registered with [`Diagnostics`].

use crate::cancel::CancelToken;
use crate::diagnostics::{CallSite, Diagnostics};
use crate::error::{AssetError, Result};
use crate::handle::ResourceHandle;
use crate::store::{short_type_name, Asset, ContentStore, Instance, InstanceId, Placement, Request};
use std::future::Future;
use std::sync::Arc;

/// Releases the handle unless disarmed, covering futures dropped mid-flight
struct ReleaseOnDrop<T: Asset>(Option<ResourceHandle<T>>);

impl<T: Asset> ReleaseOnDrop<T> {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl<T: Asset> Drop for ReleaseOnDrop<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            if handle.release() {
                tracing::debug!(key = handle.key(), "load future dropped before completion");
            }
        }
    }
}

/// Issue `request`, wait for it, and hand back a handle only if it is live
async fn acquire<T: Asset>(
    store: Arc<dyn ContentStore>,
    request: Request,
    token: CancelToken,
) -> Result<ResourceHandle<T>> {
    let handle = ResourceHandle::<T>::spawn(store, request, &token);
    let mut guard = ReleaseOnDrop(Some(handle.clone()));

    // Failure and cancellation have already released the handle.
    let outcome = handle.wait().await;
    guard.disarm();
    outcome?;

    if handle.is_released() {
        return Err(AssetError::Cancelled(handle.key().to_string()));
    }
    Ok(handle)
}

/// Stateless load and instantiate operations over a content store
#[derive(Clone)]
pub struct LoadFacade {
    store: Arc<dyn ContentStore>,
    diagnostics: Option<Diagnostics>,
}

impl LoadFacade {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            diagnostics: None,
        }
    }

    /// Facade that registers every successful load with `diagnostics`
    pub fn with_diagnostics(store: Arc<dyn ContentStore>, diagnostics: Diagnostics) -> Self {
        Self {
            store,
            diagnostics: Some(diagnostics),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    /// Load the resource stored under `key` as a `T`.
    ///
    /// A resource of another type is released and reported as
    /// [`AssetError::TypeMismatch`].
    #[track_caller]
    pub fn load_asset<T: Asset>(
        &self,
        key: &str,
        token: &CancelToken,
    ) -> impl Future<Output = Result<ResourceHandle<T>>> + Send + 'static {
        let site = CallSite::caller();
        let store = Arc::clone(&self.store);
        let diagnostics = self.diagnostics.clone();
        let request = Request::asset(key);
        let token = token.clone();

        async move {
            let handle = acquire::<T>(store, request, token).await?;

            if handle.value().is_none() {
                let actual = handle
                    .resource()
                    .map(|resource| resource.short_type_name())
                    .unwrap_or("unknown");
                handle.release();
                return Err(AssetError::TypeMismatch {
                    key: handle.key().to_string(),
                    expected: short_type_name(std::any::type_name::<T>()),
                    actual,
                });
            }

            if let Some(diagnostics) = &diagnostics {
                diagnostics.observe(&handle, site);
            }
            Ok(handle)
        }
    }

    /// Create a live instance from the template under `key`.
    ///
    /// The handle owns the instance: releasing it destroys the instance.
    #[track_caller]
    pub fn instantiate(
        &self,
        key: &str,
        placement: Placement,
        parent: Option<InstanceId>,
        token: &CancelToken,
    ) -> impl Future<Output = Result<ResourceHandle<Instance>>> + Send + 'static {
        let site = CallSite::caller();
        let store = Arc::clone(&self.store);
        let diagnostics = self.diagnostics.clone();
        let request = Request::instantiate(key, placement, parent);
        let token = token.clone();

        async move {
            let handle = acquire::<Instance>(store, request, token).await?;
            if let Some(diagnostics) = &diagnostics {
                diagnostics.observe(&handle, site);
            }
            Ok(handle)
        }
    }

    /// Instantiate and return the instance's `C` component with its handle.
    ///
    /// When the instance has no `C` it is destroyed immediately and
    /// [`AssetError::MissingComponent`] is returned.
    #[track_caller]
    pub fn instantiate_and_get<C: Asset>(
        &self,
        key: &str,
        placement: Placement,
        parent: Option<InstanceId>,
        token: &CancelToken,
    ) -> impl Future<Output = Result<(ResourceHandle<Instance>, Arc<C>)>> + Send + 'static {
        let instantiated = self.instantiate(key, placement, parent, token);

        async move {
            let handle = instantiated.await?;
            let component = handle.value().and_then(|instance| instance.component::<C>());
            match component {
                Some(component) => Ok((handle, component)),
                None => {
                    handle.release();
                    Err(AssetError::MissingComponent {
                        key: handle.key().to_string(),
                        component: short_type_name(std::any::type_name::<C>()),
                    })
                }
            }
        }
    }
}

impl std::fmt::Debug for LoadFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadFacade")
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}
