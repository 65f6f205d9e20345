//! Contract with the external asynchronous loading subsystem.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GenericError;

/// An opaque reference to a loadable entity template.
///
/// Template references identify the blueprint used to create new instances of a kind, and double as the lookup key
/// for resolving an acquire request to its configured kind. Matching is exact. Cheap to clone.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(from = "String")]
pub struct TemplateRef(Arc<str>);

impl TemplateRef {
    /// Returns the template reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TemplateRef {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for TemplateRef {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque handle to a loader-instantiated entity.
///
/// Handles are issued by the [`EntityLoader`] when an instantiation resolves, and are only meaningful to the loader
/// that issued them. The pool treats them as tokens: it stores them for bookkeeping and passes them back to the
/// loader when an entity's underlying resources are to be freed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EntityHandle(u64);

impl EntityHandle {
    /// Creates an entity handle from a raw identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Consumes the handle, returning the raw identifier.
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// An asynchronous entity loader.
///
/// This is the seam between the pool and the host's asset loading subsystem. The pool never creates or destroys
/// entities itself: it asks the loader to instantiate a template, eventually receiving a handle (or a failure), and
/// hands handles back to the loader when overflow entities are reclaimed.
///
/// Multiple instantiations for the same template may be outstanding at once and may resolve in any order; the loader
/// is not required to provide any ordering between them.
#[async_trait]
pub trait EntityLoader: Send + Sync + 'static {
    /// Instantiates a new entity from the given template.
    ///
    /// `parent` is the name of the requesting pool, provided so the loader can group the entity under its logical
    /// owner for bookkeeping purposes.
    ///
    /// # Errors
    ///
    /// If the template cannot be resolved to a concrete entity, an error is returned.
    async fn instantiate(&self, template: &TemplateRef, parent: &str) -> Result<EntityHandle, GenericError>;

    /// Preloads the backing assets for the given template.
    ///
    /// Called once per configured kind when the pool is initialized, before any preallocation, so that subsequent
    /// instantiations resolve faster. The default implementation does nothing.
    ///
    /// # Errors
    ///
    /// If the template's backing assets cannot be loaded, an error is returned.
    async fn preload(&self, _template: &TemplateRef) -> Result<(), GenericError> {
        Ok(())
    }

    /// Releases the underlying resources of a previously instantiated entity.
    ///
    /// Called when an overflow entity's reclaim delay elapses. The handle must not be used again afterwards.
    fn release(&self, handle: EntityHandle);
}
