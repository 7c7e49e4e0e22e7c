//! Provider - Trait abstracting resource operations
//!
//! A Provider exposes the resource types of one cloud and turns the host
//! runtime's Create/Read/Update/Delete/Import calls into backend requests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport, authentication or unexpected backend response
    #[error("{message}")]
    Backend {
        /// HTTP status code, if the backend answered at all
        status: Option<u16>,
        message: String,
    },

    /// The backend does not know the object
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// A poll observed a status that is neither pending nor target
    #[error("unexpected state '{status}', wanted target '{}'", target.join(", "))]
    UnexpectedStatus { status: String, target: Vec<String> },

    /// A poll did not reach its target in time
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_status}', elapsed: {elapsed:?})",
        target.join(", ")
    )]
    Timeout {
        target: Vec<String>,
        last_status: String,
        elapsed: Duration,
    },

    /// Configuration rejected before any backend call
    #[error("{message}")]
    Validation { fields: Vec<String>, message: String },

    /// An in-place update was requested for attributes that force a new resource
    #[error("changing {} requires replacing the resource", fields.join(", "))]
    RequiresReplacement { fields: Vec<String> },

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The backend created the object but waiting for it failed
    #[error("resource {identifier} was created but is not usable: {source}")]
    CreateIncomplete {
        identifier: String,
        #[source]
        source: Box<ProviderError>,
    },

    /// Provider configuration is unusable
    #[error("Invalid provider configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("[{id}] {source}")]
    Resource {
        id: ResourceId,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn validation(fields: &[&str], message: impl Into<String>) -> Self {
        Self::Validation {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            message: message.into(),
        }
    }

    pub fn for_resource(self, id: ResourceId) -> Self {
        // Avoid stacking the same prefix twice
        if matches!(&self, Self::Resource { id: inner, .. } if *inner == id) {
            return self;
        }
        Self::Resource {
            id,
            source: Box::new(self),
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn incomplete(identifier: impl Into<String>, source: ProviderError) -> Self {
        Self::CreateIncomplete {
            identifier: identifier.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through context wrappers
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Context { source, .. }
            | Self::Resource { source, .. }
            | Self::CreateIncomplete { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Backend status code carried by the innermost error
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            Self::Backend { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "networking_subnet_v2")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects against the backend.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "huaweicloudstack")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Refresh a resource from its last known state
    ///
    /// Returns `State::not_found()` if the backend no longer has it.
    fn read(&self, current: &State) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the backend identifier
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(&self, from: &State, to: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, current: &State) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing backend object by identifier alone
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(&self, current: &State) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(current)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(&self, from: &State, to: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(from, to)
    }

    fn delete(&self, current: &State) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(current)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }
}
