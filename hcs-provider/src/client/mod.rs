//! Client - The seam between resource callbacks and the cloud API
//!
//! `CloudApi` speaks in collections of JSON objects. `RestClient` is the
//! HTTP implementation; tests use an in-memory fake.

pub mod rest;

#[cfg(test)]
pub mod fake;

use std::fmt;

use async_trait::async_trait;
use hcs_core::provider::{ProviderError, ProviderResult};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use thiserror::Error;

pub use rest::RestClient;

/// Error type for cloud API calls
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{method} {url} returned {status}: {body}")]
    UnexpectedStatus {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No {service} endpoint for region '{region}' in the service catalog")]
    EndpointNotFound { service: String, region: String },

    #[error("Failed to decode {kind}: {message}")]
    Decode { kind: String, message: String },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<ApiError> for ProviderError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound { kind, id } => ProviderError::NotFound { kind, id },
            other => ProviderError::Backend {
                status: other.status_code(),
                message: other.to_string(),
            },
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Catalog service a collection lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Network,
    Compute,
    BlockStorage,
    AutoScaling,
}

impl Service {
    /// Service type as listed in the Keystone catalog
    pub fn catalog_type(&self) -> &'static str {
        match self {
            Service::Network => "network",
            Service::Compute => "compute",
            Service::BlockStorage => "volumev2",
            Service::AutoScaling => "as",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.catalog_type())
    }
}

/// A REST collection (e.g., `v2.0/subnets`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub service: Service,
    /// Path below the service endpoint; `{project_id}` is substituted
    pub path: &'static str,
    /// Envelope key of a single object (`{"subnet": {...}}`)
    pub singular: &'static str,
    /// Envelope key of a list (`{"subnets": [...]}`)
    pub plural: &'static str,
    /// Field holding the object identifier
    pub id_field: &'static str,
    /// Whether request bodies are wrapped in the singular envelope
    pub wrap_requests: bool,
    /// Human readable name used in errors
    pub kind: &'static str,
}

/// Raw cloud API
///
/// Objects are passed and returned without their envelope.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn create(&self, region: &str, collection: &Collection, body: Json) -> ApiResult<Json>;

    async fn get(&self, region: &str, collection: &Collection, id: &str) -> ApiResult<Json>;

    async fn update(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        body: Json,
    ) -> ApiResult<Json>;

    async fn delete(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        params: &[(&str, String)],
    ) -> ApiResult<()>;

    /// All objects matching `filter`, across every page
    async fn list(
        &self,
        region: &str,
        collection: &Collection,
        filter: &[(&str, String)],
    ) -> ApiResult<Vec<Json>>;

    /// Member action such as `PUT routers/{id}/add_router_interface`
    async fn action(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        action: &str,
        body: Json,
    ) -> ApiResult<Json>;
}

/// Typed view of a `CloudApi` bound to one region
#[derive(Clone, Copy)]
pub struct Api<'a> {
    inner: &'a dyn CloudApi,
    region: &'a str,
}

impl<'a> Api<'a> {
    pub fn new(inner: &'a dyn CloudApi, region: &'a str) -> Self {
        Self { inner, region }
    }

    pub fn region(&self) -> &str {
        self.region
    }

    pub async fn create<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        collection: &Collection,
        body: &B,
    ) -> ProviderResult<T> {
        let body = encode(collection, body)?;
        debug!("Create {} options: {}", collection.kind, body);
        let raw = self.inner.create(self.region, collection, body).await?;
        decode(collection, raw)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &Collection,
        id: &str,
    ) -> ProviderResult<T> {
        let raw = self.inner.get(self.region, collection, id).await?;
        decode(collection, raw)
    }

    pub async fn update<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        collection: &Collection,
        id: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let body = encode(collection, body)?;
        debug!("Update {} {} options: {}", collection.kind, id, body);
        let raw = self.inner.update(self.region, collection, id, body).await?;
        decode(collection, raw)
    }

    pub async fn delete(&self, collection: &Collection, id: &str) -> ProviderResult<()> {
        self.delete_with(collection, id, &[]).await
    }

    pub async fn delete_with(
        &self,
        collection: &Collection,
        id: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<()> {
        Ok(self.inner.delete(self.region, collection, id, params).await?)
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &Collection,
        filter: &[(&str, String)],
    ) -> ProviderResult<Vec<T>> {
        self.inner
            .list(self.region, collection, filter)
            .await?
            .into_iter()
            .map(|raw| decode(collection, raw))
            .collect()
    }

    pub async fn action<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        collection: &Collection,
        id: &str,
        action: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let body = encode(collection, body)?;
        debug!("{} {} {}: {}", collection.kind, id, action, body);
        let raw = self
            .inner
            .action(self.region, collection, id, action, body)
            .await?;
        decode(collection, raw)
    }
}

fn encode<B: Serialize>(collection: &Collection, body: &B) -> ProviderResult<Json> {
    serde_json::to_value(body).map_err(|e| {
        ProviderError::new(format!(
            "Failed to build {} request: {}",
            collection.kind, e
        ))
    })
}

fn decode<T: DeserializeOwned>(collection: &Collection, raw: Json) -> ProviderResult<T> {
    serde_json::from_value(raw).map_err(|e| {
        ApiError::Decode {
            kind: collection.kind.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}
