//! HuaweiCloudStack Provider implementation
//!
//! Dispatches host runtime calls to the callback set of each resource type.
//! Every call resolves defaults, region and timeouts the same way before the
//! backend is touched, and validation failures never reach the backend.

use std::collections::HashMap;
use std::sync::Arc;

use hcs_core::attrs::Attrs;
use hcs_core::differ::{Diff, diff};
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::{Resource, ResourceId, State, Value};
use hcs_core::schema::ResourceSchema;
use log::{debug, info};

use crate::client::CloudApi;
use crate::client::rest::RestClient;
use crate::config::Config;
use crate::resources::{Context, ResourceData, ResourceOps, resource_ops};

/// HuaweiCloudStack Provider
pub struct HcsProvider {
    ctx: Context,
    resources: HashMap<&'static str, Box<dyn ResourceOps>>,
}

/// Apply schema defaults and run every configuration check of the resource type
fn check_attributes(
    ops: &dyn ResourceOps,
    config: &Config,
    attributes: &mut HashMap<String, Value>,
) -> ProviderResult<()> {
    let schema = ops.schema();
    schema.apply_defaults(attributes);
    schema.check(attributes)?;
    ops.validate(config, Attrs::new(attributes))?;
    schema.timeouts.with_overrides(Attrs::new(attributes))?;
    Ok(())
}

/// Validate a resource without contacting the backend
pub fn validate_resource(config: &Config, resource: &Resource) -> ProviderResult<()> {
    let ops = resource_ops()
        .into_iter()
        .find(|ops| ops.name() == resource.id.resource_type)
        .ok_or_else(|| ProviderError::UnknownResourceType(resource.id.resource_type.clone()))?;
    let mut attributes = resource.attributes.clone();
    check_attributes(ops.as_ref(), config, &mut attributes)
        .map_err(|e| e.for_resource(resource.id.clone()))
}

fn existing(
    id: ResourceId,
    identifier: &str,
    mut attributes: HashMap<String, Value>,
    region: &str,
) -> State {
    attributes.insert("region".to_string(), Value::from(region));
    State::existing(id, attributes).with_identifier(identifier)
}

impl HcsProvider {
    /// Create a provider talking to the cloud described by `config`
    pub fn new(config: Config) -> ProviderResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let api = RestClient::new(config.clone())?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Create a provider on top of an existing API implementation
    pub fn with_api(config: Arc<Config>, api: Arc<dyn CloudApi>) -> Self {
        let resources = resource_ops()
            .into_iter()
            .map(|ops| (ops.name(), ops))
            .collect();
        Self {
            ctx: Context::new(api, config),
            resources,
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    fn ops(&self, resource_type: &str) -> ProviderResult<&dyn ResourceOps> {
        self.resources
            .get(resource_type)
            .map(|ops| ops.as_ref())
            .ok_or_else(|| ProviderError::UnknownResourceType(resource_type.to_string()))
    }

    fn resource_data<'a>(
        &self,
        schema: &ResourceSchema,
        attributes: &'a HashMap<String, Value>,
    ) -> ProviderResult<ResourceData<'a>> {
        let attrs = Attrs::new(attributes);
        let region = self
            .ctx
            .config
            .resolve_region(attrs.non_empty_string("region")?.as_deref());
        Ok(ResourceData {
            attrs,
            region,
            timeouts: schema.timeouts.with_overrides(attrs)?,
        })
    }

    // =========================================================================
    // Provider Operations
    // =========================================================================

    /// Create a resource and return its state as read back from the backend
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        self.create_inner(resource)
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))
    }

    async fn create_inner(&self, resource: &Resource) -> ProviderResult<State> {
        let ops = self.ops(&resource.id.resource_type)?;
        let mut attributes = resource.attributes.clone();
        check_attributes(ops, &self.ctx.config, &mut attributes)?;
        let schema = ops.schema();
        let data = self.resource_data(&schema, &attributes)?;

        info!("Creating {} in region {}", resource.id, data.region);
        let created = ops.create(&self.ctx, &data).await?;
        let identifier = created.identifier;
        info!("Created {} with identifier {}", resource.id, identifier);

        // The object exists from here on; failures must still report its identifier
        if let Err(e) = ops.wait_created(&self.ctx, &data, &identifier).await {
            return Err(ProviderError::incomplete(identifier, e));
        }
        let mut read = match ops.read(&self.ctx, &data, &identifier).await {
            Ok(read) => read,
            Err(e) => return Err(ProviderError::incomplete(identifier, e)),
        };
        for (key, value) in created.attributes {
            read.entry(key).or_insert(value);
        }

        Ok(existing(resource.id.clone(), &identifier, read, &data.region).carry_over(&attributes))
    }

    /// Refresh a resource; a resource gone from the backend reads as not found
    pub async fn read_resource(&self, current: &State) -> ProviderResult<State> {
        self.read_inner(current)
            .await
            .map_err(|e| e.for_resource(current.id.clone()))
    }

    async fn read_inner(&self, current: &State) -> ProviderResult<State> {
        let Some(identifier) = current.identifier.as_deref() else {
            return Ok(State::not_found(current.id.clone()));
        };
        let ops = self.ops(&current.id.resource_type)?;
        let schema = ops.schema();
        let data = self.resource_data(&schema, &current.attributes)?;

        match ops.read(&self.ctx, &data, identifier).await {
            Ok(read) => Ok(existing(current.id.clone(), identifier, read, &data.region)
                .carry_over(&current.attributes)),
            Err(e) if e.is_not_found() => {
                info!("{} ({}) no longer exists", current.id, identifier);
                Ok(State::not_found(current.id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the differences between `from` and `to` in place
    pub async fn update_resource(&self, from: &State, to: &Resource) -> ProviderResult<State> {
        self.update_inner(from, to)
            .await
            .map_err(|e| e.for_resource(to.id.clone()))
    }

    async fn update_inner(&self, from: &State, to: &Resource) -> ProviderResult<State> {
        let identifier = from
            .identifier
            .as_deref()
            .filter(|_| from.exists)
            .ok_or_else(|| ProviderError::not_found(to.id.resource_type.clone(), &to.id.name))?;
        let ops = self.ops(&to.id.resource_type)?;
        let mut attributes = to.attributes.clone();
        check_attributes(ops, &self.ctx.config, &mut attributes)?;
        if !attributes.contains_key("region")
            && let Some(region) = from.attributes.get("region")
        {
            attributes.insert("region".to_string(), region.clone());
        }
        let schema = ops.schema();
        let desired = Resource {
            id: to.id.clone(),
            attributes,
        };
        let data = self.resource_data(&schema, &desired.attributes)?;

        match diff(&desired, from, &schema) {
            Diff::Replace(fields) => return Err(ProviderError::RequiresReplacement { fields }),
            Diff::Create => {
                return Err(ProviderError::not_found(to.id.resource_type.clone(), identifier));
            }
            Diff::NoChange => debug!("{} has no changes", to.id),
            Diff::Update(changes) => {
                info!(
                    "Updating {} ({})",
                    to.id,
                    changes.iter().collect::<Vec<_>>().join(", ")
                );
                ops.update(&self.ctx, &data, identifier, &changes).await?;
            }
        }

        let read = ops
            .read(&self.ctx, &data, identifier)
            .await
            .map_err(|e| e.context("Error reading updated resource"))?;
        Ok(existing(to.id.clone(), identifier, read, &data.region).carry_over(&desired.attributes))
    }

    /// Delete a resource and wait until it is gone; deleting an absent resource succeeds
    pub async fn delete_resource(&self, current: &State) -> ProviderResult<()> {
        self.delete_inner(current)
            .await
            .map_err(|e| e.for_resource(current.id.clone()))
    }

    async fn delete_inner(&self, current: &State) -> ProviderResult<()> {
        let Some(identifier) = current.identifier.as_deref() else {
            debug!("{} has no identifier, nothing to delete", current.id);
            return Ok(());
        };
        let ops = self.ops(&current.id.resource_type)?;
        let schema = ops.schema();
        let data = self.resource_data(&schema, &current.attributes)?;

        info!("Deleting {} ({})", current.id, identifier);
        match ops.delete(&self.ctx, &data, identifier).await {
            Ok(()) => {
                info!("Deleted {}", current.id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!("{} ({}) already deleted", current.id, identifier);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Adopt an existing backend object by identifier
    pub async fn import_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        self.import_inner(id, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }

    async fn import_inner(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let ops = self.ops(&id.resource_type)?;
        let schema = ops.schema();
        let empty = HashMap::new();
        let data = self.resource_data(&schema, &empty)?;

        info!("Importing {} from {}", id, identifier);
        let read = ops
            .read(&self.ctx, &data, identifier)
            .await
            .map_err(|e| e.context(format!("Cannot import non-existent remote object {identifier}")))?;
        Ok(existing(id.clone(), identifier, read, &data.region))
    }
}
