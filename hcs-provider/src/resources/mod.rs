//! Resources - Callback sets for every supported resource type
//!
//! Each submodule implements `ResourceOps` for one resource type: a typed
//! configuration struct built from the attribute map, the create/read/
//! update/delete callbacks, and the waits that follow backend calls.

pub mod as_configuration_v1;
pub mod blockstorage_volume_v2;
pub mod compute_keypair_v2;
pub mod compute_servergroup_v2;
pub mod networking_floatingip_v2;
pub mod networking_network_v2;
pub mod networking_port_v2;
pub mod networking_router_interface_v2;
pub mod networking_router_v2;
pub mod networking_secgroup_rule_v2;
pub mod networking_secgroup_v2;
pub mod networking_subnet_v2;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::mutex_kv::MutexKv;
use hcs_core::provider::{ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use hcs_core::timeouts::Timeouts;
use hcs_core::waiter::StateChangeConf;
use serde_json::Value as Json;

use crate::client::{Api, CloudApi, Collection};
use crate::config::Config;
use crate::sdk::ValueSpecs;

/// Neutron objects need a moment before their status is meaningful
pub(crate) const NEUTRON_DELAY: Duration = Duration::from_secs(5);
pub(crate) const NEUTRON_MIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared handles passed to every callback
#[derive(Clone)]
pub struct Context {
    pub api: Arc<dyn CloudApi>,
    pub config: Arc<Config>,
    pub locks: Arc<MutexKv>,
}

impl Context {
    pub fn new(api: Arc<dyn CloudApi>, config: Arc<Config>) -> Self {
        Self {
            api,
            config,
            locks: Arc::new(MutexKv::new()),
        }
    }

    /// API handle bound to `region`
    pub fn api<'a>(&'a self, region: &'a str) -> Api<'a> {
        Api::new(self.api.as_ref(), region)
    }
}

/// Resolved input of one callback
pub struct ResourceData<'a> {
    /// Attributes with schema defaults applied
    pub attrs: Attrs<'a>,
    pub region: String,
    pub timeouts: Timeouts,
}

/// Result of a create call
#[derive(Debug, Clone, Default)]
pub struct Created {
    pub identifier: String,
    /// Attributes only available in the create response
    pub attributes: HashMap<String, Value>,
}

impl Created {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Callbacks of one resource type
#[async_trait]
pub trait ResourceOps: ResourceType {
    /// Checks that need more than the schema (cross-field rules, provider defaults)
    fn validate(&self, _config: &Config, _attrs: Attrs<'_>) -> ProviderResult<()> {
        Ok(())
    }

    /// Issue the create call and return the backend identifier
    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created>;

    /// Wait until a freshly created object is usable
    async fn wait_created(
        &self,
        _ctx: &Context,
        _data: &ResourceData<'_>,
        _id: &str,
    ) -> ProviderResult<()> {
        Ok(())
    }

    /// Fetch the object and map it to attributes
    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>>;

    /// Apply the changed attributes in place
    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()>;

    /// Remove the object and wait until it is gone
    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()>;
}

macro_rules! registry {
    ($($module:ident :: $ops:ident),* $(,)?) => {
        /// Callback sets of every supported resource type
        pub fn resource_ops() -> Vec<Box<dyn ResourceOps>> {
            vec![$(Box::new($module::$ops)),*]
        }

        /// Every supported resource type
        pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
            vec![$(Box::new($module::$ops)),*]
        }
    };
}

registry![
    networking_network_v2::Network,
    networking_subnet_v2::Subnet,
    networking_router_v2::Router,
    networking_router_interface_v2::RouterInterface,
    networking_port_v2::Port,
    networking_floatingip_v2::FloatingIp,
    networking_secgroup_v2::SecGroup,
    networking_secgroup_rule_v2::SecGroupRule,
    compute_keypair_v2::Keypair,
    compute_servergroup_v2::ServerGroup,
    blockstorage_volume_v2::Volume,
    as_configuration_v1::Configuration,
];

/// Attributes every resource type carries: `region` and `timeouts`
pub fn base_schema(name: &str) -> ResourceSchema {
    ResourceSchema::new(name)
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .computed()
                .force_new()
                .with_description("Region of the resource; defaults to the provider region"),
        )
        .attribute(AttributeSchema::new(
            "timeouts",
            AttributeType::Block(
                ["create", "update", "delete"]
                    .into_iter()
                    .map(|op| AttributeSchema::new(op, AttributeType::String))
                    .collect(),
            ),
        ))
}

/// Builder for the attribute map a read returns
#[derive(Debug, Default)]
pub struct Attributes {
    map: HashMap<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.map.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> HashMap<String, Value> {
        self.map
    }
}

/// A nested block value from its fields
pub fn block<const N: usize>(fields: [(&str, Value); N]) -> Value {
    Value::Map(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

pub fn value_specs(attrs: Attrs<'_>) -> ProviderResult<ValueSpecs> {
    attrs.string_map("value_specs")
}

/// Status field of a raw object; objects without one are usable as soon as they exist
pub fn status_of(object: &Json) -> String {
    object
        .get("status")
        .and_then(Json::as_str)
        .unwrap_or("ACTIVE")
        .to_string()
}

/// Run `remove` until it is accepted, then poll `collection` until the object is gone
///
/// Allowlisted status codes returned by either call keep the wait going,
/// and a not-found at any point ends it successfully.
pub async fn delete_and_wait<F, Fut>(
    api: Api<'_>,
    collection: &Collection,
    id: &str,
    conf: StateChangeConf,
    remove: F,
) -> ProviderResult<()>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProviderResult<()>> + Send,
{
    let removed = AtomicBool::new(false);
    let removed = &removed;
    let remove = &remove;
    conf.until_gone()
        .describe(format!("{} {}", collection.kind, id))
        .wait_for_state(|| async move {
            if !removed.load(Ordering::SeqCst) {
                remove().await?;
                removed.store(true, Ordering::SeqCst);
            }
            let object: Json = api.get(collection, id).await?;
            Ok(((), status_of(&object)))
        })
        .await?;
    Ok(())
}

/// Delete-wait settings shared by the neutron resources
pub fn neutron_delete_conf(
    ctx: &Context,
    data: &ResourceData<'_>,
    resource_type: &str,
    pending: &[&str],
) -> StateChangeConf {
    StateChangeConf::new(pending, &["DELETED"])
        .timeout(data.timeouts.delete)
        .delay(NEUTRON_DELAY)
        .min_timeout(NEUTRON_MIN_TIMEOUT)
        .transient_codes(ctx.config.transient_codes(resource_type))
}
