//! networking_router_v2 - Neutron routers
//!
//! Router updates and router interface changes serialize on the router id.

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use hcs_core::waiter::StateChangeConf;
use log::debug;

use super::{
    Attributes, Context, Created, NEUTRON_DELAY, NEUTRON_MIN_TIMEOUT, ResourceData, ResourceOps,
    base_schema, delete_and_wait, neutron_delete_conf, value_specs,
};
use crate::config::Config;
use crate::sdk::ValueSpecs;
use crate::sdk::networking::{self, GatewayInfo, ROUTERS, RouterCreateOpts, RouterUpdateOpts};

const NAME: &str = "networking_router_v2";

pub struct Router;

#[derive(Debug, Clone, PartialEq)]
struct RouterConfig {
    name: String,
    admin_state_up: Option<bool>,
    distributed: Option<bool>,
    external_gateway: String,
    enable_snat: Option<bool>,
    tenant_id: String,
    value_specs: ValueSpecs,
}

impl RouterConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let config = Self {
            name: attrs.string_or_default("name")?,
            admin_state_up: attrs.bool("admin_state_up")?,
            distributed: attrs.bool("distributed")?,
            external_gateway: attrs.string_or_default("external_gateway")?,
            enable_snat: attrs.bool("enable_snat")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            value_specs: value_specs(attrs)?,
        };
        if config.enable_snat.is_some() && config.external_gateway.is_empty() {
            return Err(ProviderError::validation(
                &["enable_snat", "external_gateway"],
                "enable_snat requires external_gateway",
            ));
        }
        Ok(config)
    }

    fn gateway_info(&self) -> Option<GatewayInfo> {
        (!self.external_gateway.is_empty()).then(|| GatewayInfo {
            network_id: self.external_gateway.clone(),
            enable_snat: self.enable_snat,
        })
    }
}

impl ResourceType for Router {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A neutron router")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("admin_state_up", AttributeType::Bool).computed())
            .attribute(
                AttributeSchema::new("distributed", AttributeType::Bool)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("external_gateway", AttributeType::String)
                    .with_description("Id of the external network"),
            )
            .attribute(AttributeSchema::new("enable_snat", AttributeType::Bool).computed())
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for Router {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        RouterConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = RouterConfig::from_attrs(data.attrs)?;
        let opts = RouterCreateOpts {
            external_gateway_info: config.gateway_info(),
            name: config.name,
            admin_state_up: config.admin_state_up,
            distributed: config.distributed,
            tenant_id: config.tenant_id,
            value_specs: config.value_specs,
        };
        let router: networking::Router = ctx.api(&data.region).create(&ROUTERS, &opts).await?;
        Ok(Created::new(router.id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        StateChangeConf::new(&["BUILD", "PENDING_CREATE", "PENDING_UPDATE"], &["ACTIVE"])
            .timeout(data.timeouts.create)
            .delay(NEUTRON_DELAY)
            .min_timeout(NEUTRON_MIN_TIMEOUT)
            .describe(format!("router {id}"))
            .wait_for_state(|| async move {
                let router: networking::Router = api.get(&ROUTERS, id).await?;
                let status = router.status.clone();
                Ok((router, status))
            })
            .await?;
        Ok(())
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let router: networking::Router = ctx.api(&data.region).get(&ROUTERS, id).await?;
        let gateway = router.external_gateway_info;
        let mut attributes = Attributes::new()
            .set("name", router.name)
            .set("admin_state_up", router.admin_state_up)
            .set("distributed", router.distributed)
            .set("tenant_id", router.tenant_id)
            .set("external_gateway", gateway.network_id);
        if let Some(snat) = gateway.enable_snat {
            attributes = attributes.set("enable_snat", snat);
        }
        Ok(attributes.build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = RouterConfig::from_attrs(data.attrs)?;
        let _lock = ctx.locks.lock(id).await;

        let mut opts = RouterUpdateOpts::default();
        if changes.has("name") {
            opts.name = Some(config.name.clone());
        }
        if changes.has("admin_state_up") {
            opts.admin_state_up = config.admin_state_up;
        }
        if changes.any(&["external_gateway", "enable_snat"]) {
            // Empty gateway info (`{}`) detaches the gateway
            opts.external_gateway_info = Some(config.gateway_info().unwrap_or_default());
        }

        debug!("Updating router {} with {:?}", id, opts);
        let _: networking::Router = ctx.api(&data.region).update(&ROUTERS, id, &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE"]);
        delete_and_wait(api, &ROUTERS, id, conf, || api.delete(&ROUTERS, id)).await
    }
}
