//! networking_floatingip_v2 - Floating IPs allocated from an external network pool

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
use crate::client::Api;
use crate::config::Config;
use crate::sdk::networking::{
    FLOATING_IPS, FloatingIpCreateOpts, FloatingIpUpdateOpts, NETWORKS, Network,
};
use crate::sdk::{ValueSpecs, networking};

const NAME: &str = "networking_floatingip_v2";

pub struct FloatingIp;

#[derive(Debug, Clone, PartialEq)]
struct FloatingIpConfig {
    pool: String,
    port_id: String,
    tenant_id: String,
    fixed_ip: String,
    value_specs: ValueSpecs,
}

impl FloatingIpConfig {
    /// `pool` falls back to the provider's default pool
    fn from_attrs(attrs: Attrs<'_>, config: &Config) -> ProviderResult<Self> {
        let pool = attrs
            .non_empty_string("pool")?
            .or_else(|| config.pool_name.clone())
            .ok_or_else(|| {
                ProviderError::validation(
                    &["pool"],
                    "pool is required when no default pool (OS_POOL_NAME) is configured",
                )
            })?;
        Ok(Self {
            pool,
            port_id: attrs.string_or_default("port_id")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            fixed_ip: attrs.string_or_default("fixed_ip")?,
            value_specs: value_specs(attrs)?,
        })
    }
}

async fn network_id_by_name(api: Api<'_>, name: &str) -> ProviderResult<String> {
    let networks: Vec<Network> = api.list(&NETWORKS, &[("name", name.to_string())]).await?;
    match networks.as_slice() {
        [network] => Ok(network.id.clone()),
        [] => Err(ProviderError::validation(
            &["pool"],
            format!("No network found with name: {name}"),
        )),
        _ => Err(ProviderError::validation(
            &["pool"],
            format!("More than one network found with name: {name}"),
        )),
    }
}

/// Name of the pool network, or "" when the network is not visible to the caller
///
/// Only the floating IP's own absence may turn a read into "not found".
async fn pool_name(api: Api<'_>, network_id: &str) -> ProviderResult<String> {
    let networks: Vec<Network> = api
        .list(&NETWORKS, &[("id", network_id.to_string())])
        .await
        .map_err(|e| e.context("Error retrieving floating IP pool name"))?;
    match networks.into_iter().next() {
        Some(network) => Ok(network.name),
        None => {
            debug!("Pool network {} is not visible", network_id);
            Ok(String::new())
        }
    }
}

impl ResourceType for FloatingIp {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A floating IP from an external network")
            .attribute(AttributeSchema::new("address", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("pool", AttributeType::String)
                    .computed()
                    .force_new()
                    .with_description("Name of the external network; defaults to OS_POOL_NAME"),
            )
            .attribute(AttributeSchema::new("port_id", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("fixed_ip", types::ip_address()).computed())
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for FloatingIp {
    fn validate(&self, config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        FloatingIpConfig::from_attrs(attrs, config).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = FloatingIpConfig::from_attrs(data.attrs, &ctx.config)?;
        let api = ctx.api(&data.region);

        let floating_network_id = network_id_by_name(api, &config.pool).await?;
        debug!("Pool {} is network {}", config.pool, floating_network_id);

        let opts = FloatingIpCreateOpts {
            floating_network_id,
            port_id: config.port_id,
            tenant_id: config.tenant_id,
            fixed_ip_address: config.fixed_ip,
            value_specs: config.value_specs,
        };
        let fip: networking::FloatingIp = api.create(&FLOATING_IPS, &opts).await?;
        Ok(Created::new(fip.id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        // An unassociated address stays DOWN, which is as usable as ACTIVE
        StateChangeConf::new(&[], &["ACTIVE"])
            .timeout(data.timeouts.create)
            .delay(NEUTRON_DELAY)
            .min_timeout(NEUTRON_MIN_TIMEOUT)
            .describe(format!("floating IP {id}"))
            .wait_for_state(|| async move {
                let fip: networking::FloatingIp = api.get(&FLOATING_IPS, id).await?;
                let status = match fip.status.as_str() {
                    "DOWN" | "ACTIVE" => "ACTIVE".to_string(),
                    other => other.to_string(),
                };
                Ok((fip, status))
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
        let api = ctx.api(&data.region);
        let fip: networking::FloatingIp = api.get(&FLOATING_IPS, id).await?;
        let pool = pool_name(api, &fip.floating_network_id).await?;

        Ok(Attributes::new()
            .set("address", fip.floating_ip_address)
            .set("port_id", fip.port_id)
            .set("fixed_ip", fip.fixed_ip_address)
            .set("tenant_id", fip.tenant_id)
            .set("pool", pool)
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        if !changes.has("port_id") {
            return Ok(());
        }
        let port_id = data.attrs.non_empty_string("port_id")?;
        debug!("Associating floating IP {} with port {:?}", id, port_id);
        let opts = FloatingIpUpdateOpts { port_id };
        let _: networking::FloatingIp = ctx
            .api(&data.region)
            .update(&FLOATING_IPS, id, &opts)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE", "DOWN"]);
        delete_and_wait(api, &FLOATING_IPS, id, conf, || api.delete(&FLOATING_IPS, id)).await
    }
}
