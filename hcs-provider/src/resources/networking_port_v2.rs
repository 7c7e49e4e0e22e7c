//! networking_port_v2 - Neutron ports

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use hcs_core::waiter::StateChangeConf;

use super::{
    Attributes, Context, Created, NEUTRON_DELAY, NEUTRON_MIN_TIMEOUT, ResourceData, ResourceOps,
    base_schema, block, delete_and_wait, neutron_delete_conf, value_specs,
};
use crate::config::Config;
use crate::sdk::ValueSpecs;
use crate::sdk::networking::{
    self, AddressPair, FixedIp, PORTS, PortCreateOpts, PortUpdateOpts,
};

const NAME: &str = "networking_port_v2";

pub struct Port;

#[derive(Debug, Clone, PartialEq)]
struct PortConfig {
    name: String,
    network_id: String,
    admin_state_up: Option<bool>,
    mac_address: String,
    tenant_id: String,
    device_owner: String,
    device_id: String,
    security_group_ids: Vec<String>,
    no_security_groups: bool,
    fixed_ips: Vec<FixedIp>,
    allowed_address_pairs: Vec<AddressPair>,
    value_specs: ValueSpecs,
}

impl PortConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let config = Self {
            name: attrs.string_or_default("name")?,
            network_id: attrs.required_string("network_id")?,
            admin_state_up: attrs.bool("admin_state_up")?,
            mac_address: attrs.string_or_default("mac_address")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            device_owner: attrs.string_or_default("device_owner")?,
            device_id: attrs.string_or_default("device_id")?,
            security_group_ids: attrs.strings("security_group_ids")?,
            no_security_groups: attrs.bool_or("no_security_groups", false)?,
            fixed_ips: attrs
                .blocks("fixed_ip")?
                .into_iter()
                .map(|ip| {
                    Ok(FixedIp {
                        subnet_id: ip.required_string("subnet_id")?,
                        ip_address: ip.string_or_default("ip_address")?,
                    })
                })
                .collect::<ProviderResult<_>>()?,
            allowed_address_pairs: attrs
                .blocks("allowed_address_pairs")?
                .into_iter()
                .map(|pair| {
                    Ok(AddressPair {
                        ip_address: pair.required_string("ip_address")?,
                        mac_address: pair.string_or_default("mac_address")?,
                    })
                })
                .collect::<ProviderResult<_>>()?,
            value_specs: value_specs(attrs)?,
        };
        if config.no_security_groups && !config.security_group_ids.is_empty() {
            return Err(ProviderError::validation(
                &["no_security_groups", "security_group_ids"],
                "security_group_ids cannot be set when no_security_groups is true",
            ));
        }
        Ok(config)
    }

    /// Security groups as sent to the API; `Some([])` strips the defaults
    fn security_groups(&self) -> Option<Vec<String>> {
        if self.no_security_groups {
            Some(Vec::new())
        } else if self.security_group_ids.is_empty() {
            None
        } else {
            Some(self.security_group_ids.clone())
        }
    }
}

impl ResourceType for Port {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A neutron port")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(
                AttributeSchema::new("network_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("admin_state_up", AttributeType::Bool).computed())
            .attribute(
                AttributeSchema::new("mac_address", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("device_owner", AttributeType::String).computed())
            .attribute(AttributeSchema::new("device_id", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("security_group_ids", types::strings())
                    .computed()
                    .conflicts_with("no_security_groups"),
            )
            .attribute(
                AttributeSchema::new("no_security_groups", AttributeType::Bool)
                    .conflicts_with("security_group_ids"),
            )
            .attribute(AttributeSchema::new(
                "fixed_ip",
                AttributeType::List(Box::new(AttributeType::Block(vec![
                    AttributeSchema::new("subnet_id", AttributeType::String).required(),
                    AttributeSchema::new("ip_address", types::ip_address()),
                ]))),
            ))
            .attribute(
                AttributeSchema::new(
                    "allowed_address_pairs",
                    AttributeType::List(Box::new(AttributeType::Block(vec![
                        AttributeSchema::new("ip_address", AttributeType::String).required(),
                        AttributeSchema::new("mac_address", AttributeType::String).computed(),
                    ]))),
                )
                .computed(),
            )
            .attribute(AttributeSchema::new("all_fixed_ips", types::strings()).computed())
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for Port {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        PortConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = PortConfig::from_attrs(data.attrs)?;
        let opts = PortCreateOpts {
            security_groups: config.security_groups(),
            fixed_ips: (!config.fixed_ips.is_empty()).then(|| config.fixed_ips.clone()),
            network_id: config.network_id,
            name: config.name,
            admin_state_up: config.admin_state_up,
            mac_address: config.mac_address,
            tenant_id: config.tenant_id,
            device_owner: config.device_owner,
            device_id: config.device_id,
            allowed_address_pairs: config.allowed_address_pairs,
            value_specs: config.value_specs,
        };
        let port: networking::Port = ctx.api(&data.region).create(&PORTS, &opts).await?;
        Ok(Created::new(port.id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        StateChangeConf::new(&["BUILD"], &["ACTIVE", "DOWN"])
            .timeout(data.timeouts.create)
            .delay(NEUTRON_DELAY)
            .min_timeout(NEUTRON_MIN_TIMEOUT)
            .describe(format!("port {id}"))
            .wait_for_state(|| async move {
                let port: networking::Port = api.get(&PORTS, id).await?;
                let status = port.status.clone();
                Ok((port, status))
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
        let port: networking::Port = ctx.api(&data.region).get(&PORTS, id).await?;

        let all_fixed_ips: Vec<String> = port
            .fixed_ips
            .iter()
            .map(|ip| ip.ip_address.clone())
            .collect();
        // The backend fills in the port's own MAC for pairs configured without one
        let pairs = port
            .allowed_address_pairs
            .into_iter()
            .map(|pair| {
                if pair.mac_address.is_empty() || pair.mac_address == port.mac_address {
                    block([("ip_address", pair.ip_address.into())])
                } else {
                    block([
                        ("ip_address", pair.ip_address.into()),
                        ("mac_address", pair.mac_address.into()),
                    ])
                }
            })
            .collect();

        Ok(Attributes::new()
            .set("name", port.name)
            .set("network_id", port.network_id)
            .set("admin_state_up", port.admin_state_up)
            .set("mac_address", port.mac_address)
            .set("tenant_id", port.tenant_id)
            .set("device_owner", port.device_owner)
            .set("device_id", port.device_id)
            .set("security_group_ids", port.security_groups)
            .set("all_fixed_ips", all_fixed_ips)
            .set("allowed_address_pairs", Value::List(pairs))
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = PortConfig::from_attrs(data.attrs)?;
        let mut opts = PortUpdateOpts::default();

        if changes.has("name") {
            opts.name = Some(config.name.clone());
        }
        if changes.has("admin_state_up") {
            opts.admin_state_up = config.admin_state_up;
        }
        if changes.has("device_owner") {
            opts.device_owner = Some(config.device_owner.clone());
        }
        if changes.has("device_id") {
            opts.device_id = Some(config.device_id.clone());
        }
        if changes.any(&["security_group_ids", "no_security_groups"]) {
            opts.security_groups = Some(config.security_groups().unwrap_or_default());
        }
        if changes.has("fixed_ip") {
            opts.fixed_ips = Some(config.fixed_ips.clone());
        }
        if changes.has("allowed_address_pairs") {
            opts.allowed_address_pairs = Some(config.allowed_address_pairs.clone());
        }

        let _: networking::Port = ctx.api(&data.region).update(&PORTS, id, &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE", "DOWN"]);
        delete_and_wait(api, &PORTS, id, conf, || api.delete(&PORTS, id)).await
    }
}
