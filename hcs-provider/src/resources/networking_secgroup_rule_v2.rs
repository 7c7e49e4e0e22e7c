//! networking_secgroup_rule_v2 - Rules of a neutron security group
//!
//! Neutron has no rule update call; every attribute forces a new rule.

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{
    Attributes, Context, Created, ResourceData, ResourceOps, base_schema, delete_and_wait,
    neutron_delete_conf,
};
use crate::config::Config;
use crate::sdk::networking::{self, SECURITY_GROUP_RULES, SecurityGroupRuleCreateOpts};

const NAME: &str = "networking_secgroup_rule_v2";

const DIRECTIONS: [&str; 2] = ["ingress", "egress"];
const ETHERTYPES: [&str; 2] = ["IPv4", "IPv6"];

pub struct SecGroupRule;

#[derive(Debug, Clone, PartialEq)]
struct SecGroupRuleConfig {
    direction: String,
    ethertype: String,
    security_group_id: String,
    protocol: String,
    port_range_min: Option<i64>,
    port_range_max: Option<i64>,
    remote_ip_prefix: String,
    remote_group_id: String,
    tenant_id: String,
}

impl SecGroupRuleConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let config = Self {
            direction: attrs.required_string("direction")?,
            ethertype: attrs.required_string("ethertype")?,
            security_group_id: attrs.required_string("security_group_id")?,
            protocol: attrs.string_or_default("protocol")?,
            port_range_min: attrs.int("port_range_min")?,
            port_range_max: attrs.int("port_range_max")?,
            remote_ip_prefix: attrs.string_or_default("remote_ip_prefix")?,
            remote_group_id: attrs.string_or_default("remote_group_id")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
        };
        config.check_ports()?;
        Ok(config)
    }

    fn check_ports(&self) -> ProviderResult<()> {
        let fields = &["port_range_min", "port_range_max"];
        for port in [self.port_range_min, self.port_range_max].into_iter().flatten() {
            if !(0..=65535).contains(&port) {
                return Err(ProviderError::validation(
                    fields,
                    format!("{port} is not a valid port"),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.port_range_min, self.port_range_max)
            && min > max
        {
            return Err(ProviderError::validation(
                fields,
                format!("port_range_min ({min}) is greater than port_range_max ({max})"),
            ));
        }
        let has_ports = self.port_range_min.is_some() || self.port_range_max.is_some();
        if has_ports && self.protocol.is_empty() {
            return Err(ProviderError::validation(
                &["protocol"],
                "protocol is required when a port range is set",
            ));
        }
        Ok(())
    }
}

fn one_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

impl ResourceType for SecGroupRule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A single rule of a security group")
            .attribute(
                AttributeSchema::new("direction", one_of(&DIRECTIONS))
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("ethertype", one_of(&ETHERTYPES))
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("security_group_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("protocol", AttributeType::String)
                    .force_new()
                    .with_description("tcp, udp, icmp or an IP protocol number"),
            )
            .attribute(
                AttributeSchema::new("port_range_min", AttributeType::Int)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("port_range_max", AttributeType::Int)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("remote_ip_prefix", types::cidr())
                    .computed()
                    .force_new()
                    .conflicts_with("remote_group_id"),
            )
            .attribute(
                AttributeSchema::new("remote_group_id", AttributeType::String)
                    .computed()
                    .force_new()
                    .conflicts_with("remote_ip_prefix"),
            )
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
    }
}

#[async_trait]
impl ResourceOps for SecGroupRule {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        SecGroupRuleConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = SecGroupRuleConfig::from_attrs(data.attrs)?;
        let opts = SecurityGroupRuleCreateOpts {
            direction: config.direction,
            ethertype: config.ethertype,
            security_group_id: config.security_group_id,
            protocol: config.protocol,
            port_range_min: config.port_range_min,
            port_range_max: config.port_range_max,
            remote_ip_prefix: config.remote_ip_prefix,
            remote_group_id: config.remote_group_id,
            tenant_id: config.tenant_id,
        };
        let rule: networking::SecurityGroupRule = ctx
            .api(&data.region)
            .create(&SECURITY_GROUP_RULES, &opts)
            .await?;
        Ok(Created::new(rule.id))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let rule: networking::SecurityGroupRule = ctx
            .api(&data.region)
            .get(&SECURITY_GROUP_RULES, id)
            .await?;
        Ok(Attributes::new()
            .set("direction", rule.direction)
            .set("ethertype", rule.ethertype)
            .set("security_group_id", rule.security_group_id)
            .set("protocol", rule.protocol)
            .set("port_range_min", rule.port_range_min)
            .set("port_range_max", rule.port_range_max)
            .set("remote_ip_prefix", rule.remote_ip_prefix)
            .set("remote_group_id", rule.remote_group_id)
            .set("tenant_id", rule.tenant_id)
            .build())
    }

    async fn update(
        &self,
        _ctx: &Context,
        _data: &ResourceData<'_>,
        _id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        Err(ProviderError::RequiresReplacement {
            fields: changes.iter().map(str::to_string).collect(),
        })
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE"]);
        delete_and_wait(api, &SECURITY_GROUP_RULES, id, conf, || {
            api.delete(&SECURITY_GROUP_RULES, id)
        })
        .await
    }
}
