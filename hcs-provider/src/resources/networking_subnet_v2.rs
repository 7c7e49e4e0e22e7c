//! networking_subnet_v2 - Neutron subnets

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use hcs_core::waiter::StateChangeConf;
use serde_json::Value as Json;

use super::{
    Attributes, Context, Created, NEUTRON_DELAY, NEUTRON_MIN_TIMEOUT, ResourceData, ResourceOps,
    base_schema, block, delete_and_wait, neutron_delete_conf, status_of, value_specs,
};
use crate::config::Config;
use crate::sdk::ValueSpecs;
use crate::sdk::networking::{
    self, AllocationPool, HostRoute, SUBNETS, SubnetCreateOpts, SubnetUpdateOpts,
};

const NAME: &str = "networking_subnet_v2";

pub struct Subnet;

#[derive(Debug, Clone, PartialEq)]
struct SubnetConfig {
    network_id: String,
    cidr: String,
    name: String,
    tenant_id: String,
    allocation_pools: Vec<AllocationPool>,
    gateway_ip: String,
    no_gateway: bool,
    ip_version: i64,
    enable_dhcp: bool,
    dns_nameservers: Vec<String>,
    host_routes: Vec<HostRoute>,
    value_specs: ValueSpecs,
}

impl SubnetConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let config = Self {
            network_id: attrs.required_string("network_id")?,
            cidr: attrs.required_string("cidr")?,
            name: attrs.string_or_default("name")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            allocation_pools: attrs
                .blocks("allocation_pools")?
                .into_iter()
                .map(|pool| {
                    Ok(AllocationPool {
                        start: pool.required_string("start")?,
                        end: pool.required_string("end")?,
                    })
                })
                .collect::<ProviderResult<_>>()?,
            gateway_ip: attrs.string_or_default("gateway_ip")?,
            no_gateway: attrs.bool_or("no_gateway", false)?,
            ip_version: attrs.int("ip_version")?.unwrap_or(4),
            enable_dhcp: attrs.bool_or("enable_dhcp", true)?,
            dns_nameservers: attrs.strings("dns_nameservers")?,
            host_routes: attrs
                .blocks("host_routes")?
                .into_iter()
                .map(|route| {
                    Ok(HostRoute {
                        destination: route.required_string("destination_cidr")?,
                        nexthop: route.required_string("next_hop")?,
                    })
                })
                .collect::<ProviderResult<_>>()?,
            value_specs: value_specs(attrs)?,
        };

        if !config.gateway_ip.is_empty() && config.no_gateway {
            return Err(ProviderError::validation(
                &["gateway_ip", "no_gateway"],
                "Both gateway_ip and no_gateway cannot be set",
            ));
        }
        if !matches!(config.ip_version, 4 | 6) {
            return Err(ProviderError::validation(
                &["ip_version"],
                format!("ip_version must be 4 or 6, got {}", config.ip_version),
            ));
        }
        let is_v6 = config.cidr.contains(':');
        if is_v6 != (config.ip_version == 6) {
            return Err(ProviderError::validation(
                &["cidr", "ip_version"],
                format!(
                    "cidr {} is not an IPv{} network",
                    config.cidr, config.ip_version
                ),
            ));
        }
        Ok(config)
    }

    /// Gateway as sent to the API: `Some(None)` disables it
    fn gateway(&self) -> Option<Option<String>> {
        if self.no_gateway {
            Some(None)
        } else if self.gateway_ip.is_empty() {
            None
        } else {
            Some(Some(self.gateway_ip.clone()))
        }
    }
}

fn pool_block() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("start", types::ip_address()).required(),
        AttributeSchema::new("end", types::ip_address()).required(),
    ])
}

fn route_block() -> AttributeType {
    AttributeType::Block(vec![
        AttributeSchema::new("destination_cidr", types::cidr()).required(),
        AttributeSchema::new("next_hop", types::ip_address()).required(),
    ])
}

impl ResourceType for Subnet {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A neutron subnet")
            .attribute(
                AttributeSchema::new("network_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("cidr", types::cidr())
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("allocation_pools", AttributeType::List(Box::new(pool_block())))
                    .computed(),
            )
            .attribute(
                AttributeSchema::new("gateway_ip", types::ip_address())
                    .computed()
                    .conflicts_with("no_gateway"),
            )
            .attribute(
                AttributeSchema::new("no_gateway", AttributeType::Bool).conflicts_with("gateway_ip"),
            )
            .attribute(
                AttributeSchema::new("ip_version", AttributeType::Int)
                    .with_default(Value::Int(4))
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("enable_dhcp", types::true_only())
                    .with_default(Value::Bool(true)),
            )
            .attribute(AttributeSchema::new("dns_nameservers", types::strings()))
            .attribute(AttributeSchema::new(
                "host_routes",
                AttributeType::List(Box::new(route_block())),
            ))
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for Subnet {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        SubnetConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = SubnetConfig::from_attrs(data.attrs)?;
        let opts = SubnetCreateOpts {
            gateway_ip: config.gateway(),
            network_id: config.network_id,
            cidr: config.cidr,
            name: config.name,
            tenant_id: config.tenant_id,
            ip_version: config.ip_version,
            enable_dhcp: config.enable_dhcp,
            allocation_pools: config.allocation_pools,
            dns_nameservers: config.dns_nameservers,
            host_routes: config.host_routes,
            value_specs: config.value_specs,
        };
        let subnet: networking::Subnet = ctx.api(&data.region).create(&SUBNETS, &opts).await?;
        Ok(Created::new(subnet.id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        StateChangeConf::new(&[], &["ACTIVE"])
            .timeout(data.timeouts.create)
            .delay(NEUTRON_DELAY)
            .min_timeout(NEUTRON_MIN_TIMEOUT)
            .describe(format!("subnet {id}"))
            .wait_for_state(|| async move {
                let subnet: Json = api.get(&SUBNETS, id).await?;
                let status = status_of(&subnet);
                Ok((subnet, status))
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
        let subnet: networking::Subnet = ctx.api(&data.region).get(&SUBNETS, id).await?;
        let pools = subnet
            .allocation_pools
            .into_iter()
            .map(|p| block([("start", p.start.into()), ("end", p.end.into())]))
            .collect();
        let routes = subnet
            .host_routes
            .into_iter()
            .map(|r| {
                block([
                    ("destination_cidr", r.destination.into()),
                    ("next_hop", r.nexthop.into()),
                ])
            })
            .collect();
        Ok(Attributes::new()
            .set("network_id", subnet.network_id)
            .set("cidr", subnet.cidr)
            .set("ip_version", subnet.ip_version)
            .set("name", subnet.name)
            .set("tenant_id", subnet.tenant_id)
            .set("gateway_ip", subnet.gateway_ip)
            .set("dns_nameservers", subnet.dns_nameservers)
            .set("host_routes", Value::List(routes))
            .set("enable_dhcp", subnet.enable_dhcp)
            .set("allocation_pools", Value::List(pools))
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = SubnetConfig::from_attrs(data.attrs)?;
        let mut opts = SubnetUpdateOpts::default();

        if changes.has("name") {
            opts.name = Some(config.name.clone());
        }
        if changes.has("gateway_ip") && !config.gateway_ip.is_empty() {
            opts.gateway_ip = Some(Some(config.gateway_ip.clone()));
        }
        if changes.has("no_gateway") && config.no_gateway {
            opts.gateway_ip = Some(None);
        }
        if changes.has("dns_nameservers") {
            opts.dns_nameservers = Some(config.dns_nameservers.clone());
        }
        if changes.has("host_routes") {
            opts.host_routes = Some(config.host_routes.clone());
        }
        if changes.has("enable_dhcp") {
            opts.enable_dhcp = Some(config.enable_dhcp);
        }
        if changes.has("allocation_pools") {
            opts.allocation_pools = Some(config.allocation_pools.clone());
        }

        let _: networking::Subnet = ctx.api(&data.region).update(&SUBNETS, id, &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE"]);
        delete_and_wait(api, &SUBNETS, id, conf, || api.delete(&SUBNETS, id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::*;
    use serde_json::json;

    fn subnet_attrs() -> HashMap<String, Value> {
        attrs(vec![
            ("network_id", Value::from("net-1")),
            ("cidr", Value::from("192.168.199.0/24")),
            ("name", Value::from("subnet_1")),
        ])
    }

    #[test]
    fn rejects_gateway_with_no_gateway() {
        let mut map = subnet_attrs();
        map.insert("gateway_ip".to_string(), Value::from("192.168.199.1"));
        map.insert("no_gateway".to_string(), Value::Bool(true));

        let err = Subnet
            .validate(&Config::default(), Attrs::new(&map))
            .unwrap_err();
        match err {
            ProviderError::Validation { fields, .. } => {
                assert_eq!(fields, vec!["gateway_ip", "no_gateway"])
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn schema_rejects_dhcp_disabled() {
        let mut map = subnet_attrs();
        map.insert("enable_dhcp".to_string(), Value::Bool(false));
        assert!(Subnet.schema().check(&map).is_err());
    }

    #[test]
    fn rejects_mismatched_ip_version() {
        let mut map = subnet_attrs();
        map.insert("ip_version".to_string(), Value::Int(6));
        assert!(Subnet.validate(&Config::default(), Attrs::new(&map)).is_err());

        map.insert("ip_version".to_string(), Value::Int(5));
        assert!(Subnet.validate(&Config::default(), Attrs::new(&map)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn create_without_gateway_sends_null() {
        let fake = Arc::new(FakeCloud::new());
        let ctx = context(&fake);
        let mut map = subnet_attrs();
        map.insert("no_gateway".to_string(), Value::Bool(true));
        let data = data(&map);

        let created = Subnet.create(&ctx, &data).await.unwrap();
        Subnet
            .wait_created(&ctx, &data, &created.identifier)
            .await
            .unwrap();

        let object = fake.object(&SUBNETS, &created.identifier).unwrap();
        assert_eq!(object["gateway_ip"], Json::Null);
        assert_eq!(object["enable_dhcp"], true);

        let read = Subnet.read(&ctx, &data, &created.identifier).await.unwrap();
        assert_eq!(read["gateway_ip"], Value::from(""));
        assert_eq!(read["ip_version"], Value::Int(4));
    }

    #[tokio::test(start_paused = true)]
    async fn read_maps_pools_and_routes() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(
            &SUBNETS,
            json!({
                "network_id": "net-1",
                "cidr": "10.0.0.0/24",
                "ip_version": 4,
                "gateway_ip": "10.0.0.1",
                "enable_dhcp": true,
                "allocation_pools": [{"start": "10.0.0.2", "end": "10.0.0.100"}],
                "host_routes": [{"destination": "10.1.0.0/24", "nexthop": "10.0.0.5"}],
                "dns_nameservers": ["8.8.8.8"]
            }),
        );
        let ctx = context(&fake);
        let map = HashMap::new();

        let read = Subnet.read(&ctx, &data(&map), &id).await.unwrap();
        let Value::List(routes) = &read["host_routes"] else {
            panic!("Expected list");
        };
        assert_eq!(
            routes[0],
            block([
                ("destination_cidr", Value::from("10.1.0.0/24")),
                ("next_hop", Value::from("10.0.0.5")),
            ])
        );
        assert_eq!(read["dns_nameservers"], Value::from(vec!["8.8.8.8".to_string()]));
        assert_eq!(read["name"], Value::from(""));
    }

    #[tokio::test(start_paused = true)]
    async fn update_clears_gateway() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(
            &SUBNETS,
            json!({"network_id": "net-1", "cidr": "192.168.199.0/24", "gateway_ip": "192.168.199.1"}),
        );
        let ctx = context(&fake);
        let mut map = subnet_attrs();
        map.insert("no_gateway".to_string(), Value::Bool(true));
        let changes: Changes = ["no_gateway"].into_iter().collect();

        Subnet.update(&ctx, &data(&map), &id, &changes).await.unwrap();

        let object = fake.object(&SUBNETS, &id).unwrap();
        assert_eq!(object["gateway_ip"], Json::Null);
        assert!(object.get("name").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_rides_out_conflict() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(&SUBNETS, json!({"network_id": "net-1"}));
        fake.fail("DELETE", &SUBNETS, 409);
        fake.fail("DELETE", &SUBNETS, 409);
        let ctx = context(&fake);
        let map = HashMap::new();

        Subnet.delete(&ctx, &data(&map), &id).await.unwrap();
        assert_eq!(fake.calls_matching("DELETE v2.0/subnets/"), 3);
        assert_eq!(fake.count(&SUBNETS), 0);
    }
}
