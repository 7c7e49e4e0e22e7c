//! networking_router_interface_v2 - Attachment of a subnet or port to a router
//!
//! The identifier is the id of the interface port.

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use hcs_core::waiter::StateChangeConf;
use log::info;

use super::{
    Attributes, Context, Created, NEUTRON_DELAY, NEUTRON_MIN_TIMEOUT, ResourceData, ResourceOps,
    base_schema, delete_and_wait, neutron_delete_conf,
};
use crate::config::Config;
use crate::sdk::networking::{InterfaceInfo, InterfaceOpts, PORTS, Port, ROUTERS};

const NAME: &str = "networking_router_interface_v2";

pub struct RouterInterface;

#[derive(Debug, Clone, PartialEq)]
struct InterfaceConfig {
    router_id: String,
    subnet_id: String,
    port_id: String,
}

impl InterfaceConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let config = Self {
            router_id: attrs.required_string("router_id")?,
            subnet_id: attrs.string_or_default("subnet_id")?,
            port_id: attrs.string_or_default("port_id")?,
        };
        if config.subnet_id.is_empty() == config.port_id.is_empty() {
            return Err(ProviderError::validation(
                &["port_id", "subnet_id"],
                "Exactly one of subnet_id or port_id must be set",
            ));
        }
        Ok(config)
    }
}

impl ResourceType for RouterInterface {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A router interface on a subnet or an existing port")
            .attribute(
                AttributeSchema::new("router_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("subnet_id", AttributeType::String)
                    .computed()
                    .force_new()
                    .conflicts_with("port_id"),
            )
            .attribute(
                AttributeSchema::new("port_id", AttributeType::String)
                    .computed()
                    .force_new()
                    .conflicts_with("subnet_id"),
            )
    }
}

#[async_trait]
impl ResourceOps for RouterInterface {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        InterfaceConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = InterfaceConfig::from_attrs(data.attrs)?;
        let _lock = ctx.locks.lock(&config.router_id).await;

        let opts = InterfaceOpts {
            subnet_id: config.subnet_id,
            port_id: config.port_id,
        };
        let interface: InterfaceInfo = ctx
            .api(&data.region)
            .action(&ROUTERS, &config.router_id, "add_router_interface", &opts)
            .await?;
        info!(
            "Added interface port {} to router {}",
            interface.port_id, config.router_id
        );
        Ok(Created::new(interface.port_id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        StateChangeConf::new(&["BUILD", "PENDING_CREATE", "PENDING_UPDATE"], &["ACTIVE", "DOWN"])
            .timeout(data.timeouts.create)
            .delay(NEUTRON_DELAY)
            .min_timeout(NEUTRON_MIN_TIMEOUT)
            .describe(format!("router interface {id}"))
            .wait_for_state(|| async move {
                let port: Port = api.get(&PORTS, id).await?;
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
        let port: Port = ctx.api(&data.region).get(&PORTS, id).await?;
        let subnet_id = port
            .fixed_ips
            .first()
            .map(|ip| ip.subnet_id.clone())
            .unwrap_or_default();
        Ok(Attributes::new()
            .set("router_id", port.device_id)
            .set("port_id", port.id)
            .set("subnet_id", subnet_id)
            .build())
    }

    async fn update(
        &self,
        _ctx: &Context,
        _data: &ResourceData<'_>,
        _id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        // Every attribute forces a new interface
        Err(ProviderError::RequiresReplacement {
            fields: changes.iter().map(str::to_string).collect(),
        })
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let router_id = data.attrs.required_string("router_id")?;
        let _lock = ctx.locks.lock(&router_id).await;

        let api = ctx.api(&data.region);
        let opts = InterfaceOpts {
            port_id: id.to_string(),
            ..Default::default()
        };
        let (router_id, opts) = (router_id.as_str(), &opts);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE", "DOWN"]);
        delete_and_wait(api, &PORTS, id, conf, || async move {
            let _: InterfaceInfo = api
                .action(&ROUTERS, router_id, "remove_router_interface", opts)
                .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::*;
    use crate::sdk::networking::SUBNETS;
    use serde_json::json;

    fn router_and_subnet(fake: &FakeCloud) -> (String, String) {
        let router = fake.insert(&ROUTERS, json!({"name": "router_1", "status": "ACTIVE"}));
        let subnet = fake.insert(
            &SUBNETS,
            json!({"network_id": "net-1", "cidr": "192.168.199.0/24", "gateway_ip": "192.168.199.1"}),
        );
        (router, subnet)
    }

    #[test]
    fn requires_exactly_one_target() {
        let neither = attrs(vec![("router_id", Value::from("r-1"))]);
        assert!(RouterInterface
            .validate(&Config::default(), Attrs::new(&neither))
            .is_err());

        let both = attrs(vec![
            ("router_id", Value::from("r-1")),
            ("subnet_id", Value::from("s-1")),
            ("port_id", Value::from("p-1")),
        ]);
        assert!(RouterInterface
            .validate(&Config::default(), Attrs::new(&both))
            .is_err());
        assert!(RouterInterface.schema().check(&both).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn create_on_subnet_reads_back_port() {
        let fake = Arc::new(FakeCloud::new().with_status(&PORTS, "BUILD"));
        let (router, subnet) = router_and_subnet(&fake);
        fake.script(&PORTS, &["BUILD", "ACTIVE"]);
        let ctx = context(&fake);
        let map = attrs(vec![
            ("router_id", Value::from(router.as_str())),
            ("subnet_id", Value::from(subnet.as_str())),
        ]);
        let data = data(&map);

        let created = RouterInterface.create(&ctx, &data).await.unwrap();
        RouterInterface
            .wait_created(&ctx, &data, &created.identifier)
            .await
            .unwrap();

        let read = RouterInterface
            .read(&ctx, &data, &created.identifier)
            .await
            .unwrap();
        assert_eq!(read["router_id"], Value::from(router.as_str()));
        assert_eq!(read["subnet_id"], Value::from(subnet.as_str()));
        assert_eq!(read["port_id"], Value::from(created.identifier.as_str()));
        assert_eq!(ctx.locks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_interface_port() {
        let fake = Arc::new(FakeCloud::new());
        let (router, subnet) = router_and_subnet(&fake);
        let ctx = context(&fake);
        let map = attrs(vec![
            ("router_id", Value::from(router.as_str())),
            ("subnet_id", Value::from(subnet.as_str())),
        ]);
        let data = data(&map);
        let created = RouterInterface.create(&ctx, &data).await.unwrap();
        assert_eq!(fake.count(&PORTS), 1);

        fake.fail("remove_router_interface", &ROUTERS, 409);
        RouterInterface
            .delete(&ctx, &data, &created.identifier)
            .await
            .unwrap();
        assert_eq!(fake.count(&PORTS), 0);
        assert_eq!(fake.calls_matching("PUT v2.0/routers/"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn update_is_rejected() {
        let fake = Arc::new(FakeCloud::new());
        let ctx = context(&fake);
        let map = HashMap::new();
        let changes: Changes = ["subnet_id"].into_iter().collect();
        let err = RouterInterface
            .update(&ctx, &data(&map), "p-1", &changes)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequiresReplacement { .. }));
    }
}
