//! networking_network_v2 - Neutron networks

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use hcs_core::waiter::StateChangeConf;

use super::{
    Attributes, Context, Created, NEUTRON_DELAY, NEUTRON_MIN_TIMEOUT, ResourceData, ResourceOps,
    base_schema, delete_and_wait, neutron_delete_conf, value_specs,
};
use crate::sdk::ValueSpecs;
use crate::sdk::networking::{self, NETWORKS, NetworkCreateOpts, NetworkUpdateOpts};

const NAME: &str = "networking_network_v2";

pub struct Network;

#[derive(Debug, Clone, PartialEq)]
struct NetworkConfig {
    name: String,
    admin_state_up: Option<bool>,
    shared: Option<bool>,
    tenant_id: String,
    value_specs: ValueSpecs,
}

impl NetworkConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        Ok(Self {
            name: attrs.string_or_default("name")?,
            admin_state_up: attrs.bool("admin_state_up")?,
            shared: attrs.bool("shared")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            value_specs: value_specs(attrs)?,
        })
    }
}

impl ResourceType for Network {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A neutron network")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("admin_state_up", AttributeType::Bool).computed())
            .attribute(AttributeSchema::new("shared", AttributeType::Bool).computed())
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for Network {
    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = NetworkConfig::from_attrs(data.attrs)?;
        let opts = NetworkCreateOpts {
            name: config.name,
            admin_state_up: config.admin_state_up,
            shared: config.shared,
            tenant_id: config.tenant_id,
            value_specs: config.value_specs,
        };
        let network: networking::Network = ctx.api(&data.region).create(&NETWORKS, &opts).await?;
        Ok(Created::new(network.id))
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
            .describe(format!("network {id}"))
            .wait_for_state(|| async move {
                let network: networking::Network = api.get(&NETWORKS, id).await?;
                let status = network.status.clone();
                Ok((network, status))
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
        let network: networking::Network = ctx.api(&data.region).get(&NETWORKS, id).await?;
        Ok(Attributes::new()
            .set("name", network.name)
            .set("admin_state_up", network.admin_state_up)
            .set("shared", network.shared)
            .set("tenant_id", network.tenant_id)
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = NetworkConfig::from_attrs(data.attrs)?;
        let opts = NetworkUpdateOpts {
            name: changes.has("name").then_some(config.name),
            admin_state_up: config.admin_state_up.filter(|_| changes.has("admin_state_up")),
            shared: config.shared.filter(|_| changes.has("shared")),
        };
        let _: networking::Network = ctx.api(&data.region).update(&NETWORKS, id, &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE"]);
        delete_and_wait(api, &NETWORKS, id, conf, || api.delete(&NETWORKS, id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_active() {
        let fake = Arc::new(FakeCloud::new().with_status(&NETWORKS, "BUILD"));
        fake.script(&NETWORKS, &["BUILD", "BUILD", "ACTIVE"]);
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("network_1")),
            ("admin_state_up", Value::from("true")),
        ]);
        let data = data(&map);

        let created = Network.create(&ctx, &data).await.unwrap();
        Network
            .wait_created(&ctx, &data, &created.identifier)
            .await
            .unwrap();
        assert_eq!(fake.calls_matching("GET v2.0/networks/"), 3);

        let read = Network.read(&ctx, &data, &created.identifier).await.unwrap();
        assert_eq!(read["name"], Value::from("network_1"));
        assert_eq!(read["admin_state_up"], Value::Bool(true));
    }

    #[tokio::test(start_paused = true)]
    async fn update_sends_changed_fields_only() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(
            &NETWORKS,
            json!({"name": "network_1", "admin_state_up": true, "shared": false, "status": "ACTIVE"}),
        );
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("network_2")),
            ("shared", Value::Bool(true)),
        ]);
        let changes: Changes = ["name"].into_iter().collect();

        Network
            .update(&ctx, &data(&map), &id, &changes)
            .await
            .unwrap();

        let object = fake.object(&NETWORKS, &id).unwrap();
        assert_eq!(object["name"], "network_2");
        assert_eq!(object["shared"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_gone() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(&NETWORKS, json!({"name": "network_1", "status": "ACTIVE"}));
        let ctx = context(&fake);
        let map = HashMap::new();

        Network.delete(&ctx, &data(&map), &id).await.unwrap();
        assert_eq!(fake.count(&NETWORKS), 0);
    }
}
