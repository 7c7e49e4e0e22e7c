//! compute_servergroup_v2 - Nova server groups

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{Attributes, Context, Created, ResourceData, ResourceOps, base_schema, value_specs};
use crate::sdk::compute::{SERVER_GROUPS, ServerGroupCreateOpts};
use crate::sdk::{ValueSpecs, compute};

const NAME: &str = "compute_servergroup_v2";

const POLICIES: [&str; 4] = ["affinity", "anti-affinity", "soft-affinity", "soft-anti-affinity"];

pub struct ServerGroup;

#[derive(Debug, Clone, PartialEq)]
struct ServerGroupConfig {
    name: String,
    policies: Vec<String>,
    value_specs: ValueSpecs,
}

impl ServerGroupConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        Ok(Self {
            name: attrs.required_string("name")?,
            policies: attrs.strings("policies")?,
            value_specs: value_specs(attrs)?,
        })
    }
}

impl ResourceType for ServerGroup {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        let policy = AttributeType::Enum(POLICIES.iter().map(|p| p.to_string()).collect());
        base_schema(NAME)
            .with_description("A server group with scheduling policies")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("policies", AttributeType::List(Box::new(policy)))
                    .computed()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("members", types::strings()).computed())
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for ServerGroup {
    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = ServerGroupConfig::from_attrs(data.attrs)?;
        let opts = ServerGroupCreateOpts {
            name: config.name,
            policies: config.policies,
            value_specs: config.value_specs,
        };
        let group: compute::ServerGroup = ctx
            .api(&data.region)
            .create(&SERVER_GROUPS, &opts)
            .await?;
        Ok(Created::new(group.id))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let group: compute::ServerGroup = ctx.api(&data.region).get(&SERVER_GROUPS, id).await?;
        Ok(Attributes::new()
            .set("name", group.name)
            .set("policies", group.policies)
            .set("members", group.members)
            .build())
    }

    async fn update(
        &self,
        _ctx: &Context,
        _data: &ResourceData<'_>,
        _id: &str,
        _changes: &Changes,
    ) -> ProviderResult<()> {
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        ctx.api(&data.region).delete(&SERVER_GROUPS, id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::fake::FakeCloud;
    use crate::resources::test_support::*;

    #[test]
    fn rejects_unknown_policy() {
        let map = attrs(vec![
            ("name", Value::from("sg_1")),
            ("policies", Value::from(vec!["together".to_string()])),
        ]);
        assert!(ServerGroup.schema().check(&map).is_err());
    }

    #[tokio::test]
    async fn create_read_delete() {
        let fake = Arc::new(FakeCloud::new().with_defaults(
            &SERVER_GROUPS,
            serde_json::json!({"members": []}),
        ));
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("sg_1")),
            ("policies", Value::from(vec!["anti-affinity".to_string()])),
        ]);
        let data = data(&map);

        let created = ServerGroup.create(&ctx, &data).await.unwrap();
        let read = ServerGroup
            .read(&ctx, &data, &created.identifier)
            .await
            .unwrap();
        assert_eq!(read["policies"], Value::from(vec!["anti-affinity".to_string()]));
        assert_eq!(read["members"], Value::List(vec![]));

        ServerGroup
            .delete(&ctx, &data, &created.identifier)
            .await
            .unwrap();
        assert_eq!(fake.count(&SERVER_GROUPS), 0);
    }
}
