//! networking_secgroup_v2 - Neutron security groups
//!
//! Neutron seeds every new group with egress rules; `delete_default_rules`
//! removes them right after creation so only managed rules remain.

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::debug;

use super::{
    Attributes, Context, Created, ResourceData, ResourceOps, base_schema, delete_and_wait,
    neutron_delete_conf,
};
use crate::config::Config;
use crate::sdk::networking::{
    self, SECURITY_GROUP_RULES, SECURITY_GROUPS, SecurityGroupCreateOpts, SecurityGroupUpdateOpts,
};

const NAME: &str = "networking_secgroup_v2";

pub struct SecGroup;

#[derive(Debug, Clone, PartialEq)]
struct SecGroupConfig {
    name: String,
    description: String,
    tenant_id: String,
    delete_default_rules: bool,
}

impl SecGroupConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        Ok(Self {
            name: attrs.required_string("name")?,
            description: attrs.string_or_default("description")?,
            tenant_id: attrs.string_or_default("tenant_id")?,
            delete_default_rules: attrs.bool_or("delete_default_rules", false)?,
        })
    }
}

impl ResourceType for SecGroup {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("A neutron security group")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("description", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("tenant_id", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("delete_default_rules", AttributeType::Bool)
                    .force_new()
                    .with_description("Remove the rules neutron adds to a new group"),
            )
    }
}

#[async_trait]
impl ResourceOps for SecGroup {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        SecGroupConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = SecGroupConfig::from_attrs(data.attrs)?;
        let api = ctx.api(&data.region);
        let opts = SecurityGroupCreateOpts {
            name: config.name,
            description: config.description,
            tenant_id: config.tenant_id,
        };
        let group: networking::SecurityGroup = api.create(&SECURITY_GROUPS, &opts).await?;

        if config.delete_default_rules {
            for rule in &group.security_group_rules {
                debug!("Deleting default rule {} of security group {}", rule.id, group.id);
                api.delete(&SECURITY_GROUP_RULES, &rule.id)
                    .await
                    .map_err(|e| {
                        ProviderError::incomplete(
                            group.id.as_str(),
                            e.context("Error deleting default security group rule"),
                        )
                    })?;
            }
        }
        Ok(Created::new(group.id))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let group: networking::SecurityGroup =
            ctx.api(&data.region).get(&SECURITY_GROUPS, id).await?;
        Ok(Attributes::new()
            .set("name", group.name)
            .set("description", group.description)
            .set("tenant_id", group.tenant_id)
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = SecGroupConfig::from_attrs(data.attrs)?;
        let opts = SecurityGroupUpdateOpts {
            name: changes.has("name").then_some(config.name),
            description: changes.has("description").then_some(config.description),
        };
        let _: networking::SecurityGroup = ctx
            .api(&data.region)
            .update(&SECURITY_GROUPS, id, &opts)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let conf = neutron_delete_conf(ctx, data, NAME, &["ACTIVE"]);
        delete_and_wait(api, &SECURITY_GROUPS, id, conf, || {
            api.delete(&SECURITY_GROUPS, id)
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
    use serde_json::json;

    fn cloud() -> Arc<FakeCloud> {
        let fake = Arc::new(FakeCloud::new().with_defaults(
            &SECURITY_GROUPS,
            json!({"security_group_rules": [
                {"id": "default-v4", "direction": "egress", "ethertype": "IPv4"},
                {"id": "default-v6", "direction": "egress", "ethertype": "IPv6"}
            ]}),
        ));
        for id in ["default-v4", "default-v6"] {
            fake.insert(
                &SECURITY_GROUP_RULES,
                json!({"id": id, "direction": "egress", "security_group_id": "seeded"}),
            );
        }
        fake
    }

    #[test]
    fn name_is_required() {
        let map = attrs(vec![("description", Value::from("no name"))]);
        assert!(SecGroup.schema().check(&map).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn create_then_read() {
        let fake = cloud();
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("security_group")),
            ("description", Value::from("terraform security group acceptance test")),
        ]);
        let data = data(&map);

        let created = SecGroup.create(&ctx, &data).await.unwrap();
        let read = SecGroup.read(&ctx, &data, &created.identifier).await.unwrap();
        assert_eq!(read["name"], Value::from("security_group"));
        assert_eq!(
            read["description"],
            Value::from("terraform security group acceptance test")
        );
        // Default rules stay unless asked otherwise
        assert_eq!(fake.count(&SECURITY_GROUP_RULES), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn default_rules_removed_on_request() {
        let fake = cloud();
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("security_group")),
            ("delete_default_rules", Value::Bool(true)),
        ]);

        SecGroup.create(&ctx, &data(&map)).await.unwrap();
        assert_eq!(fake.count(&SECURITY_GROUP_RULES), 0);
        assert_eq!(fake.calls_matching("DELETE v2.0/security-group-rules/"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rule_cleanup_reports_group() {
        let fake = cloud();
        fake.fail("DELETE", &SECURITY_GROUP_RULES, 403);
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("security_group")),
            ("delete_default_rules", Value::Bool(true)),
        ]);

        let err = SecGroup.create(&ctx, &data(&map)).await.unwrap_err();
        assert!(matches!(err, ProviderError::CreateIncomplete { .. }));
        assert_eq!(fake.count(&SECURITY_GROUPS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_renames_in_place() {
        let fake = cloud();
        let id = fake.insert(
            &SECURITY_GROUPS,
            json!({"name": "security_group", "description": "first"}),
        );
        let ctx = context(&fake);
        let map = attrs(vec![
            ("name", Value::from("security_group_1")),
            ("description", Value::from("second")),
        ]);
        let changes: Changes = ["name"].into_iter().collect();

        SecGroup
            .update(&ctx, &data(&map), &id, &changes)
            .await
            .unwrap();
        let object = fake.object(&SECURITY_GROUPS, &id).unwrap();
        assert_eq!(object["name"], "security_group_1");
        assert_eq!(object["description"], "first");
    }

    #[tokio::test(start_paused = true)]
    async fn delete_rides_out_group_in_use() {
        let fake = cloud();
        let id = fake.insert(&SECURITY_GROUPS, json!({"name": "security_group"}));
        fake.fail("DELETE", &SECURITY_GROUPS, 409);
        let ctx = context(&fake);
        let map = HashMap::new();

        SecGroup.delete(&ctx, &data(&map), &id).await.unwrap();
        assert_eq!(fake.count(&SECURITY_GROUPS), 0);
    }
}
