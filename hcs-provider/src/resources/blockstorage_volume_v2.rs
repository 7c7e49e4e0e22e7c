//! blockstorage_volume_v2 - Cinder volumes

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use hcs_core::waiter::StateChangeConf;
use log::info;

use super::{
    Attributes, Context, Created, ResourceData, ResourceOps, base_schema, block, delete_and_wait,
};
use crate::config::Config;
use crate::sdk::blockstorage::{self, VOLUMES, VolumeCreateOpts, VolumeUpdateOpts};

const NAME: &str = "blockstorage_volume_v2";

const DELAY: Duration = Duration::from_secs(10);
const MIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Mutually exclusive volume sources
const SOURCES: [&str; 4] = ["snapshot_id", "source_vol_id", "image_id", "source_replica"];

pub struct Volume;

#[derive(Debug, Clone, PartialEq)]
struct VolumeConfig {
    size: i64,
    name: String,
    description: String,
    availability_zone: String,
    metadata: BTreeMap<String, String>,
    snapshot_id: String,
    source_vol_id: String,
    image_id: String,
    source_replica: String,
    volume_type: String,
    consistency_group_id: String,
    cascade: bool,
}

impl VolumeConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let size = attrs.int("size")?.unwrap_or(0);
        if size <= 0 {
            return Err(ProviderError::validation(
                &["size"],
                format!("size must be a positive number of GB, got {size}"),
            ));
        }

        let sources: Vec<&str> = SOURCES
            .iter()
            .copied()
            .filter(|key| attrs.get(key).is_some_and(|v| !v.is_zero()))
            .collect();
        if sources.len() > 1 {
            return Err(ProviderError::validation(
                &sources,
                format!("Only one of {} can be set", sources.join(", ")),
            ));
        }

        Ok(Self {
            size,
            name: attrs.string_or_default("name")?,
            description: attrs.string_or_default("description")?,
            availability_zone: attrs.string_or_default("availability_zone")?,
            metadata: attrs.string_map("metadata")?,
            snapshot_id: attrs.string_or_default("snapshot_id")?,
            source_vol_id: attrs.string_or_default("source_vol_id")?,
            image_id: attrs.string_or_default("image_id")?,
            source_replica: attrs.string_or_default("source_replica")?,
            volume_type: attrs.string_or_default("volume_type")?,
            consistency_group_id: attrs.string_or_default("consistency_group_id")?,
            cascade: attrs.bool_or("cascade", false)?,
        })
    }
}

fn source_attribute(name: &str) -> AttributeSchema {
    SOURCES
        .iter()
        .filter(|other| **other != name)
        .fold(
            AttributeSchema::new(name, AttributeType::String).force_new(),
            |schema, other| schema.conflicts_with(*other),
        )
}

impl ResourceType for Volume {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        let attachment = AttributeType::Block(vec![
            AttributeSchema::new("id", AttributeType::String),
            AttributeSchema::new("instance_id", AttributeType::String),
            AttributeSchema::new("device", AttributeType::String),
        ]);
        SOURCES.iter().fold(
            base_schema(NAME)
                .with_description("A block storage volume")
                .attribute(
                    AttributeSchema::new("size", types::positive_int())
                        .required()
                        .force_new(),
                )
                .attribute(
                    AttributeSchema::new("availability_zone", AttributeType::String)
                        .computed()
                        .force_new(),
                )
                .attribute(AttributeSchema::new("metadata", types::string_map()).computed())
                .attribute(AttributeSchema::new("name", AttributeType::String))
                .attribute(AttributeSchema::new("description", AttributeType::String))
                .attribute(
                    AttributeSchema::new("volume_type", AttributeType::String)
                        .computed()
                        .force_new(),
                )
                .attribute(
                    AttributeSchema::new("consistency_group_id", AttributeType::String).force_new(),
                )
                .attribute(
                    AttributeSchema::new("attachment", AttributeType::List(Box::new(attachment)))
                        .computed(),
                )
                .attribute(
                    AttributeSchema::new("cascade", AttributeType::Bool)
                        .with_description("Delete the volume's snapshots along with it"),
                ),
            |schema, source| schema.attribute(source_attribute(source)),
        )
    }
}

#[async_trait]
impl ResourceOps for Volume {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        VolumeConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = VolumeConfig::from_attrs(data.attrs)?;
        let opts = VolumeCreateOpts {
            size: config.size,
            name: config.name,
            description: config.description,
            availability_zone: config.availability_zone,
            metadata: config.metadata,
            snapshot_id: config.snapshot_id,
            source_volid: config.source_vol_id,
            image_id: config.image_id,
            source_replica: config.source_replica,
            volume_type: config.volume_type,
            consistencygroup_id: config.consistency_group_id,
        };
        let volume: blockstorage::Volume = ctx.api(&data.region).create(&VOLUMES, &opts).await?;
        Ok(Created::new(volume.id))
    }

    async fn wait_created(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        StateChangeConf::new(&["downloading", "creating"], &["available"])
            .timeout(data.timeouts.create)
            .delay(DELAY)
            .min_timeout(MIN_TIMEOUT)
            .describe(format!("volume {id}"))
            .wait_for_state(|| async move {
                let volume: blockstorage::Volume = api.get(&VOLUMES, id).await?;
                let status = volume.status.clone();
                Ok((volume, status))
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
        let volume: blockstorage::Volume = ctx.api(&data.region).get(&VOLUMES, id).await?;
        let attachments = volume
            .attachments
            .into_iter()
            .map(|a| {
                block([
                    ("id", a.id.into()),
                    ("instance_id", a.server_id.into()),
                    ("device", a.device.into()),
                ])
            })
            .collect();
        Ok(Attributes::new()
            .set("size", volume.size)
            .set("name", volume.name)
            .set("description", volume.description)
            .set("availability_zone", volume.availability_zone)
            .set("snapshot_id", volume.snapshot_id)
            .set("source_vol_id", volume.source_volid)
            .set("volume_type", volume.volume_type)
            .set("consistency_group_id", volume.consistencygroup_id)
            .set("metadata", volume.metadata)
            .set("attachment", Value::List(attachments))
            .build())
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
        changes: &Changes,
    ) -> ProviderResult<()> {
        let config = VolumeConfig::from_attrs(data.attrs)?;
        let opts = VolumeUpdateOpts {
            name: changes.has("name").then(|| config.name.clone()),
            description: changes.has("description").then(|| config.description.clone()),
            metadata: changes.has("metadata").then(|| config.metadata.clone()),
        };
        let _: blockstorage::Volume = ctx.api(&data.region).update(&VOLUMES, id, &opts).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, data: &ResourceData<'_>, id: &str) -> ProviderResult<()> {
        let api = ctx.api(&data.region);
        let volume: blockstorage::Volume = api.get(&VOLUMES, id).await?;
        if !volume.attachments.is_empty() {
            let servers: Vec<&str> = volume
                .attachments
                .iter()
                .map(|a| a.server_id.as_str())
                .collect();
            return Err(ProviderError::new(format!(
                "Volume {} is still attached to {}; detach it before deleting",
                id,
                servers.join(", ")
            )));
        }

        let params = if data.attrs.bool_or("cascade", false)? {
            vec![("cascade", "true".to_string())]
        } else {
            Vec::new()
        };
        info!("Deleting volume {} (cascade: {})", id, !params.is_empty());

        let params = params.as_slice();
        let conf = StateChangeConf::new(&["deleting", "downloading", "available"], &["deleted"])
            .timeout(data.timeouts.delete)
            .delay(DELAY)
            .min_timeout(MIN_TIMEOUT)
            .transient_codes(ctx.config.transient_codes(NAME));
        delete_and_wait(api, &VOLUMES, id, conf, || async move {
            api.delete_with(&VOLUMES, id, params).await
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

    fn volume_attrs() -> HashMap<String, Value> {
        attrs(vec![
            ("name", Value::from("volume_1")),
            ("description", Value::from("first test volume")),
            ("size", Value::Int(1)),
        ])
    }

    #[test]
    fn only_one_source_allowed() {
        let mut map = volume_attrs();
        map.insert("snapshot_id".to_string(), Value::from("snap-1"));
        map.insert("image_id".to_string(), Value::from("img-1"));

        let err = Volume
            .validate(&Config::default(), Attrs::new(&map))
            .unwrap_err();
        match err {
            ProviderError::Validation { fields, .. } => {
                assert_eq!(fields, vec!["snapshot_id", "image_id"])
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
        assert!(Volume.schema().check(&map).is_err());
    }

    #[test]
    fn size_must_be_positive() {
        let mut map = volume_attrs();
        map.insert("size".to_string(), Value::Int(0));
        assert!(Volume.validate(&Config::default(), Attrs::new(&map)).is_err());
        assert!(Volume.schema().check(&map).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_for_available() {
        let fake = Arc::new(FakeCloud::new().with_status(&VOLUMES, "creating"));
        fake.script(&VOLUMES, &["creating", "downloading", "available"]);
        let ctx = context(&fake);
        let mut map = volume_attrs();
        map.insert("metadata".to_string(), block([("foo", Value::from("bar"))]));
        let data = data(&map);

        let created = Volume.create(&ctx, &data).await.unwrap();
        Volume
            .wait_created(&ctx, &data, &created.identifier)
            .await
            .unwrap();

        let read = Volume.read(&ctx, &data, &created.identifier).await.unwrap();
        assert_eq!(read["size"], Value::Int(1));
        assert_eq!(read["metadata"], block([("foo", Value::from("bar"))]));
        assert_eq!(read["attachment"], Value::List(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn create_wait_fails_on_error_status() {
        let fake = Arc::new(FakeCloud::new().with_status(&VOLUMES, "error"));
        let ctx = context(&fake);
        let map = volume_attrs();
        let data = data(&map);

        let created = Volume.create(&ctx, &data).await.unwrap();
        let err = Volume
            .wait_created(&ctx, &data, &created.identifier)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected state 'error', wanted target 'available'"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_attached_volume_fails() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(
            &VOLUMES,
            json!({"size": 1, "status": "in-use", "attachments": [{"id": "a-1", "server_id": "vm-1"}]}),
        );
        let ctx = context(&fake);
        let map = HashMap::new();

        let err = Volume.delete(&ctx, &data(&map), &id).await.unwrap_err();
        assert!(err.to_string().contains("vm-1"));
        assert_eq!(fake.count(&VOLUMES), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_delete_passes_parameter() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(&VOLUMES, json!({"size": 1, "status": "available"}));
        let ctx = context(&fake);
        let map = attrs(vec![("cascade", Value::Bool(true))]);

        Volume.delete(&ctx, &data(&map), &id).await.unwrap();
        assert_eq!(fake.calls_matching(&format!("DELETE volumes/{id}?cascade=true")), 1);
        assert_eq!(fake.count(&VOLUMES), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn update_metadata() {
        let fake = Arc::new(FakeCloud::new());
        let id = fake.insert(
            &VOLUMES,
            json!({"size": 1, "name": "volume_1", "metadata": {"foo": "bar"}}),
        );
        let ctx = context(&fake);
        let mut map = volume_attrs();
        map.insert("metadata".to_string(), block([("foo", Value::from("baz"))]));
        let changes: Changes = ["metadata"].into_iter().collect();

        Volume.update(&ctx, &data(&map), &id, &changes).await.unwrap();
        let object = fake.object(&VOLUMES, &id).unwrap();
        assert_eq!(object["metadata"], json!({"foo": "baz"}));
        assert_eq!(object["name"], "volume_1");
    }
}
