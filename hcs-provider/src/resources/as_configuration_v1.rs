//! as_configuration_v1 - Auto scaling configurations
//!
//! A configuration is an instance template; it cannot be changed after creation.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use regex::Regex;

use super::{Attributes, Context, Created, ResourceData, ResourceOps, base_schema, block};
use crate::config::Config;
use crate::sdk::autoscaling::{
    CONFIGURATIONS, ConfigurationCreateOpts, Disk, InstanceConfig, ScalingConfiguration,
};

const NAME: &str = "as_configuration_v1";

/// Letters, digits, CJK ideographs, `_` and `-`; at most 64 characters
const NAME_PATTERN: &str = r"^[\x{4e00}-\x{9fa5}0-9a-zA-Z_-]{1,64}$";

const VOLUME_TYPES: [&str; 3] = ["SATA", "SAS", "SSD"];
const DISK_TYPES: [&str; 2] = ["SYS", "DATA"];

static NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(NAME_PATTERN).ok());

pub struct Configuration;

fn validate_name(value: &Value) -> Result<(), String> {
    let Value::String(name) = value else {
        return Err("Expected string".to_string());
    };
    let re = NAME_RE
        .as_ref()
        .ok_or_else(|| "invalid name pattern".to_string())?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(format!(
            "'{name}' must be 1-64 characters of letters, digits, Chinese characters, '_' or '-'"
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ConfigurationConfig {
    name: String,
    instance: InstanceConfig,
}

impl ConfigurationConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        let name = attrs.required_string("scaling_configuration_name")?;
        validate_name(&Value::from(name.as_str()))
            .map_err(|e| ProviderError::validation(&["scaling_configuration_name"], e))?;

        let block = attrs.block("instance_config")?.ok_or_else(|| {
            ProviderError::validation(&["instance_config"], "instance_config is required")
        })?;
        let disk = block
            .blocks("disk")?
            .into_iter()
            .map(|disk| {
                Ok(Disk {
                    size: disk.int("size")?.unwrap_or(0),
                    volume_type: disk.required_string("volume_type")?,
                    disk_type: disk.required_string("disk_type")?,
                })
            })
            .collect::<ProviderResult<Vec<_>>>()?;
        let instance = InstanceConfig {
            instance_id: block.string_or_default("instance_id")?,
            flavor: block.string_or_default("flavor")?,
            image: block.string_or_default("image")?,
            disk,
            key_name: block.required_string("key_name")?,
            user_data: block.string_or_default("user_data")?,
            metadata: block.string_map("metadata")?,
        };

        if instance.instance_id.is_empty() && instance.image.is_empty() {
            return Err(ProviderError::validation(
                &["instance_config"],
                "instance_config: either instance_id or image must be set",
            ));
        }
        if let Some(disk) = instance.disk.iter().find(|d| d.size <= 0) {
            return Err(ProviderError::validation(
                &["instance_config"],
                format!("instance_config: {} disk size must be positive", disk.disk_type),
            ));
        }
        Ok(Self { name, instance })
    }
}

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

impl ResourceType for Configuration {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        let disk = AttributeType::Block(vec![
            AttributeSchema::new("size", types::positive_int()).required(),
            AttributeSchema::new("volume_type", enum_of(&VOLUME_TYPES)).required(),
            AttributeSchema::new("disk_type", enum_of(&DISK_TYPES)).required(),
        ]);
        let instance_config = AttributeType::Block(vec![
            AttributeSchema::new("instance_id", AttributeType::String),
            AttributeSchema::new("flavor", AttributeType::String),
            AttributeSchema::new("image", AttributeType::String),
            AttributeSchema::new("disk", AttributeType::List(Box::new(disk))),
            AttributeSchema::new("key_name", AttributeType::String).required(),
            AttributeSchema::new("user_data", AttributeType::String),
            AttributeSchema::new("metadata", types::string_map()),
        ]);
        base_schema(NAME)
            .with_description("An auto scaling instance configuration")
            .attribute(
                AttributeSchema::new(
                    "scaling_configuration_name",
                    AttributeType::Custom {
                        name: "ConfigurationName".to_string(),
                        base: Box::new(AttributeType::String),
                        validate: validate_name,
                    },
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new("instance_config", instance_config)
                    .required()
                    .force_new(),
            )
    }
}

/// Block as read back; user_data is never returned by the API and is kept from configuration
fn instance_block(instance: InstanceConfig, user_data: Option<String>) -> Value {
    let mut fields: HashMap<String, Value> = HashMap::new();
    for (key, value) in [
        ("instance_id", instance.instance_id),
        ("flavor", instance.flavor),
        ("image", instance.image),
        ("key_name", instance.key_name),
    ] {
        if !value.is_empty() {
            fields.insert(key.to_string(), value.into());
        }
    }
    if !instance.disk.is_empty() {
        let disks = instance
            .disk
            .into_iter()
            .map(|d| {
                block([
                    ("size", d.size.into()),
                    ("volume_type", d.volume_type.into()),
                    ("disk_type", d.disk_type.into()),
                ])
            })
            .collect();
        fields.insert("disk".to_string(), Value::List(disks));
    }
    if !instance.metadata.is_empty() {
        fields.insert("metadata".to_string(), instance.metadata.into());
    }
    if let Some(user_data) = user_data.filter(|u| !u.is_empty()) {
        fields.insert("user_data".to_string(), user_data.into());
    }
    Value::Map(fields)
}

#[async_trait]
impl ResourceOps for Configuration {
    fn validate(&self, _config: &Config, attrs: Attrs<'_>) -> ProviderResult<()> {
        ConfigurationConfig::from_attrs(attrs).map(|_| ())
    }

    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = ConfigurationConfig::from_attrs(data.attrs)?;
        let opts = ConfigurationCreateOpts {
            scaling_configuration_name: config.name,
            instance_config: config.instance,
        };
        let created: ScalingConfiguration = ctx
            .api(&data.region)
            .create(&CONFIGURATIONS, &opts)
            .await?;
        Ok(Created::new(created.scaling_configuration_id))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let configuration: ScalingConfiguration =
            ctx.api(&data.region).get(&CONFIGURATIONS, id).await?;
        let user_data = match data.attrs.block("instance_config")? {
            Some(block) => block.non_empty_string("user_data")?,
            None => None,
        };
        Ok(Attributes::new()
            .set(
                "scaling_configuration_name",
                configuration.scaling_configuration_name,
            )
            .set(
                "instance_config",
                instance_block(configuration.instance_config, user_data),
            )
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
        ctx.api(&data.region).delete(&CONFIGURATIONS, id).await
    }
}
