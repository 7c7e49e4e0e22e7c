//! Auto scaling v1 models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::nullable;
use crate::client::{Collection, Service};

/// Requests are not enveloped; create answers with the new id only
pub const CONFIGURATIONS: Collection = Collection {
    service: Service::AutoScaling,
    path: "autoscaling-api/v1/{project_id}/scaling_configuration",
    singular: "scaling_configuration",
    plural: "scaling_configurations",
    id_field: "scaling_configuration_id",
    wrap_requests: false,
    kind: "scaling configuration",
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Disk {
    pub size: i64,
    pub volume_type: String,
    pub disk_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub instance_id: String,
    #[serde(
        rename = "flavorRef",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "nullable"
    )]
    pub flavor: String,
    #[serde(
        rename = "imageRef",
        skip_serializing_if = "String::is_empty",
        deserialize_with = "nullable"
    )]
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable")]
    pub disk: Vec<Disk>,
    #[serde(deserialize_with = "nullable")]
    pub key_name: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub user_data: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "nullable")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScalingConfiguration {
    pub scaling_configuration_id: String,
    pub scaling_configuration_name: String,
    pub instance_config: InstanceConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigurationCreateOpts {
    pub scaling_configuration_name: String,
    pub instance_config: InstanceConfig,
}
