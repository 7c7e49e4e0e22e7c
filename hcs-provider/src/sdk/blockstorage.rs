//! Block storage v2 (cinder) models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::nullable;
use crate::client::{Collection, Service};

pub const VOLUMES: Collection = Collection {
    service: Service::BlockStorage,
    path: "volumes",
    singular: "volume",
    plural: "volumes",
    id_field: "id",
    wrap_requests: true,
    kind: "volume",
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: String,
    pub server_id: String,
    #[serde(deserialize_with = "nullable")]
    pub device: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    pub size: i64,
    pub status: String,
    #[serde(deserialize_with = "nullable")]
    pub availability_zone: String,
    #[serde(deserialize_with = "nullable")]
    pub metadata: BTreeMap<String, String>,
    #[serde(deserialize_with = "nullable")]
    pub snapshot_id: String,
    #[serde(deserialize_with = "nullable")]
    pub source_volid: String,
    #[serde(deserialize_with = "nullable")]
    pub volume_type: String,
    #[serde(deserialize_with = "nullable")]
    pub consistencygroup_id: String,
    #[serde(deserialize_with = "nullable")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeCreateOpts {
    pub size: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub availability_zone: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snapshot_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_volid: String,
    #[serde(rename = "imageRef", skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_replica: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub volume_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub consistencygroup_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumeUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn image_source_uses_api_field_name() {
        let body = serde_json::to_value(VolumeCreateOpts {
            size: 1,
            image_id: "img-1".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"size": 1, "imageRef": "img-1"}));
    }

    #[test]
    fn volume_with_nulls_decodes() {
        let volume: Volume = serde_json::from_value(json!({
            "id": "v-1",
            "name": null,
            "size": 1,
            "status": "available",
            "metadata": {"foo": "bar"},
            "attachments": []
        }))
        .unwrap();
        assert_eq!(volume.name, "");
        assert_eq!(volume.metadata.get("foo").map(String::as_str), Some("bar"));
    }
}
