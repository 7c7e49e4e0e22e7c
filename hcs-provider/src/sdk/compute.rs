//! Compute v2 (nova) models

use serde::{Deserialize, Serialize};

use super::{ValueSpecs, nullable};
use crate::client::{Collection, Service};

pub const KEYPAIRS: Collection = Collection {
    service: Service::Compute,
    path: "os-keypairs",
    singular: "keypair",
    plural: "keypairs",
    id_field: "name",
    wrap_requests: true,
    kind: "keypair",
};

pub const SERVER_GROUPS: Collection = Collection {
    service: Service::Compute,
    path: "os-server-groups",
    singular: "server_group",
    plural: "server_groups",
    id_field: "id",
    wrap_requests: true,
    kind: "server group",
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Keypair {
    pub name: String,
    pub public_key: String,
    pub fingerprint: String,
    /// Only present in the create response when nova generated the key
    #[serde(deserialize_with = "nullable")]
    pub private_key: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeypairCreateOpts {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerGroup {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub policies: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerGroupCreateOpts {
    pub name: String,
    pub policies: Vec<String>,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}
