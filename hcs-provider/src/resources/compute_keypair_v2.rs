//! compute_keypair_v2 - Nova SSH keypairs
//!
//! Keypairs are identified by name. When no public key is given nova
//! generates one and returns the private half in the create response only.

use std::collections::HashMap;

use async_trait::async_trait;
use hcs_core::attrs::Attrs;
use hcs_core::differ::Changes;
use hcs_core::provider::{ProviderError, ProviderResult, ResourceType};
use hcs_core::resource::Value;
use hcs_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{Attributes, Context, Created, ResourceData, ResourceOps, base_schema, value_specs};
use crate::sdk::compute::{KEYPAIRS, KeypairCreateOpts};
use crate::sdk::{ValueSpecs, compute};

const NAME: &str = "compute_keypair_v2";

pub struct Keypair;

#[derive(Debug, Clone, PartialEq)]
struct KeypairConfig {
    name: String,
    public_key: String,
    value_specs: ValueSpecs,
}

impl KeypairConfig {
    fn from_attrs(attrs: Attrs<'_>) -> ProviderResult<Self> {
        Ok(Self {
            name: attrs.required_string("name")?,
            public_key: attrs.string_or_default("public_key")?,
            value_specs: value_specs(attrs)?,
        })
    }
}

impl ResourceType for Keypair {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> ResourceSchema {
        base_schema(NAME)
            .with_description("An SSH keypair")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("public_key", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("private_key", AttributeType::String)
                    .computed()
                    .sensitive(),
            )
            .attribute(AttributeSchema::new("value_specs", types::string_map()).force_new())
    }
}

#[async_trait]
impl ResourceOps for Keypair {
    async fn create(&self, ctx: &Context, data: &ResourceData<'_>) -> ProviderResult<Created> {
        let config = KeypairConfig::from_attrs(data.attrs)?;
        let opts = KeypairCreateOpts {
            name: config.name,
            public_key: config.public_key,
            value_specs: config.value_specs,
        };
        let keypair: compute::Keypair = ctx.api(&data.region).create(&KEYPAIRS, &opts).await?;

        let created = Created::new(keypair.name);
        if keypair.private_key.is_empty() {
            Ok(created)
        } else {
            Ok(created.with_attribute("private_key", keypair.private_key))
        }
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ResourceData<'_>,
        id: &str,
    ) -> ProviderResult<HashMap<String, Value>> {
        let keypair: compute::Keypair = ctx.api(&data.region).get(&KEYPAIRS, id).await?;
        Ok(Attributes::new()
            .set("name", keypair.name)
            .set("public_key", keypair.public_key)
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
        ctx.api(&data.region).delete(&KEYPAIRS, id).await
    }
}
