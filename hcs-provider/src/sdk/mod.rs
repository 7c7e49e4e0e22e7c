//! Typed request and response bodies for the cloud services
//!
//! Each submodule declares its collections and the serde models the
//! resource callbacks exchange through `client::Api`.

pub mod autoscaling;
pub mod blockstorage;
pub mod compute;
pub mod networking;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Extra request fields passed through verbatim
pub type ValueSpecs = BTreeMap<String, String>;

/// Deserialize `null` as the type's default
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
