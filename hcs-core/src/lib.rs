//! HCS Core
//!
//! Resource model, attribute schemas and the polling/locking primitives
//! shared by the HuaweiCloudStack provider

pub mod attrs;
pub mod differ;
pub mod mutex_kv;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod timeouts;
pub mod waiter;
