//! HuaweiCloudStack Provider
//!
//! Manages networks, subnets, routers, ports, floating IPs, security
//! groups, keypairs, server groups, volumes and auto scaling
//! configurations on a HuaweiCloudStack (OpenStack compatible) cloud.

pub mod client;
pub mod config;
pub mod provider;
pub mod resources;
pub mod sdk;

use hcs_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use hcs_core::resource::{Resource, ResourceId, State};

pub use config::Config;
pub use provider::{HcsProvider, validate_resource};

impl Provider for HcsProvider {
    fn name(&self) -> &'static str {
        "huaweicloudstack"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(&self, current: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let current = current.clone();
        Box::pin(async move { self.read_resource(&current).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(&self, from: &State, to: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&from, &to).await })
    }

    fn delete(&self, current: &State) -> BoxFuture<'_, ProviderResult<()>> {
        let current = current.clone();
        Box::pin(async move { self.delete_resource(&current).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }
}
