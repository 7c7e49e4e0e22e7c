//! Provider configuration
//!
//! Credentials, region and endpoint settings come from the usual `OS_*`
//! environment variables or from a JSON file with the same fields.

use std::collections::BTreeMap;
use std::path::Path;

use hcs_core::provider::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for ProviderError {
    fn from(e: ConfigError) -> Self {
        ProviderError::Config(e.to_string())
    }
}

/// Connection settings shared by every resource callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth_url: String,
    pub region: String,
    pub username: String,
    pub user_id: String,
    pub password: String,
    pub token: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub domain_id: String,
    pub domain_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Catalog interface: public, internal or admin
    pub endpoint_type: String,
    /// Default floating IP pool
    pub pool_name: Option<String>,
    /// Endpoint overrides keyed by catalog service type (e.g. "network")
    pub endpoints: BTreeMap<String, String>,
    /// Backend status codes treated as "still pending" while deleting, per resource type
    pub transient_errors: BTreeMap<String, Vec<u16>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_url: String::new(),
            region: String::new(),
            username: String::new(),
            user_id: String::new(),
            password: String::new(),
            token: String::new(),
            tenant_id: String::new(),
            tenant_name: String::new(),
            domain_id: String::new(),
            domain_name: String::new(),
            user_domain_name: String::new(),
            project_domain_name: String::new(),
            insecure: false,
            endpoint_type: "public".to_string(),
            pool_name: None,
            endpoints: BTreeMap::new(),
            transient_errors: default_transient_errors(),
        }
    }
}

fn default_transient_errors() -> BTreeMap<String, Vec<u16>> {
    // The floating IP API answers 500 under flow control; neutron answers 409
    // while dependent ports are still being torn down or still use a group.
    [
        ("networking_floatingip_v2", vec![500]),
        ("networking_network_v2", vec![409]),
        ("networking_subnet_v2", vec![409]),
        ("networking_router_interface_v2", vec![409]),
        ("networking_secgroup_v2", vec![409]),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Config {
    /// Load settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k).filter(|v| !v.is_empty()))
                .unwrap_or_default()
        };

        let pool_name = first(&["OS_POOL_NAME"]);
        let insecure = first(&["OS_INSECURE"]);

        Self {
            auth_url: first(&["OS_AUTH_URL"]),
            region: first(&["OS_REGION_NAME"]),
            username: first(&["OS_USERNAME"]),
            user_id: first(&["OS_USER_ID"]),
            password: first(&["OS_PASSWORD"]),
            token: first(&["OS_TOKEN", "OS_AUTH_TOKEN"]),
            tenant_id: first(&["OS_TENANT_ID", "OS_PROJECT_ID"]),
            tenant_name: first(&["OS_TENANT_NAME", "OS_PROJECT_NAME"]),
            domain_id: first(&["OS_DOMAIN_ID"]),
            domain_name: first(&["OS_DOMAIN_NAME"]),
            user_domain_name: first(&["OS_USER_DOMAIN_NAME"]),
            project_domain_name: first(&["OS_PROJECT_DOMAIN_NAME"]),
            insecure: matches!(insecure.as_str(), "1" | "true" | "TRUE" | "True"),
            endpoint_type: Some(first(&["OS_ENDPOINT_TYPE"]))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "public".to_string()),
            pool_name: Some(pool_name).filter(|s| !s.is_empty()),
            ..Self::default()
        }
    }

    /// Load settings from a JSON file; unset fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check that the settings are usable for authentication
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_url.is_empty() {
            return Err(ConfigError::Missing("auth_url (OS_AUTH_URL)"));
        }
        if self.token.is_empty() {
            if self.password.is_empty() {
                return Err(ConfigError::Missing("password (OS_PASSWORD) or token (OS_TOKEN)"));
            }
            if self.username.is_empty() && self.user_id.is_empty() {
                return Err(ConfigError::Missing("username (OS_USERNAME) or user_id (OS_USER_ID)"));
            }
        }
        self.interface()?;
        Ok(())
    }

    /// Catalog interface name for `endpoint_type`
    pub fn interface(&self) -> Result<&'static str, ConfigError> {
        match self.endpoint_type.as_str() {
            "" | "public" | "publicURL" => Ok("public"),
            "internal" | "internalURL" => Ok("internal"),
            "admin" | "adminURL" => Ok("admin"),
            other => Err(ConfigError::Invalid {
                field: "endpoint_type",
                message: format!("'{}' is not one of public, internal, admin", other),
            }),
        }
    }

    /// Status codes to ride out while deleting a resource of this type
    pub fn transient_codes(&self, resource_type: &str) -> &[u16] {
        self.transient_errors
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Region given on the resource, else the provider region
    pub fn resolve_region(&self, resource_region: Option<&str>) -> String {
        resource_region
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.region)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_os_variables() {
        let config = Config::from_lookup(lookup(&[
            ("OS_AUTH_URL", "https://iam.example.com/v3"),
            ("OS_REGION_NAME", "region-1"),
            ("OS_USERNAME", "admin"),
            ("OS_PASSWORD", "secret"),
            ("OS_PROJECT_ID", "p-123"),
            ("OS_INSECURE", "true"),
            ("OS_POOL_NAME", "admin_external_net"),
        ]));
        assert_eq!(config.region, "region-1");
        assert_eq!(config.tenant_id, "p-123");
        assert!(config.insecure);
        assert_eq!(config.pool_name.as_deref(), Some("admin_external_net"));
        assert_eq!(config.endpoint_type, "public");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tenant_variable_wins_over_project_alias() {
        let config = Config::from_lookup(lookup(&[
            ("OS_TENANT_NAME", "tenant"),
            ("OS_PROJECT_NAME", "project"),
            ("OS_AUTH_TOKEN", "tok"),
        ]));
        assert_eq!(config.tenant_name, "tenant");
        assert_eq!(config.token, "tok");
    }

    #[test]
    fn validate_requires_credentials() {
        let config = Config {
            auth_url: "https://iam.example.com/v3".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let config = Config {
            password: "secret".to_string(),
            ..config
        };
        assert!(config.validate().is_err());

        let config = Config {
            user_id: "u-1".to_string(),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_endpoint_type() {
        let config = Config {
            endpoint_type: "private".to_string(),
            ..Config::default()
        };
        assert!(config.interface().is_err());
        assert_eq!(
            Config {
                endpoint_type: "internalURL".to_string(),
                ..Config::default()
            }
            .interface()
            .unwrap(),
            "internal"
        );
    }

    #[test]
    fn default_transient_codes() {
        let config = Config::default();
        assert_eq!(config.transient_codes("networking_floatingip_v2"), &[500]);
        assert_eq!(config.transient_codes("networking_subnet_v2"), &[409]);
        assert_eq!(config.transient_codes("networking_secgroup_v2"), &[409]);
        assert!(config.transient_codes("compute_keypair_v2").is_empty());
    }

    #[test]
    fn loads_json_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"auth_url": "https://iam.example.com/v3", "token": "t",
                "transient_errors": {{"networking_port_v2": [409]}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.token, "t");
        assert_eq!(config.endpoint_type, "public");
        assert_eq!(config.transient_codes("networking_port_v2"), &[409]);
        // A file that names transient_errors replaces the defaults
        assert!(config.transient_codes("networking_floatingip_v2").is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn resource_region_overrides_provider_region() {
        let config = Config {
            region: "region-1".to_string(),
            ..Config::default()
        };
        assert_eq!(config.resolve_region(Some("region-2")), "region-2");
        assert_eq!(config.resolve_region(Some("")), "region-1");
        assert_eq!(config.resolve_region(None), "region-1");
    }
}
