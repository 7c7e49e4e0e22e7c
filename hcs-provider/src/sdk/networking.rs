//! Networking v2 (neutron) models

use serde::{Deserialize, Serialize};

use super::{ValueSpecs, nullable};
use crate::client::{Collection, Service};

const fn neutron(path: &'static str, singular: &'static str, plural: &'static str, kind: &'static str) -> Collection {
    Collection {
        service: Service::Network,
        path,
        singular,
        plural,
        id_field: "id",
        wrap_requests: true,
        kind,
    }
}

pub const NETWORKS: Collection = neutron("v2.0/networks", "network", "networks", "network");
pub const SUBNETS: Collection = neutron("v2.0/subnets", "subnet", "subnets", "subnet");
pub const ROUTERS: Collection = neutron("v2.0/routers", "router", "routers", "router");
pub const PORTS: Collection = neutron("v2.0/ports", "port", "ports", "port");
pub const FLOATING_IPS: Collection =
    neutron("v2.0/floatingips", "floatingip", "floatingips", "floating IP");
pub const SECURITY_GROUPS: Collection = neutron(
    "v2.0/security-groups",
    "security_group",
    "security_groups",
    "security group",
);
pub const SECURITY_GROUP_RULES: Collection = neutron(
    "v2.0/security-group-rules",
    "security_group_rule",
    "security_group_rules",
    "security group rule",
);

// =============================================================================
// Networks
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Network {
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub status: String,
    pub admin_state_up: bool,
    pub shared: bool,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkCreateOpts {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

// =============================================================================
// Subnets
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationPool {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRoute {
    pub destination: String,
    pub nexthop: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub cidr: String,
    pub ip_version: i64,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
    #[serde(deserialize_with = "nullable")]
    pub gateway_ip: String,
    pub enable_dhcp: bool,
    #[serde(deserialize_with = "nullable")]
    pub dns_nameservers: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub host_routes: Vec<HostRoute>,
    #[serde(deserialize_with = "nullable")]
    pub allocation_pools: Vec<AllocationPool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubnetCreateOpts {
    pub network_id: String,
    pub cidr: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    pub ip_version: i64,
    pub enable_dhcp: bool,
    /// `Some(None)` disables the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<Option<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocation_pools: Vec<AllocationPool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dns_nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host_routes: Vec<HostRoute>,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubnetUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_nameservers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_routes: Option<Vec<HostRoute>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_pools: Option<Vec<AllocationPool>>,
}

// =============================================================================
// Routers
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayInfo {
    /// Empty clears the gateway; neutron expects `{}` rather than an empty id
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub network_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_snat: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Router {
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub status: String,
    pub admin_state_up: bool,
    pub distributed: bool,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
    #[serde(deserialize_with = "nullable")]
    pub external_gateway_info: GatewayInfo,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterCreateOpts {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<GatewayInfo>,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<GatewayInfo>,
}

/// Body of `add_router_interface` / `remove_router_interface`
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterfaceOpts {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub port_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterfaceInfo {
    /// Router id
    pub id: String,
    pub subnet_id: String,
    pub port_id: String,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
}

// =============================================================================
// Ports
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedIp {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnet_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPair {
    pub ip_address: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Port {
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub status: String,
    pub network_id: String,
    pub admin_state_up: bool,
    #[serde(deserialize_with = "nullable")]
    pub mac_address: String,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
    #[serde(deserialize_with = "nullable")]
    pub device_owner: String,
    #[serde(deserialize_with = "nullable")]
    pub device_id: String,
    #[serde(deserialize_with = "nullable")]
    pub security_groups: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(deserialize_with = "nullable")]
    pub allowed_address_pairs: Vec<AddressPair>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PortCreateOpts {
    pub network_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_owner: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_ips: Option<Vec<FixedIp>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_address_pairs: Vec<AddressPair>,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PortUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_ips: Option<Vec<FixedIp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
}

// =============================================================================
// Floating IPs
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    pub floating_network_id: String,
    #[serde(deserialize_with = "nullable")]
    pub port_id: String,
    #[serde(deserialize_with = "nullable")]
    pub fixed_ip_address: String,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FloatingIpCreateOpts {
    pub floating_network_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub port_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fixed_ip_address: String,
    #[serde(flatten)]
    pub value_specs: ValueSpecs,
}

/// `port_id: null` disassociates the address
#[derive(Debug, Clone, Default, Serialize)]
pub struct FloatingIpUpdateOpts {
    pub port_id: Option<String>,
}

// =============================================================================
// Security groups
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityGroup {
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
    /// Rules neutron adds to every new group (egress to anywhere)
    #[serde(deserialize_with = "nullable")]
    pub security_group_rules: Vec<SecurityGroupRule>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityGroupCreateOpts {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityGroupUpdateOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityGroupRule {
    pub id: String,
    pub direction: String,
    pub ethertype: String,
    pub security_group_id: String,
    #[serde(deserialize_with = "nullable")]
    pub protocol: String,
    #[serde(deserialize_with = "nullable")]
    pub port_range_min: i64,
    #[serde(deserialize_with = "nullable")]
    pub port_range_max: i64,
    #[serde(deserialize_with = "nullable")]
    pub remote_ip_prefix: String,
    #[serde(deserialize_with = "nullable")]
    pub remote_group_id: String,
    #[serde(deserialize_with = "nullable")]
    pub tenant_id: String,
}

/// Rules cannot be updated; every field is fixed at creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityGroupRuleCreateOpts {
    pub direction: String,
    pub ethertype: String,
    pub security_group_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_ip_prefix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_group_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
}
