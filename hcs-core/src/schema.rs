//! Schema - Define type schemas for resources
//!
//! Each resource type declares its attributes, which lets the provider
//! reject bad configuration before any backend call and lets the differ
//! know which attributes are computed or force a new resource.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::provider::{ProviderError, ProviderResult};
use crate::resource::Value;
use crate::timeouts::Timeouts;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attributes
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),
            // Host runtimes pass booleans and numbers as strings as well
            (AttributeType::Bool, Value::String(s)) if s == "true" || s == "false" => Ok(()),
            (AttributeType::Int, Value::String(s)) if s.parse::<i64>().is_ok() => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(attributes), Value::Map(map)) => {
                for schema in attributes {
                    match map.get(&schema.name) {
                        Some(v) => schema.attr_type.validate(v).map_err(|e| {
                            TypeError::InAttribute {
                                name: schema.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if schema.required => {
                            return Err(TypeError::MissingRequired {
                                name: schema.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                for key in map.keys() {
                    if !attributes.iter().any(|a| &a.name == key) {
                        return Err(TypeError::UnknownAttribute { name: key.clone() });
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("'{name}' conflicts with '{other}'")]
    Conflict { name: String, other: String },

    #[error("{name}: {inner}")]
    InAttribute { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl TypeError {
    /// Top-level attribute names this error is about
    pub fn fields(&self) -> Vec<String> {
        match self {
            TypeError::MissingRequired { name }
            | TypeError::UnknownAttribute { name }
            | TypeError::InAttribute { name, .. } => vec![name.clone()],
            TypeError::Conflict { name, other } => vec![name.clone(), other.clone()],
            _ => Vec::new(),
        }
    }
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Filled in by the backend when not configured
    pub computed: bool,
    /// Changing the attribute replaces the resource
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub conflicts_with: Vec<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            conflicts_with: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn conflicts_with(mut self, other: impl Into<String>) -> Self {
        self.conflicts_with.push(other.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    /// Default operation timeouts
    pub timeouts: Timeouts,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Fill in declared defaults for attributes that were not given
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(value)
            {
                errors.push(TypeError::InAttribute {
                    name: name.clone(),
                    inner: Box::new(e),
                });
            }
            // Unknown attributes are allowed (for flexibility)
        }

        // Mutually exclusive attributes; zero values count as unset
        let is_set = |name: &str| attributes.get(name).is_some_and(|v| !v.is_zero());
        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        for name in names {
            for other in &self.attributes[name].conflicts_with {
                if name < other && is_set(name) && is_set(other) {
                    errors.push(TypeError::Conflict {
                        name: name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert the result into a provider error naming every offending field
    pub fn check(&self, attributes: &HashMap<String, Value>) -> ProviderResult<()> {
        self.validate(attributes).map_err(|errors| {
            let mut fields: Vec<String> = errors.iter().flat_map(TypeError::fields).collect();
            fields.sort();
            fields.dedup();
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            ProviderError::Validation { fields, message }
        })
    }

    /// Names of attributes that force a new resource when changed
    pub fn force_new_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
            .collect();
        names.sort();
        names
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                let n = match value {
                    Value::Int(n) => *n,
                    Value::String(s) => s.parse().unwrap_or(0),
                    _ => return Err("Expected integer".to_string()),
                };
                if n > 0 {
                    Ok(())
                } else {
                    Err("Value must be positive".to_string())
                }
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16" or "fd00::/64")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_cidr(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// IPv4 or IPv6 address
    pub fn ip_address() -> AttributeType {
        AttributeType::Custom {
            name: "IpAddress".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.is_empty() => Ok(()),
                Value::String(s) => s
                    .parse::<IpAddr>()
                    .map(|_| ())
                    .map_err(|_| format!("Invalid IP address '{}'", s)),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Boolean that may only be true
    pub fn true_only() -> AttributeType {
        AttributeType::Custom {
            name: "TrueOnly".to_string(),
            base: Box::new(AttributeType::Bool),
            validate: |value| match value {
                Value::Bool(true) => Ok(()),
                Value::String(s) if s == "true" => Ok(()),
                _ => Err("Value can only be true".to_string()),
            },
        }
    }

    pub fn strings() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    };

    let max_prefix = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => 32,
        Ok(IpAddr::V6(_)) => 128,
        Err(_) => return Err(format!("Invalid IP address '{}'", ip)),
    };

    // Validate prefix length
    match prefix.parse::<u8>() {
        Ok(p) if p <= max_prefix => Ok(()),
        Ok(p) => Err(format!(
            "Invalid prefix length '{}': must be 0-{}",
            p, max_prefix
        )),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["SYS".to_string(), "DATA".to_string()]);
        assert!(t.validate(&Value::from("SYS")).is_ok());
        assert!(t.validate(&Value::from("ROOT")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(100)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_true_only() {
        let t = types::true_only();
        assert!(t.validate(&Value::Bool(true)).is_ok());
        assert!(t.validate(&Value::Bool(false)).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("keypair")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(result.is_err());
    }

    #[test]
    fn conflicting_attributes_are_reported_once_with_both_names() {
        let schema = ResourceSchema::new("networking_subnet_v2")
            .attribute(
                AttributeSchema::new("gateway_ip", AttributeType::String)
                    .conflicts_with("no_gateway"),
            )
            .attribute(
                AttributeSchema::new("no_gateway", AttributeType::Bool)
                    .conflicts_with("gateway_ip"),
            );

        let mut attrs = HashMap::new();
        attrs.insert("gateway_ip".to_string(), Value::from("192.168.199.1"));
        attrs.insert("no_gateway".to_string(), Value::Bool(true));

        match schema.check(&attrs).unwrap_err() {
            ProviderError::Validation { fields, .. } => {
                assert_eq!(fields, vec!["gateway_ip", "no_gateway"]);
            }
            other => panic!("Expected validation error, got {other:?}"),
        }

        // false / "" count as unset
        attrs.insert("no_gateway".to_string(), Value::Bool(false));
        assert!(schema.check(&attrs).is_ok());
    }

    #[test]
    fn block_type_checks_nested_attributes() {
        let t = AttributeType::List(Box::new(AttributeType::Block(vec![
            AttributeSchema::new("start", AttributeType::String).required(),
            AttributeSchema::new("end", AttributeType::String).required(),
        ])));

        let mut pool = HashMap::new();
        pool.insert("start".to_string(), Value::from("10.0.0.2"));
        assert!(t.validate(&Value::List(vec![Value::Map(pool.clone())])).is_err());

        pool.insert("end".to_string(), Value::from("10.0.0.200"));
        assert!(t.validate(&Value::List(vec![Value::Map(pool.clone())])).is_ok());

        pool.insert("middle".to_string(), Value::from("10.0.0.100"));
        assert!(t.validate(&Value::List(vec![Value::Map(pool)])).is_err());
    }

    #[test]
    fn defaults_fill_missing_attributes() {
        let schema = ResourceSchema::new("networking_subnet_v2").attribute(
            AttributeSchema::new("ip_version", AttributeType::Int).with_default(Value::Int(4)),
        );
        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("ip_version"), Some(&Value::Int(4)));

        attrs.insert("ip_version".to_string(), Value::Int(6));
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("ip_version"), Some(&Value::Int(6)));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        // Valid CIDRs
        assert!(t.validate(&Value::from("10.0.0.0/16")).is_ok());
        assert!(t.validate(&Value::from("192.168.199.0/24")).is_ok());
        assert!(t.validate(&Value::from("0.0.0.0/0")).is_ok());
        assert!(t.validate(&Value::from("fd00::/64")).is_ok());

        // Invalid CIDRs
        assert!(t.validate(&Value::from("10.0.0.0")).is_err()); // no prefix
        assert!(t.validate(&Value::from("10.0.0.0/33")).is_err()); // prefix too large
        assert!(t.validate(&Value::from("10.0.0.256/16")).is_err()); // octet > 255
        assert!(t.validate(&Value::from("fd00::/129")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err()); // wrong type
    }
}
