//! Differ - Compare desired attributes with the current state
//!
//! Update callbacks only send the fields that actually changed, and a change
//! to a force-new attribute cannot be applied in place at all.

use std::collections::{BTreeSet, HashMap};

use crate::resource::{Resource, State, Value};
use crate::schema::ResourceSchema;

/// Attribute names that differ between desired and current state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    names: BTreeSet<String>,
}

impl Changes {
    pub fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// True if any of the given attributes changed
    pub fn any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has(n))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }
}

impl<S: Into<String>> FromIterator<S> for Changes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create,
    /// Resource exists with differences that can be applied in place
    Update(Changes),
    /// A force-new attribute changed
    Replace(Vec<String>),
    /// Resource exists with no differences -> no action needed
    NoChange,
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange)
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: &ResourceSchema) -> Diff {
    if !current.exists {
        return Diff::Create;
    }

    let changed = changed_attributes(&desired.attributes, &current.attributes, schema);
    if changed.is_empty() {
        return Diff::NoChange;
    }

    let forced: Vec<String> = changed
        .iter()
        .filter(|name| schema.attributes.get(*name).is_some_and(|a| a.force_new))
        .map(str::to_string)
        .collect();
    if forced.is_empty() {
        Diff::Update(changed)
    } else {
        Diff::Replace(forced)
    }
}

/// Find changed attributes between desired and current state
///
/// Computed attributes only count when the user set them. A non-computed
/// attribute that was removed from configuration counts as changed when
/// the backend still holds a non-zero value for it.
pub fn changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: &ResourceSchema,
) -> Changes {
    let mut changed = Changes::default();

    for (key, desired_value) in desired {
        if is_meta(key) {
            continue;
        }
        match current.get(key) {
            Some(current_value) if loosely_equal(current_value, desired_value) => {}
            // Unset optional values read back as nothing
            None if desired_value.is_zero() => {}
            _ => changed.insert(key.clone()),
        }
    }

    for (key, current_value) in current {
        if is_meta(key) || desired.contains_key(key) {
            continue;
        }
        let computed = schema.attributes.get(key).is_none_or(|a| a.computed);
        if !computed && !current_value.is_zero() {
            changed.insert(key.clone());
        }
    }

    changed
}

fn is_meta(key: &str) -> bool {
    key == "timeouts" || key.starts_with('_')
}

/// Equality that accepts the string forms host runtimes use for scalars
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Bool(v)) | (Value::Bool(v), Value::String(s)) => {
            s.parse::<bool>().is_ok_and(|p| p == *v)
        }
        (Value::String(s), Value::Int(v)) | (Value::Int(v), Value::String(s)) => {
            s.parse::<i64>().is_ok_and(|p| p == *v)
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| loosely_equal(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| loosely_equal(v, w)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;
    use crate::schema::{AttributeSchema, AttributeType};

    fn schema() -> ResourceSchema {
        ResourceSchema::new("networking_port_v2")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("admin_state_up", AttributeType::Bool).computed())
            .attribute(AttributeSchema::new("device_owner", AttributeType::String))
            .attribute(
                AttributeSchema::new("network_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
    }

    fn current(pairs: Vec<(&str, Value)>) -> State {
        let attrs = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        State::existing(ResourceId::new("networking_port_v2", "port_1"), attrs)
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("networking_port_v2", "port_1");
        let current = State::not_found(desired.id.clone());
        assert_eq!(diff(&desired, &current, &schema()), Diff::Create);
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("networking_port_v2", "port_1")
            .with_attribute("name", "port_1")
            .with_attribute("admin_state_up", "true");
        let current = current(vec![
            ("name", Value::from("port_1")),
            ("admin_state_up", Value::Bool(true)),
            ("mac_address", Value::from("fa:16:3e:00:00:01")),
        ]);
        let result = diff(&desired, &current, &schema());
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_lists_only_changed_fields() {
        let desired = Resource::new("networking_port_v2", "port_1")
            .with_attribute("name", "renamed")
            .with_attribute("network_id", "net-1");
        let current = current(vec![
            ("name", Value::from("port_1")),
            ("network_id", Value::from("net-1")),
            ("admin_state_up", Value::Bool(true)),
        ]);
        match diff(&desired, &current, &schema()) {
            Diff::Update(changes) => {
                assert!(changes.has("name"));
                assert!(!changes.has("admin_state_up"));
                assert_eq!(changes.iter().count(), 1);
            }
            other => panic!("Expected update, got {other:?}"),
        }
    }

    #[test]
    fn removed_non_computed_attribute_is_a_change() {
        let desired = Resource::new("networking_port_v2", "port_1");
        let current = current(vec![("device_owner", Value::from("network:dhcp"))]);
        let changes = changed_attributes(&desired.attributes, &current.attributes, &schema());
        assert!(changes.has("device_owner"));
    }

    #[test]
    fn force_new_change_requires_replacement() {
        let desired =
            Resource::new("networking_port_v2", "port_1").with_attribute("network_id", "net-2");
        let current = current(vec![("network_id", Value::from("net-1"))]);
        assert_eq!(
            diff(&desired, &current, &schema()),
            Diff::Replace(vec!["network_id".to_string()])
        );
    }

    #[test]
    fn timeouts_never_count_as_changes() {
        let mut block = HashMap::new();
        block.insert("create".to_string(), Value::from("5m"));
        let mut desired = HashMap::new();
        desired.insert("timeouts".to_string(), Value::Map(block));
        let changes = changed_attributes(&desired, &HashMap::new(), &schema());
        assert!(changes.is_empty());
    }
}
