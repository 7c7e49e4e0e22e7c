//! Attrs - Typed read access to attribute maps
//!
//! Resources turn their attribute maps into typed configuration structs
//! through these accessors. A present attribute of the wrong type is a
//! validation error naming the attribute.

use std::collections::{BTreeMap, HashMap};

use crate::provider::{ProviderError, ProviderResult};
use crate::resource::Value;

/// Borrowed view over an attribute map
#[derive(Debug, Clone, Copy)]
pub struct Attrs<'a> {
    map: &'a HashMap<String, Value>,
}

fn type_error(key: &str, expected: &str) -> ProviderError {
    ProviderError::validation(&[key], format!("{key}: expected {expected}"))
}

impl<'a> Attrs<'a> {
    pub fn new(map: &'a HashMap<String, Value>) -> Self {
        Self { map }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub fn string(&self, key: &str) -> ProviderResult<Option<String>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(type_error(key, "a string")),
        }
    }

    /// String attribute, treating "" as unset
    pub fn non_empty_string(&self, key: &str) -> ProviderResult<Option<String>> {
        Ok(self.string(key)?.filter(|s| !s.is_empty()))
    }

    pub fn string_or_default(&self, key: &str) -> ProviderResult<String> {
        Ok(self.string(key)?.unwrap_or_default())
    }

    pub fn required_string(&self, key: &str) -> ProviderResult<String> {
        self.non_empty_string(key)?.ok_or_else(|| {
            ProviderError::validation(&[key], format!("{key}: required attribute is not set"))
        })
    }

    pub fn bool(&self, key: &str) -> ProviderResult<Option<bool>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            // Host runtimes commonly pass "true"/"false"
            Some(Value::String(s)) if s == "true" => Ok(Some(true)),
            Some(Value::String(s)) if s == "false" => Ok(Some(false)),
            Some(_) => Err(type_error(key, "a bool")),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> ProviderResult<bool> {
        Ok(self.bool(key)?.unwrap_or(default))
    }

    pub fn int(&self, key: &str) -> ProviderResult<Option<i64>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| type_error(key, "an integer")),
            Some(_) => Err(type_error(key, "an integer")),
        }
    }

    /// List of strings; an absent attribute is an empty list
    pub fn strings(&self, key: &str) -> ProviderResult<Vec<String>> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| type_error(key, "a list of strings"))
                })
                .collect(),
            Some(_) => Err(type_error(key, "a list of strings")),
        }
    }

    /// Map of strings; an absent attribute is an empty map
    pub fn string_map(&self, key: &str) -> ProviderResult<BTreeMap<String, String>> {
        match self.map.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    Value::Int(i) => Ok((k.clone(), i.to_string())),
                    Value::Bool(b) => Ok((k.clone(), b.to_string())),
                    _ => Err(type_error(key, "a map of strings")),
                })
                .collect(),
            Some(_) => Err(type_error(key, "a map of strings")),
        }
    }

    /// Repeated nested blocks (a list of maps)
    pub fn blocks(&self, key: &str) -> ProviderResult<Vec<Attrs<'a>>> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Map(map) => Ok(Attrs::new(map)),
                    _ => Err(type_error(key, "a list of blocks")),
                })
                .collect(),
            Some(Value::Map(map)) => Ok(vec![Attrs::new(map)]),
            Some(_) => Err(type_error(key, "a list of blocks")),
        }
    }

    /// Single nested block, given either as a map or a one-element list
    pub fn block(&self, key: &str) -> ProviderResult<Option<Attrs<'a>>> {
        let mut blocks = self.blocks(key)?;
        match blocks.len() {
            0 => Ok(None),
            1 => Ok(blocks.pop()),
            _ => Err(type_error(key, "a single block")),
        }
    }
}
