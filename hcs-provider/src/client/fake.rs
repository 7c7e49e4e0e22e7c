//! In-memory `CloudApi` for tests
//!
//! Objects live in per-collection maps. Statuses can be scripted per
//! collection, errors injected per method and collection, and every call
//! is recorded as `"METHOD path"`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value as Json, json};

use super::{ApiError, ApiResult, CloudApi, Collection};
use crate::sdk::networking::{PORTS, ROUTERS, SUBNETS};

#[derive(Default)]
struct Inner {
    objects: HashMap<&'static str, BTreeMap<String, Json>>,
    initial_status: HashMap<&'static str, String>,
    scripts: HashMap<&'static str, VecDeque<String>>,
    defaults: HashMap<&'static str, Json>,
    faults: VecDeque<(String, &'static str, u16)>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeCloud {
    inner: Mutex<Inner>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status given to objects created in `collection`
    pub fn with_status(self, collection: &Collection, status: &str) -> Self {
        self.lock()
            .initial_status
            .insert(collection.path, status.to_string());
        self
    }

    /// Fields merged into objects created in `collection` when the request omits them
    pub fn with_defaults(self, collection: &Collection, defaults: Json) -> Self {
        self.lock().defaults.insert(collection.path, defaults);
        self
    }

    /// Statuses reported by successive gets; the last one sticks
    pub fn script(&self, collection: &Collection, statuses: &[&str]) {
        self.lock().scripts.insert(
            collection.path,
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Fail the next `method` call on `collection` with `status`
    pub fn fail(&self, method: &str, collection: &Collection, status: u16) {
        self.lock()
            .faults
            .push_back((method.to_string(), collection.path, status));
    }

    /// Store an object directly, returning its id
    pub fn insert(&self, collection: &Collection, object: Json) -> String {
        let mut inner = self.lock();
        store(&mut inner, collection, object)
    }

    pub fn object(&self, collection: &Collection, id: &str) -> Option<Json> {
        self.lock()
            .objects
            .get(collection.path)
            .and_then(|objects| objects.get(id))
            .cloned()
    }

    pub fn count(&self, collection: &Collection) -> usize {
        self.lock()
            .objects
            .get(collection.path)
            .map_or(0, BTreeMap::len)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn store(inner: &mut Inner, collection: &Collection, mut object: Json) -> String {
    let id = object
        .get(collection.id_field)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_id);
    if let Some(fields) = object.as_object_mut() {
        fields.insert(collection.id_field.to_string(), json!(id));
    }
    inner
        .objects
        .entry(collection.path)
        .or_default()
        .insert(id.clone(), object);
    id
}

fn not_found(collection: &Collection, id: &str) -> ApiError {
    ApiError::NotFound {
        kind: collection.kind.to_string(),
        id: id.to_string(),
    }
}

/// Record the call and pop a matching injected fault
fn enter(inner: &mut Inner, method: &str, collection: &Collection, call: String) -> ApiResult<()> {
    inner.calls.push(call.clone());
    let position = inner
        .faults
        .iter()
        .position(|(m, path, _)| m == method && *path == collection.path);
    let Some((_, _, status)) = position.and_then(|i| inner.faults.remove(i)) else {
        return Ok(());
    };
    if status == 404 {
        return Err(not_found(collection, &call));
    }
    Err(ApiError::UnexpectedStatus {
        status,
        method: method.to_string(),
        url: call,
        body: "injected fault".to_string(),
    })
}

fn matches_filter(object: &Json, filter: &[(&str, String)]) -> bool {
    filter.iter().all(|(key, wanted)| match object.get(*key) {
        Some(Json::String(s)) => s == wanted,
        Some(other) => other.to_string() == *wanted,
        None => false,
    })
}

fn body_str<'a>(body: &'a Json, key: &str) -> &'a str {
    body.get(key).and_then(Json::as_str).unwrap_or_default()
}

fn first_subnet(port: &Json) -> String {
    port.pointer("/fixed_ips/0/subnet_id")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string()
}

fn add_interface(inner: &mut Inner, router_id: &str, body: &Json) -> ApiResult<Json> {
    let port_id = body_str(body, "port_id");
    let subnet_id = body_str(body, "subnet_id");
    let status = inner
        .initial_status
        .get(PORTS.path)
        .cloned()
        .unwrap_or_else(|| "ACTIVE".to_string());

    let port = if !port_id.is_empty() {
        let port = inner
            .objects
            .get_mut(PORTS.path)
            .and_then(|ports| ports.get_mut(port_id))
            .ok_or_else(|| not_found(&PORTS, port_id))?;
        port["device_id"] = json!(router_id);
        port["device_owner"] = json!("network:router_interface");
        port.clone()
    } else {
        let subnet = inner
            .objects
            .get(SUBNETS.path)
            .and_then(|subnets| subnets.get(subnet_id))
            .cloned()
            .ok_or_else(|| not_found(&SUBNETS, subnet_id))?;
        let port = json!({
            "network_id": subnet.get("network_id").cloned().unwrap_or(Json::Null),
            "fixed_ips": [{"subnet_id": subnet_id, "ip_address": subnet.get("gateway_ip").cloned().unwrap_or(Json::Null)}],
            "device_id": router_id,
            "device_owner": "network:router_interface",
            "status": status,
            "admin_state_up": true,
        });
        let id = store(inner, &PORTS, port);
        inner.objects[PORTS.path][&id].clone()
    };

    Ok(json!({
        "id": router_id,
        "port_id": port["id"],
        "subnet_id": first_subnet(&port),
    }))
}

fn remove_interface(inner: &mut Inner, router_id: &str, body: &Json) -> ApiResult<Json> {
    let port_id = body_str(body, "port_id");
    let subnet_id = body_str(body, "subnet_id");
    let ports = inner.objects.entry(PORTS.path).or_default();
    let found = ports
        .iter()
        .find(|(id, port)| {
            body_str(port, "device_id") == router_id
                && (if port_id.is_empty() {
                    first_subnet(port) == subnet_id
                } else {
                    id.as_str() == port_id
                })
        })
        .map(|(id, _)| id.clone());
    let id = found.ok_or_else(|| not_found(&PORTS, port_id))?;
    let port = ports.remove(&id).unwrap_or(Json::Null);
    Ok(json!({"id": router_id, "port_id": id, "subnet_id": first_subnet(&port)}))
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn create(&self, _region: &str, collection: &Collection, body: Json) -> ApiResult<Json> {
        let mut inner = self.lock();
        enter(&mut inner, "POST", collection, format!("POST {}", collection.path))?;

        let mut object = body;
        if let (Some(fields), Some(Json::Object(defaults))) =
            (object.as_object_mut(), inner.defaults.get(collection.path))
        {
            for (key, value) in defaults {
                fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        if let Some(status) = inner.initial_status.get(collection.path) {
            object["status"] = json!(status);
        }
        let id = store(&mut inner, collection, object);
        Ok(inner.objects[collection.path][&id].clone())
    }

    async fn get(&self, _region: &str, collection: &Collection, id: &str) -> ApiResult<Json> {
        let mut inner = self.lock();
        enter(&mut inner, "GET", collection, format!("GET {}/{}", collection.path, id))?;

        let status = inner.scripts.get_mut(collection.path).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        let object = inner
            .objects
            .get_mut(collection.path)
            .and_then(|objects| objects.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;
        if let Some(status) = status {
            object["status"] = json!(status);
        }
        Ok(object.clone())
    }

    async fn update(
        &self,
        _region: &str,
        collection: &Collection,
        id: &str,
        body: Json,
    ) -> ApiResult<Json> {
        let mut inner = self.lock();
        enter(&mut inner, "PUT", collection, format!("PUT {}/{}", collection.path, id))?;

        let object = inner
            .objects
            .get_mut(collection.path)
            .and_then(|objects| objects.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;
        if let (Some(fields), Json::Object(changes)) = (object.as_object_mut(), body) {
            fields.extend(changes);
        }
        Ok(object.clone())
    }

    async fn delete(
        &self,
        _region: &str,
        collection: &Collection,
        id: &str,
        params: &[(&str, String)],
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let call = if query.is_empty() {
            format!("DELETE {}/{}", collection.path, id)
        } else {
            format!("DELETE {}/{}?{}", collection.path, id, query.join("&"))
        };
        enter(&mut inner, "DELETE", collection, call)?;

        inner
            .objects
            .get_mut(collection.path)
            .and_then(|objects| objects.remove(id))
            .map(|_| ())
            .ok_or_else(|| not_found(collection, id))
    }

    async fn list(
        &self,
        _region: &str,
        collection: &Collection,
        filter: &[(&str, String)],
    ) -> ApiResult<Vec<Json>> {
        let mut inner = self.lock();
        enter(&mut inner, "LIST", collection, format!("GET {}", collection.path))?;

        Ok(inner
            .objects
            .get(collection.path)
            .map(|objects| {
                objects
                    .values()
                    .filter(|o| matches_filter(o, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn action(
        &self,
        _region: &str,
        collection: &Collection,
        id: &str,
        action: &str,
        body: Json,
    ) -> ApiResult<Json> {
        let mut inner = self.lock();
        let call = format!("PUT {}/{}/{}", collection.path, id, action);
        enter(&mut inner, action, collection, call.clone())?;

        if collection.path != ROUTERS.path {
            return Err(ApiError::UnexpectedStatus {
                status: 400,
                method: "PUT".to_string(),
                url: call,
                body: "unsupported action".to_string(),
            });
        }
        if !inner
            .objects
            .get(ROUTERS.path)
            .is_some_and(|routers| routers.contains_key(id))
        {
            return Err(not_found(collection, id));
        }
        match action {
            "add_router_interface" => add_interface(&mut inner, id, &body),
            "remove_router_interface" => remove_interface(&mut inner, id, &body),
            _ => Err(ApiError::UnexpectedStatus {
                status: 400,
                method: "PUT".to_string(),
                url: call,
                body: "unsupported action".to_string(),
            }),
        }
    }
}
