//! REST implementation of `CloudApi`
//!
//! Authenticates against Keystone v3, finds service endpoints in the token
//! catalog and follows `*_links` pagination on list calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value as Json, json};
use tokio::sync::Mutex;

use super::{ApiError, ApiResult, CloudApi, Collection, Service};
use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Scoped token with its service catalog
#[derive(Debug, Clone)]
struct Token {
    value: String,
    project_id: String,
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    region_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
    project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    id: String,
}

/// HTTP client for OpenStack-style APIs
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<Config>,
    token: Mutex<Option<Token>>,
}

impl RestClient {
    pub fn new(config: Arc<Config>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    /// Keystone v3 authentication request body
    fn auth_body(&self) -> Json {
        let c = &self.config;

        let identity = if c.password.is_empty() {
            json!({"methods": ["token"], "token": {"id": c.token}})
        } else {
            let mut user = json!({"password": c.password});
            if c.user_id.is_empty() {
                user["name"] = json!(c.username);
                let domain = first_non_empty(&[&c.user_domain_name, &c.domain_name]);
                user["domain"] = domain_ref(&c.domain_id, domain);
            } else {
                user["id"] = json!(c.user_id);
            }
            json!({"methods": ["password"], "password": {"user": user}})
        };

        let scope = if !c.tenant_id.is_empty() {
            json!({"project": {"id": c.tenant_id}})
        } else if !c.tenant_name.is_empty() {
            let domain = first_non_empty(&[&c.project_domain_name, &c.domain_name]);
            json!({"project": {"name": c.tenant_name, "domain": domain_ref(&c.domain_id, domain)}})
        } else if !c.domain_id.is_empty() || !c.domain_name.is_empty() {
            json!({"domain": domain_ref(&c.domain_id, &c.domain_name)})
        } else {
            Json::Null
        };

        let mut auth = json!({"identity": identity});
        if !scope.is_null() {
            auth["scope"] = scope;
        }
        json!({"auth": auth})
    }

    async fn authenticate(&self) -> ApiResult<Token> {
        let url = format!("{}/auth/tokens", self.config.auth_url.trim_end_matches('/'));
        debug!("Authenticating against {}", url);

        let response = self.http.post(&url).json(&self.auth_body()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("{} returned {}: {}", url, status, body)));
        }

        let value = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Auth("response carries no X-Subject-Token".to_string()))?;
        let body: TokenBody = response.json().await?;

        info!("Authenticated against {}", self.config.auth_url);
        Ok(Token {
            value,
            project_id: body
                .token
                .project
                .map(|p| p.id)
                .unwrap_or_else(|| self.config.tenant_id.clone()),
            catalog: body.token.catalog,
        })
    }

    /// Cached token, authenticating on first use
    async fn token(&self) -> ApiResult<Token> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    fn endpoint(&self, token: &Token, service: Service, region: &str) -> ApiResult<String> {
        if let Some(url) = self.config.endpoints.get(service.catalog_type()) {
            return Ok(url.clone());
        }

        let interface = self
            .config
            .interface()
            .map_err(|e| ApiError::Auth(e.to_string()))?;

        token
            .catalog
            .iter()
            .filter(|entry| entry.service_type == service.catalog_type())
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| {
                ep.interface == interface
                    && (region.is_empty() || ep.region == region || ep.region_id == region)
            })
            .map(|ep| ep.url.clone())
            .ok_or_else(|| ApiError::EndpointNotFound {
                service: service.to_string(),
                region: region.to_string(),
            })
    }

    fn collection_url(&self, token: &Token, region: &str, collection: &Collection) -> ApiResult<String> {
        let base = self.endpoint(token, collection.service, region)?;
        let path = collection.path.replace("{project_id}", &token.project_id);
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    /// Send a request; a 401 re-authenticates once
    async fn send(
        &self,
        method: Method,
        region: &str,
        collection: &Collection,
        suffix: &str,
        query: &[(&str, String)],
        body: Option<&Json>,
    ) -> ApiResult<Json> {
        let mut retried = false;
        loop {
            let token = self.token().await?;
            let url = format!(
                "{}{}",
                self.collection_url(&token, region, collection)?,
                suffix
            );
            debug!("{} {}", method, url);

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("X-Auth-Token", &token.value)
                .header("Accept", "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!("Token rejected, authenticating again");
                self.invalidate_token().await;
                retried = true;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(ApiError::NotFound {
                    kind: collection.kind.to_string(),
                    id: suffix.trim_start_matches('/').to_string(),
                });
            }

            let text = response.text().await?;
            if !status.is_success() {
                return Err(ApiError::UnexpectedStatus {
                    status: status.as_u16(),
                    method: method.to_string(),
                    url,
                    body: text,
                });
            }

            let json = if text.trim().is_empty() {
                Json::Null
            } else {
                serde_json::from_str(&text).map_err(|e| ApiError::Decode {
                    kind: collection.kind.to_string(),
                    message: e.to_string(),
                })?
            };
            return Ok(json);
        }
    }

    fn envelope(collection: &Collection, body: Json) -> Json {
        if collection.wrap_requests {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(collection.singular.to_string(), body);
            Json::Object(wrapped)
        } else {
            body
        }
    }

    fn unwrap(collection: &Collection, mut body: Json) -> Json {
        match body.get_mut(collection.singular) {
            Some(inner) => inner.take(),
            None => body,
        }
    }

    /// Absolute URL of the next page, if any
    fn next_link(collection: &Collection, body: &Json) -> Option<String> {
        body.get(format!("{}_links", collection.plural))
            .and_then(Json::as_array)?
            .iter()
            .find(|link| link.get("rel").and_then(Json::as_str) == Some("next"))
            .and_then(|link| link.get("href").and_then(Json::as_str))
            .map(str::to_string)
    }

    async fn get_url(&self, url: &str, collection: &Collection) -> ApiResult<Json> {
        let token = self.token().await?;
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .header("X-Auth-Token", &token.value)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::UnexpectedStatus {
                status: status.as_u16(),
                method: "GET".to_string(),
                url: url.to_string(),
                body,
            });
        }
        response.json().await.map_err(|e| ApiError::Decode {
            kind: collection.kind.to_string(),
            message: e.to_string(),
        })
    }
}

fn first_non_empty<'a>(values: &[&'a String]) -> &'a str {
    values
        .iter()
        .find(|v| !v.is_empty())
        .map(|v| v.as_str())
        .unwrap_or("")
}

fn domain_ref(id: &str, name: &str) -> Json {
    if !id.is_empty() {
        json!({"id": id})
    } else if !name.is_empty() {
        json!({"name": name})
    } else {
        json!({"id": "default"})
    }
}

#[async_trait]
impl CloudApi for RestClient {
    async fn create(&self, region: &str, collection: &Collection, body: Json) -> ApiResult<Json> {
        let body = Self::envelope(collection, body);
        let response = self
            .send(Method::POST, region, collection, "", &[], Some(&body))
            .await?;

        // Some services answer with the new id only
        let id_key = format!("{}_id", collection.singular);
        if response.get(collection.singular).is_none()
            && let Some(id) = response.get(&id_key).and_then(Json::as_str)
        {
            return self.get(region, collection, id).await;
        }
        Ok(Self::unwrap(collection, response))
    }

    async fn get(&self, region: &str, collection: &Collection, id: &str) -> ApiResult<Json> {
        let response = self
            .send(Method::GET, region, collection, &format!("/{}", id), &[], None)
            .await?;
        Ok(Self::unwrap(collection, response))
    }

    async fn update(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        body: Json,
    ) -> ApiResult<Json> {
        let body = Self::envelope(collection, body);
        let response = self
            .send(Method::PUT, region, collection, &format!("/{}", id), &[], Some(&body))
            .await?;
        Ok(Self::unwrap(collection, response))
    }

    async fn delete(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        params: &[(&str, String)],
    ) -> ApiResult<()> {
        self.send(Method::DELETE, region, collection, &format!("/{}", id), params, None)
            .await?;
        Ok(())
    }

    async fn list(
        &self,
        region: &str,
        collection: &Collection,
        filter: &[(&str, String)],
    ) -> ApiResult<Vec<Json>> {
        let mut page = self
            .send(Method::GET, region, collection, "", filter, None)
            .await?;

        let mut items = Vec::new();
        loop {
            if let Some(Json::Array(batch)) = page.get_mut(collection.plural).map(Json::take) {
                items.extend(batch);
            }
            match Self::next_link(collection, &page) {
                Some(next) => page = self.get_url(&next, collection).await?,
                None => break,
            }
        }
        debug!("Listed {} {}", items.len(), collection.plural);
        Ok(items)
    }

    async fn action(
        &self,
        region: &str,
        collection: &Collection,
        id: &str,
        action: &str,
        body: Json,
    ) -> ApiResult<Json> {
        let response = self
            .send(
                Method::PUT,
                region,
                collection,
                &format!("/{}/{}", id, action),
                &[],
                Some(&body),
            )
            .await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNETS: Collection = Collection {
        service: Service::Network,
        path: "v2.0/subnets",
        singular: "subnet",
        plural: "subnets",
        id_field: "id",
        wrap_requests: true,
        kind: "subnet",
    };

    fn client(config: Config) -> RestClient {
        RestClient::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn password_auth_with_project_name() {
        let c = client(Config {
            auth_url: "https://iam.example.com/v3".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            tenant_name: "demo".to_string(),
            domain_name: "example".to_string(),
            ..Config::default()
        });
        let body = c.auth_body();
        assert_eq!(body["auth"]["identity"]["methods"], json!(["password"]));
        assert_eq!(
            body["auth"]["identity"]["password"]["user"]["domain"],
            json!({"name": "example"})
        );
        assert_eq!(body["auth"]["scope"]["project"]["name"], json!("demo"));
    }

    #[test]
    fn token_auth_scoped_to_project_id() {
        let c = client(Config {
            auth_url: "https://iam.example.com/v3".to_string(),
            token: "tok".to_string(),
            tenant_id: "p-1".to_string(),
            ..Config::default()
        });
        let body = c.auth_body();
        assert_eq!(body["auth"]["identity"]["token"]["id"], json!("tok"));
        assert_eq!(body["auth"]["scope"], json!({"project": {"id": "p-1"}}));
    }

    #[test]
    fn endpoint_from_catalog_matches_interface_and_region() {
        let c = client(Config::default());
        let token = Token {
            value: "t".to_string(),
            project_id: "p-1".to_string(),
            catalog: serde_json::from_value(json!([
                {"type": "network", "endpoints": [
                    {"interface": "internal", "region": "region-1", "url": "http://internal"},
                    {"interface": "public", "region": "region-2", "url": "https://other"},
                    {"interface": "public", "region": "region-1", "url": "https://vpc.example.com/"}
                ]}
            ]))
            .unwrap(),
        };

        let url = c.collection_url(&token, "region-1", &SUBNETS).unwrap();
        assert_eq!(url, "https://vpc.example.com/v2.0/subnets");

        let err = c.endpoint(&token, Service::Compute, "region-1").unwrap_err();
        assert!(matches!(err, ApiError::EndpointNotFound { .. }));
    }

    #[test]
    fn endpoint_override_wins() {
        let mut config = Config::default();
        config
            .endpoints
            .insert("network".to_string(), "http://localhost:9696".to_string());
        let c = client(config);
        let token = Token {
            value: "t".to_string(),
            project_id: "p-1".to_string(),
            catalog: Vec::new(),
        };
        assert_eq!(
            c.collection_url(&token, "region-1", &SUBNETS).unwrap(),
            "http://localhost:9696/v2.0/subnets"
        );
    }

    #[test]
    fn envelopes_and_pagination_links() {
        let wrapped = RestClient::envelope(&SUBNETS, json!({"name": "subnet_1"}));
        assert_eq!(wrapped, json!({"subnet": {"name": "subnet_1"}}));
        assert_eq!(
            RestClient::unwrap(&SUBNETS, wrapped),
            json!({"name": "subnet_1"})
        );

        let page = json!({
            "subnets": [],
            "subnets_links": [{"rel": "next", "href": "https://vpc.example.com/v2.0/subnets?marker=x"}]
        });
        assert_eq!(
            RestClient::next_link(&SUBNETS, &page).as_deref(),
            Some("https://vpc.example.com/v2.0/subnets?marker=x")
        );
        assert_eq!(RestClient::next_link(&SUBNETS, &json!({"subnets": []})), None);
    }
}
