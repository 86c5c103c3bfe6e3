//! Smart-home adapter contract and the Home Assistant REST client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use skald_plugin::PluginError;

use crate::types::Entity;

/// Operations the skill needs from a smart-home backend.
#[async_trait]
pub trait SmartHomeAdapter: Send + Sync {
    /// Entities whose id starts with `domain_prefix` (e.g. `"light."`).
    async fn list_entities(&self, domain_prefix: &str) -> Result<Vec<Entity>, PluginError>;

    /// Current state of one entity; `None` when it does not exist.
    async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>, PluginError>;

    /// Call `domain.service` with `args`. Failures are logged, not raised.
    async fn invoke_service(&self, domain: &str, service: &str, args: Value) -> bool;
}

/// Home Assistant REST API client authenticated with a long-lived token.
pub struct HomeAssistantClient {
    base_url: url::Url,
    access_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HomeAssistantClient {
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self, PluginError> {
        let access_token = access_token.into();
        if base_url.trim().is_empty() || access_token.trim().is_empty() {
            return Err(PluginError::ConfigurationMissing(
                "base_url and access_token".into(),
            ));
        }
        let mut base_url = url::Url::parse(base_url.trim())
            .map_err(|e| PluginError::ConfigurationMissing(format!("invalid base_url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            access_token,
            client: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, PluginError> {
        self.base_url
            .join(path)
            .map_err(|e| PluginError::AdapterUnavailable(format!("bad endpoint '{path}': {e}")))
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, PluginError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PluginError::AdapterUnavailable(format!("GET {path}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PluginError::AdapterUnavailable(format!("GET {path} returned {status}")));
        }
        let body = response
            .json()
            .await
            .map_err(|e| {
                PluginError::AdapterUnavailable(format!("GET {path}: invalid body: {e}"))
            })?;
        Ok(Some(body))
    }
}

#[async_trait]
impl SmartHomeAdapter for HomeAssistantClient {
    async fn list_entities(&self, domain_prefix: &str) -> Result<Vec<Entity>, PluginError> {
        let body = self
            .get_json("api/states")
            .await?
            .ok_or_else(|| PluginError::AdapterUnavailable("api/states not found".into()))?;
        let entities: Vec<Entity> = serde_json::from_value(body).map_err(|e| {
            PluginError::AdapterUnavailable(format!("unexpected states payload: {e}"))
        })?;
        let matching: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| entity.entity_id.starts_with(domain_prefix))
            .collect();
        debug!(prefix = %domain_prefix, count = matching.len(), "listed entities");
        Ok(matching)
    }

    async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>, PluginError> {
        let Some(body) = self.get_json(&format!("api/states/{entity_id}")).await? else {
            return Ok(None);
        };
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| PluginError::AdapterUnavailable(format!("unexpected state payload: {e}")))
    }

    async fn invoke_service(&self, domain: &str, service: &str, args: Value) -> bool {
        let path = format!("api/services/{domain}/{service}");
        let url = match self.endpoint(&path) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "service call skipped");
                return false;
            }
        };
        match self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&args)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(domain, service, "service called");
                true
            }
            Ok(response) => {
                warn!(domain, service, status = %response.status(), "service call rejected");
                false
            }
            Err(e) => {
                warn!(domain, service, error = %e, "service call failed");
                false
            }
        }
    }
}
