use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::{Hub, HubError, HubValue, Percent};

/// Home Assistant REST API client.
#[derive(Clone)]
pub struct HomeAssistantHub {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    state: Option<String>,
    #[serde(default)]
    attributes: serde_json::Map<String, Value>,
}

impl From<reqwest::Error> for HubError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            HubError::Decode(e.to_string())
        } else {
            HubError::Transport(e.to_string())
        }
    }
}

impl HomeAssistantHub {
    pub fn new(base_url: impl Into<String>, token: &str, timeout: Duration) -> Result<Self, HubError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| HubError::Credentials(e.to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("ventilation-controller/0.3"),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fetch an entity; `Ok(None)` when the hub does not know it.
    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityState>, HubError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(entity_id, "entity not found on hub");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
                context: entity_id.to_string(),
            });
        }
        Ok(Some(resp.json::<EntityState>().await?))
    }

    async fn call_service(&self, domain: &str, service: &str, body: Value) -> Result<(), HubError> {
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
                context: format!("{domain}.{service}"),
            });
        }
        debug!(domain, service, %body, "service call accepted");
        Ok(())
    }
}

#[async_trait]
impl Hub for HomeAssistantHub {
    async fn get_value(&self, entity_id: &str) -> Result<Option<HubValue>, HubError> {
        Ok(self
            .fetch_state(entity_id)
            .await?
            .and_then(|e| e.state)
            .as_deref()
            .and_then(HubValue::from_state))
    }

    async fn get_attribute(&self, entity_id: &str, attribute: &str) -> Result<Option<Value>, HubError> {
        Ok(self
            .fetch_state(entity_id)
            .await?
            .and_then(|mut e| e.attributes.remove(attribute))
            .filter(|v| !v.is_null()))
    }

    async fn set_fan_speed(&self, entity_id: &str, percentage: Percent) -> Result<(), HubError> {
        self.call_service(
            "fan",
            "set_percentage",
            json!({ "entity_id": entity_id, "percentage": percentage }),
        )
        .await
    }

    async fn set_valve_position(&self, entity_id: &str, position: Percent) -> Result<(), HubError> {
        self.call_service(
            "valve",
            "set_valve_position",
            json!({ "entity_id": entity_id, "position": position }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let hub = HomeAssistantHub::new("http://ha.local:8123/", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(hub.base_url, "http://ha.local:8123");
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let result = HomeAssistantHub::new("http://ha.local", "bad\ntoken", Duration::from_secs(5));
        assert!(matches!(result, Err(HubError::Credentials(_))));
    }
}
