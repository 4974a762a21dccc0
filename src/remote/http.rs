//! HTTP Remote Adapter
//!
//! Talks to a REST backend exposing one resource per collection:
//!
//! | call        | route                                   |
//! |-------------|-----------------------------------------|
//! | `fetch_all` | `GET    {base}/api/{collection}`        |
//! | `create`    | `POST   {base}/api/{collection}`        |
//! | `update`    | `PATCH  {base}/api/{collection}/{id}`   |
//! | `delete`    | `DELETE {base}/api/{collection}/{id}`   |
//!
//! Every request carries `Authorization: Bearer <token>` from the shared
//! credential slot. Response records go through the normalizer.
//!
//! Creates are replayed at least once, so a `409 Conflict` on `create` is
//! confirmed with a `PATCH` of the same id. A `404` on `delete` counts as done.

use super::{Credentials, RemoteAdapter};
use crate::config::Config;
use crate::schema::normalize;
use crate::shared::entity::{Entity, EntityType};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value};
use std::time::Duration;

/// REST backend client
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    credentials: Credentials,
    timeout: Duration,
}

impl HttpRemote {
    /// Client for the backend at `base_url`
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::network(format!("invalid server URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::network(format!("invalid server URL {}", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            credentials,
            timeout,
        })
    }

    /// Client configured from the application config
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        Self::new(config.server_url(), config.credentials(), config.app().request_timeout())
    }

    /// Credential slot used for every request
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn url(&self, entity_type: EntityType, id: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::network(format!("invalid server URL {}", self.base_url)))?;
            segments.pop_if_empty().push("api").push(entity_type.collection());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, sent: &Value) -> Result<Response, RemoteError> {
        let response = self.dispatch(request).await?;
        ensure_success(response, sent).await
    }

    /// Attach credentials and send; any HTTP status is returned as-is
    async fn dispatch(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| RemoteError::auth("Not authenticated"))?;

        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Confirm a create the backend already holds
    ///
    /// A replayed POST answered with 409 is applied as a PATCH of the same
    /// record. If the record cannot be patched the 409 stands as a rejection.
    async fn create_existing(
        &self,
        entity_type: EntityType,
        entity: &Entity,
        conflict_body: &str,
        payload: &Value,
    ) -> Result<Entity, RemoteError> {
        tracing::debug!("[Remote] {} '{}' already exists, patching", entity_type, entity.id);
        let mut fields = payload.as_object().cloned().unwrap_or_default();
        fields.remove("id");
        match self.update(entity_type, &entity.id, &fields).await {
            Err(RemoteError::Validation { .. }) => Err(classify(StatusCode::CONFLICT, conflict_body, payload)),
            other => other,
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            RemoteError::network(format!("Network error: {}", error))
        }
    }
}

#[async_trait]
impl RemoteAdapter for HttpRemote {
    async fn fetch_all(&self, entity_type: EntityType) -> Result<Vec<Entity>, RemoteError> {
        let url = self.url(entity_type, None)?;
        tracing::debug!("[Remote] GET {}", url);
        let response = self.send(self.client.get(url), &Value::Null).await?;
        let body: Value = read_json(response).await?;

        let records = match body {
            Value::Array(records) => records,
            Value::Object(mut envelope) => match envelope
                .remove("data")
                .or_else(|| envelope.remove("records"))
                .or_else(|| envelope.remove(entity_type.collection()))
            {
                Some(Value::Array(records)) => records,
                _ => return Err(RemoteError::network("malformed collection response")),
            },
            _ => return Err(RemoteError::network("malformed collection response")),
        };

        let mut entities = Vec::with_capacity(records.len());
        for record in &records {
            match normalize(entity_type, record) {
                Ok(entity) => entities.push(entity),
                Err(e) => tracing::warn!("[Remote] skipping {} record: {}", entity_type, e),
            }
        }
        Ok(entities)
    }

    async fn create(&self, entity_type: EntityType, entity: &Entity) -> Result<Entity, RemoteError> {
        let url = self.url(entity_type, None)?;
        let payload = entity.to_remote_record();
        tracing::debug!("[Remote] POST {} ({})", url, entity.id);
        let response = self.dispatch(self.client.post(url).json(&payload)).await?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return self.create_existing(entity_type, entity, &body, &payload).await;
        }
        let response = ensure_success(response, &payload).await?;
        match read_optional_json(response).await? {
            Some(record) => normalize(entity_type, &record)
                .map_err(|e| RemoteError::network(format!("malformed create response: {}", e))),
            None => Ok(entity.clone()),
        }
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        partial: &Map<String, Value>,
    ) -> Result<Entity, RemoteError> {
        let url = self.url(entity_type, Some(id))?;
        let payload = Value::Object(partial.clone());
        tracing::debug!("[Remote] PATCH {}", url);
        let response = self.send(self.client.patch(url).json(&payload), &payload).await?;
        let record = match read_optional_json(response).await? {
            Some(record) => record,
            None => {
                let mut echoed = partial.clone();
                echoed.insert("id".to_string(), Value::String(id.to_string()));
                Value::Object(echoed)
            }
        };
        normalize(entity_type, &record)
            .map_err(|e| RemoteError::network(format!("malformed update response: {}", e)))
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        let url = self.url(entity_type, Some(id))?;
        tracing::debug!("[Remote] DELETE {}", url);
        let response = self.dispatch(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("[Remote] {} '{}' already gone", entity_type, id);
            return Ok(());
        }
        ensure_success(response, &Value::Null).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response, sent: &Value) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, &body, sent))
}

/// Map a non-success status to the remote error taxonomy
fn classify(status: StatusCode, body: &str, sent: &Value) -> RemoteError {
    let detail = error_detail(body).unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
    let message = format!("{} {}", status.as_u16(), detail).trim_end().to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteError::network(message),
        s if s.is_server_error() => RemoteError::network(message),
        _ => RemoteError::validation(message, sent.clone()),
    }
}

/// `message` or `error` field of a JSON error body, or the raw body
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(Value::String(text)) = object.get(key) {
                return Some(text.clone());
            }
        }
    }
    Some(body.to_string())
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::network(format!("Failed to parse response: {}", e)))
}

async fn read_optional_json(response: Response) -> Result<Option<Value>, RemoteError> {
    let text = response
        .text()
        .await
        .map_err(|e| RemoteError::network(format!("Failed to read response: {}", e)))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| RemoteError::network(format!("Failed to parse response: {}", e)))
}
