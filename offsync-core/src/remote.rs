//! Remote REST service the engine synchronizes with.
//!
//! ## Contract
//!
//! - `POST   /api/{entity_type}`            create
//! - `PUT    /api/{entity_type}/{id}`       replace by id
//! - `DELETE /api/{entity_type}/{id}`       remove by id
//! - `GET    /api/{entity_type}?since={ts}` incremental pull
//!
//! Every request carries `Authorization: Bearer <token>` once a token is set.
//! A non-2xx response body becomes the failure message.

use std::future::Future;
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::RemoteError;

/// Operations the sync executor needs from the remote side.
pub trait RemoteService: Send + Sync {
    fn create(
        &self,
        entity_type: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn update(
        &self,
        entity_type: &str,
        id: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn delete(&self, entity_type: &str, id: &str)
        -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Fetches entities changed after `since`, or all of them when `None`.
    fn fetch_since(
        &self,
        entity_type: &str,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<Value>, RemoteError>> + Send;

    /// Replaces the credential used for subsequent calls.
    fn set_auth_token(&self, _token: Option<String>) {}
}

/// Pull responses come either as a bare array or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PullResponse {
    Bare(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

impl PullResponse {
    fn into_entities(self) -> Vec<Value> {
        match self {
            PullResponse::Bare(entities) | PullResponse::Wrapped { data: entities } => entities,
        }
    }
}

/// reqwest-backed implementation of [`RemoteService`].
#[derive(Debug)]
pub struct HttpRemote {
    client: reqwest::Client,
    server_url: String,
    token: RwLock<Option<String>>,
}

impl HttpRemote {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
            token: RwLock::new(None),
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_auth_token(Some(token.into()));
        self
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Builds `{server}/api/{entity_type}[/{id}]` with escaped path segments.
    fn collection_url(&self, entity_type: &str, id: Option<&str>) -> String {
        let base_url = if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        let mut url = format!(
            "{}/api/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(entity_type)
        );
        if let Some(id) = id {
            url.push('/');
            url.push_str(&urlencoding::encode(id));
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::status(status.as_u16(), body));
        }

        Ok(response)
    }
}

impl RemoteService for HttpRemote {
    async fn create(&self, entity_type: &str, payload: &Value) -> Result<(), RemoteError> {
        let url = self.collection_url(entity_type, None);
        self.send(self.client.post(&url).json(payload)).await?;
        Ok(())
    }

    async fn update(&self, entity_type: &str, id: &str, payload: &Value) -> Result<(), RemoteError> {
        let url = self.collection_url(entity_type, Some(id));
        self.send(self.client.put(&url).json(payload)).await?;
        Ok(())
    }

    async fn delete(&self, entity_type: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.collection_url(entity_type, Some(id));
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn fetch_since(
        &self,
        entity_type: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut request = self.client.get(self.collection_url(entity_type, None));
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        let response = self.send(request).await?;
        let body: PullResponse = response.json().await?;
        Ok(body.into_entities())
    }

    fn set_auth_token(&self, token: Option<String>) {
        let mut guard = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }
}
