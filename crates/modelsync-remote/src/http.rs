use std::time::Duration;

use futures::FutureExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::server::{JsonResult, Server, ServerFuture};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Whole-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self { timeout_secs: None, user_agent: concat!("modelsync/", env!("CARGO_PKG_VERSION")).to_string() }
    }
}

/// [`Server`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpServer {
    client: Client,
}

impl HttpServer {
    /// # Errors
    /// [`RemoteError::Transport`] when the HTTP client cannot be built.
    pub fn new() -> Result<Self, RemoteError> {
        Self::with_config(&HttpServerConfig::default())
    }

    /// # Errors
    /// [`RemoteError::Transport`] when the HTTP client cannot be built.
    pub fn with_config(config: &HttpServerConfig) -> Result<Self, RemoteError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self { client: builder.build()? })
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn execute(request: RequestBuilder) -> ServerFuture {
        async move {
            let resp = request.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                tracing::debug!("Remote error response: {} ({} bytes)", status, body.len());
                return Err(RemoteError::Status { status: status.as_u16(), body });
            }
            Ok(JsonResult::new(body))
        }
        .boxed()
    }
}

/// Append `params` to `url`, joining with `&` when it already has a query.
#[must_use]
pub fn url_with_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, value);
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", query.finish())
}

impl Server for HttpServer {
    fn get(&self, url: &str, params: &[(String, String)]) -> ServerFuture {
        Self::execute(self.client.get(url_with_query(url, params)))
    }

    fn post(&self, url: &str, body: Value) -> ServerFuture {
        Self::execute(self.client.post(url).json(&body))
    }

    fn put(&self, url: &str, body: Value) -> ServerFuture {
        Self::execute(self.client.put(url).json(&body))
    }

    fn delete(&self, url: &str) -> ServerFuture {
        Self::execute(self.client.delete(url))
    }
}
