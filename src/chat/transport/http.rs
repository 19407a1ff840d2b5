//! HTTP transport against a Piping Server compatible relay.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::debug;

use crate::chat::error::ChatError;
use crate::chat::transport::{RelayBody, RelayResponse, RelayTransport};

/// Relay reached over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    base_url: String,
}

impl HttpRelay {
    /// Create a relay client for `base_url` (e.g. `https://ppng.io`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ChatError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "Relay URL must be http(s): {}",
                base_url
            )));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ChatError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Full URL for a channel path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn check_status(response: Response) -> Result<Response, ChatError> {
    response
        .error_for_status()
        .map_err(|e| ChatError::Network(format!("Relay answered with failure: {}", e)))
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn post(&self, path: &str, body: RelayBody) -> Result<(), ChatError> {
        let url = self.url(path);
        debug!(%url, bytes = body.len(), "POST");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, body.content_type())
            .body(body.into_bytes())
            .send()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to POST: {}", e)))?;
        let response = check_status(response)?;

        // Piping Server keeps the response open until the receiver has the body.
        response
            .bytes()
            .await
            .map_err(|e| ChatError::Network(format!("Send-body was not completed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<RelayResponse, ChatError> {
        let url = self.url(path);
        debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to GET: {}", e)))?;
        let response = check_status(response)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to read body: {}", e)))?
            .to_vec();
        if body.is_empty() {
            return Err(ChatError::Network("Relay returned an empty body".to_string()));
        }

        debug!(%url, bytes = body.len(), ?content_type, "GET complete");
        Ok(RelayResponse { content_type, body })
    }
}
