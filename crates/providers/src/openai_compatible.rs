use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::sse::decode_stream;
use crate::traits::*;
use crate::wire::to_wire_messages;

/// Streaming client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAICompatibleProvider {
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    /// * `api_key` - Bearer token, if the endpoint needs one
    /// * `model` - Model name sent with every request
    /// * `connect_timeout` - Ceiling on connection setup; streaming itself is
    ///   bounded by the caller
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        connect_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatibleProvider {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": to_wire_messages(&request.system_prompt, &request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }

        let mut http = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key);
        }

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "Requesting completion stream"
        );
        let response = http
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("{}: {}", status, text)));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()));
        Ok(decode_stream(Box::pin(bytes)))
    }

    fn name(&self) -> &str {
        "OpenAI Compatible"
    }
}
