use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use parley_core::config::{LlmConfig, LlmProvider};

use crate::llm::{base_url, build_http_client, send_with_retries, LlmError};

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn model(&self) -> &str;
    async fn embed(&self, input: &str) -> Result<Vec<f32>, LlmError>;
}

/// OpenAI-compatible `/v1/embeddings` client. Anthropic serves no embeddings endpoint, so every
/// call fails with a configuration error and retrieval falls back to SQL rows.
pub struct HttpEmbeddingClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl HttpEmbeddingClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http_client(config.timeout_secs)?,
            provider: config.provider,
            base_url: base_url(config),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        if self.provider == LlmProvider::Anthropic {
            return Err(LlmError::Configuration(
                "anthropic provider has no embeddings endpoint".to_string(),
            ));
        }

        let body = EmbeddingRequest { model: &self.model, input };
        let payload = send_with_retries(
            || {
                let request =
                    self.http.post(format!("{}/v1/embeddings", self.base_url)).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key.expose_secret()),
                    None => request,
                }
            },
            self.max_retries,
        )
        .await?;

        embedding_from_payload(&payload)
    }
}

fn embedding_from_payload(payload: &Value) -> Result<Vec<f32>, LlmError> {
    let values = payload
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::Decode("missing data[0].embedding".to_string()))?;

    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| LlmError::Decode("non-numeric embedding component".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use parley_core::config::{AppConfig, LlmProvider};
    use serde_json::json;

    use super::{embedding_from_payload, EmbeddingClient, HttpEmbeddingClient};
    use crate::llm::LlmError;

    #[test]
    fn payload_decodes_first_vector() {
        let payload = json!({ "data": [{ "embedding": [0.5, -1.0, 0.25] }] });
        assert_eq!(embedding_from_payload(&payload).expect("vector"), vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn non_numeric_component_is_rejected() {
        let payload = json!({ "data": [{ "embedding": [0.5, "x"] }] });
        assert!(matches!(embedding_from_payload(&payload), Err(LlmError::Decode(_))));
    }

    #[tokio::test]
    async fn anthropic_provider_refuses_without_network() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Anthropic;
        let client = HttpEmbeddingClient::from_config(&config).expect("client");

        let error = client.embed("kargo").await.expect_err("no embeddings endpoint");
        assert!(matches!(error, LlmError::Configuration(_)));
    }
}
