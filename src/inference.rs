use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::InferenceConfig;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{task} error (HTTP {status}): {body}")]
    Status {
        task: &'static str,
        status: u16,
        body: String,
    },
    #[error("{task} request failed: {source}")]
    Transport {
        task: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{task} returned an unexpected response: {detail}")]
    Decode { task: &'static str, detail: String },
}

/// Hosted model endpoints used by the relay.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError>;

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, InferenceError>;

    fn text_model(&self) -> &str;

    fn speech_model(&self) -> &str;
}

const GENERATION: &str = "Text generation";
const TRANSCRIPTION: &str = "Transcription";

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

/// Text-generation endpoints answer with a list; some deployments return a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    List(Vec<Generated>),
    Single(Generated),
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

pub struct HfInferenceClient {
    client: reqwest::Client,
    config: InferenceConfig,
    api_key: String,
}

impl HfInferenceClient {
    /// Returns `None` when no API key is configured.
    pub fn new(config: InferenceConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), model)
    }

    async fn post(
        &self,
        task: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, InferenceError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|source| InferenceError::Transport { task, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                task,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Inference for HfInferenceClient {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = self.model_url(&self.config.text_model);
        debug!("Sending text generation request: {}", url);

        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.config.max_new_tokens,
                temperature: self.config.temperature,
            },
        };
        let response = self
            .post(GENERATION, self.client.post(&url).json(&body))
            .await?;

        let parsed: GenerationResponse =
            response.json().await.map_err(|e| InferenceError::Decode {
                task: GENERATION,
                detail: e.to_string(),
            })?;

        match parsed {
            GenerationResponse::Single(g) => Ok(g.generated_text),
            GenerationResponse::List(list) => list
                .into_iter()
                .next()
                .map(|g| g.generated_text)
                .ok_or_else(|| InferenceError::Decode {
                    task: GENERATION,
                    detail: "empty result list".to_string(),
                }),
        }
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, InferenceError> {
        let url = self.model_url(&self.config.speech_model);
        debug!("Sending {} bytes for transcription: {}", audio.len(), url);

        let response = self
            .post(TRANSCRIPTION, self.client.post(&url).body(audio))
            .await?;

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| InferenceError::Decode {
                task: TRANSCRIPTION,
                detail: e.to_string(),
            })?;
        Ok(parsed.text)
    }

    fn text_model(&self) -> &str {
        &self.config.text_model
    }

    fn speech_model(&self) -> &str {
        &self.config.speech_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> HfInferenceClient {
        let config = InferenceConfig {
            api_key: Some("hf_test".to_string()),
            base_url: format!("{}/models/", server.url()),
            text_model: "org/text".to_string(),
            speech_model: "org/speech".to_string(),
            max_new_tokens: 200,
            temperature: 0.8,
        };
        HfInferenceClient::new(config).unwrap()
    }

    #[test]
    fn test_no_client_without_api_key() {
        assert!(HfInferenceClient::new(InferenceConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/org/text")
            .match_header("authorization", "Bearer hf_test")
            .match_body(Matcher::Json(json!({
                "inputs": "hum this",
                "parameters": { "max_new_tokens": 200, "temperature": 0.8 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"generated_text": "do re mi"}]"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let text = client.generate("hum this").await.unwrap();

        assert_eq!(text, "do re mi");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_accepts_single_object() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/org/text")
            .with_status(200)
            .with_body(r#"{"generated_text": "fa so la"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.generate("x").await.unwrap(), "fa so la");
    }

    #[tokio::test]
    async fn test_generate_error_status_carries_code_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/org/text")
            .with_status(500)
            .with_body("model overloaded")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.generate("x").await.unwrap_err();

        match &err {
            InferenceError::Status { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("error (HTTP 500)"));
    }

    #[tokio::test]
    async fn test_generate_empty_list_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/org/text")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.generate("x").await,
            Err(InferenceError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_transcribe_posts_raw_audio() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/org/speech")
            .match_header("authorization", "Bearer hf_test")
            .match_body(vec![1u8, 2, 3, 4])
            .with_status(200)
            .with_body(r#"{"text": " hmm hmm "}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let text = client.transcribe(vec![1, 2, 3, 4]).await.unwrap();

        assert_eq!(text, " hmm hmm ");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transcribe_without_text_field_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/org/speech")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.transcribe(vec![0]).await.unwrap(), "");
    }
}
