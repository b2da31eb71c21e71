//! Ollama 로컬 모델 프로바이더
//!
//! source: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CompletionProvider};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: GenerationOptions,
}

/// 생성 옵션 (고정값)
#[derive(Debug, Serialize)]
struct GenerationOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Ollama 프로바이더
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, messages: &[ChatMessage], model_id: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: model_id,
            messages,
            stream: false,
            options: GenerationOptions::default(),
        };

        tracing::info!("Calling Ollama model {}", model_id);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama request failed ({}): {}", status, text);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat.message.content)
    }

    async fn check_model(&self, model_id: &str) -> Result<()> {
        let url = format!("{}/api/show", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": model_id }))
            .send()
            .await
            .context("Ollama server is not reachable")?;

        if !response.status().is_success() {
            anyhow::bail!("Model {} is not pulled (run `ollama pull {}`)", model_id, model_id);
        }

        Ok(())
    }
}
