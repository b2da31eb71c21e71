//! Google Gemini 프로바이더 (generateContent)
//!
//! Gemini에는 system 역할이 없으므로 system 메시지를 첫 user 메시지 앞에 붙이고,
//! assistant 역할은 `model`로 바꿔 보냅니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatRole, CompletionProvider};

/// source: https://ai.google.dev/api/generate-content
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize, PartialEq)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// 메시지 → Gemini contents 변환
fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    let mut contents: Vec<Content> = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                ChatRole::System => return None,
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            Some(Content {
                role,
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
        })
        .collect();

    let system = messages.iter().find(|m| m.role == ChatRole::System);
    if let (Some(system), Some(first)) = (system, contents.first_mut()) {
        if let Some(part) = first.parts.first_mut() {
            part.text = format!("{}\n\n{}", system.content, part.text);
        }
    }

    contents
}

/// Gemini 프로바이더
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Gemini API key not configured (set GEMINI_API_KEY)"))
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, messages: &[ChatMessage], model_id: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, model_id);
        let request = serde_json::json!({ "contents": to_contents(messages) });

        tracing::info!("Calling Gemini model {}", model_id);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send Gemini request")?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text)
    }

    async fn check_model(&self, _model_id: &str) -> Result<()> {
        self.api_key().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_folded_into_first_user() {
        let contents = to_contents(&[
            ChatMessage::system("You are a tutor."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("What is a prime?"),
        ]);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[0].parts[0].text, "You are a tutor.\n\nHi");
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].parts[0].text, "What is a prime?");
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let provider = GeminiProvider::new(Some(String::new()), Duration::from_secs(5)).unwrap();
        assert!(provider.check_model("gemini-pro").await.is_err());
        assert!(provider
            .complete(&[ChatMessage::user("hi")], "gemini-pro")
            .await
            .is_err());
    }
}
