//! Completion Gateway - 캐시 확인 → 선택 모델 → 기본 모델 폴백
//!
//! 이 단계의 유일한 최종 실패 경로는 고정 사과 메시지 + `error = true`입니다.
//! 어떤 경우에도 에러를 올리지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::cache::{cache_key, ResponseCache, DEFAULT_TTL};

use super::{
    find_model, last_user_message, ChatMessage, CompletionProvider, ModelSpec, ProviderKind,
    DEFAULT_MODEL_KEY, MODELS,
};

/// 모든 모델이 실패했을 때 돌려주는 메시지
pub const APOLOGY_MESSAGE: &str =
    "I'm having trouble connecting to my brain right now. Please try again in a moment! 🤖";

/// 완성 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionMetadata {
    /// 실제 응답한 모델 ID (실패 시 "error")
    pub model: String,
    pub provider: Option<String>,
    /// 응답 시간 (초, 캐시 적중 시 0)
    pub response_time: f64,
    pub from_cache: bool,
    pub error: bool,
}

/// 완성 결과
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub text: String,
    pub metadata: CompletionMetadata,
}

/// 모델 상태
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub key: &'static str,
    pub name: &'static str,
    pub model_id: &'static str,
    pub provider: &'static str,
    pub available: bool,
    pub reason: Option<String>,
}

/// 완성 게이트웨이
pub struct CompletionGateway {
    providers: HashMap<ProviderKind, Arc<dyn CompletionProvider>>,
    cache: Arc<dyn ResponseCache>,
    default_model: &'static ModelSpec,
    ttl: Duration,
}

impl CompletionGateway {
    /// 기본 모델 키가 레지스트리에 없으면 `llama3.2`를 씁니다.
    pub fn new(cache: Arc<dyn ResponseCache>, default_model: &str) -> Self {
        let default_model = find_model(default_model)
            .or_else(|| find_model(DEFAULT_MODEL_KEY))
            .unwrap_or(&MODELS[0]);

        Self {
            providers: HashMap::new(),
            cache,
            default_model,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn CompletionProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn default_model(&self) -> &'static ModelSpec {
        self.default_model
    }

    /// 선택 키 → 모델 (모르는 키는 기본 모델)
    pub fn resolve(&self, selected: Option<&str>) -> &'static ModelSpec {
        match selected {
            Some(key) => find_model(key).unwrap_or_else(|| {
                tracing::warn!(
                    "Unknown model '{}', using {}",
                    key,
                    self.default_model.key
                );
                self.default_model
            }),
            None => self.default_model,
        }
    }

    /// 응답 생성
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        grade: u8,
        selected_model: Option<&str>,
    ) -> CompletionOutcome {
        let model = self.resolve(selected_model);
        let key = cache_key(last_user_message(messages), grade, model.key);

        if let Some(text) = self.cache.get(&key).await {
            tracing::info!("Response cache hit for {}", model.key);
            return CompletionOutcome {
                text,
                metadata: CompletionMetadata {
                    model: model.model_id.to_string(),
                    provider: Some(model.provider.as_str().to_string()),
                    response_time: 0.0,
                    from_cache: true,
                    error: false,
                },
            };
        }

        let started = Instant::now();
        let mut answered = self.attempt(model, messages).await.map(|text| (model, text));

        if answered.is_none() && model.key != self.default_model.key {
            tracing::warn!(
                "{} failed, trying {} fallback",
                model.key,
                self.default_model.key
            );
            answered = self
                .attempt(self.default_model, messages)
                .await
                .map(|text| (self.default_model, text));
        }

        let response_time = started.elapsed().as_secs_f64();

        match answered {
            Some((used, text)) => {
                self.cache.set(&key, &text, self.ttl).await;
                CompletionOutcome {
                    text,
                    metadata: CompletionMetadata {
                        model: used.model_id.to_string(),
                        provider: Some(used.provider.as_str().to_string()),
                        response_time,
                        from_cache: false,
                        error: false,
                    },
                }
            }
            None => {
                tracing::warn!("All completion providers failed");
                CompletionOutcome {
                    text: APOLOGY_MESSAGE.to_string(),
                    metadata: CompletionMetadata {
                        model: "error".to_string(),
                        provider: None,
                        response_time,
                        from_cache: false,
                        error: true,
                    },
                }
            }
        }
    }

    /// 한 모델 시도 (빈 응답도 실패로 취급)
    async fn attempt(&self, model: &ModelSpec, messages: &[ChatMessage]) -> Option<String> {
        let result: Result<String> = match self.providers.get(&model.provider) {
            Some(provider) => provider.complete(messages, model.model_id).await,
            None => Err(anyhow::anyhow!(
                "No provider configured for {}",
                model.provider.as_str()
            )),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::warn!("Model {} returned an empty response", model.model_id);
                None
            }
            Err(e) => {
                tracing::warn!("Model {} failed: {:#}", model.model_id, e);
                None
            }
        }
    }

    /// 전체 모델 상태
    pub async fn model_status(&self) -> Vec<ModelStatus> {
        let mut statuses = Vec::with_capacity(MODELS.len());

        for model in MODELS {
            let check = match self.providers.get(&model.provider) {
                Some(provider) => provider.check_model(model.model_id).await,
                None => Err(anyhow::anyhow!("Provider not configured")),
            };

            statuses.push(ModelStatus {
                key: model.key,
                name: model.name,
                model_id: model.model_id,
                provider: model.provider.as_str(),
                available: check.is_ok(),
                reason: check.err().map(|e| format!("{:#}", e)),
            });
        }

        statuses
    }
}

// ============================================================================
// Tests
// ============================================================================
