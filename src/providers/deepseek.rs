//! DeepSeek プロバイダー実装
//!
//! DeepSeek は OpenAI 互換の chat completions API を公開しているため、
//! base_url と認証ヘッダーだけが異なる。低コストの大量生成向け。

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::{ConfigError, ProviderError};
use crate::providers::{
    compute_cost, AiProvider, GenerationParams, Prompt, ProviderId, ProviderReply,
};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// DeepSeek (OpenAI互換 chat completions) プロバイダー
pub struct DeepSeekProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl DeepSeekProvider {
    /// 新しいDeepSeekプロバイダーを作成
    pub fn new(model: impl Into<String>, settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: ProviderId::DeepSeek,
                timeout_secs: self.timeout_secs,
            }
        } else {
            ProviderError::Transport {
                provider: ProviderId::DeepSeek,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl AiProvider for DeepSeekProvider {
    fn id(&self) -> ProviderId {
        ProviderId::DeepSeek
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: &prompt.system,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: &prompt.user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                provider: ProviderId::DeepSeek,
            });
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport {
                provider: ProviderId::DeepSeek,
                message: format!("DeepSeek API error: {} - {}", status, error_text),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: ProviderId::DeepSeek,
                    message: e.to_string(),
                })?;

        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: ProviderId::DeepSeek,
                message: "empty completion".to_string(),
            });
        }

        let cost_usd = compute_cost(
            ProviderId::DeepSeek,
            &self.model,
            parsed.usage.prompt_tokens,
            parsed.usage.completion_tokens,
        );
        tracing::debug!(
            model = %self.model,
            tokens_in = parsed.usage.prompt_tokens,
            tokens_out = parsed.usage.completion_tokens,
            cost_usd,
            "deepseek completion finished"
        );

        Ok(ProviderReply {
            content,
            tokens_in: parsed.usage.prompt_tokens,
            tokens_out: parsed.usage.completion_tokens,
            cost_usd,
        })
    }
}
