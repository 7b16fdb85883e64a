//! Anthropic Claude プロバイダー実装

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;
use crate::error::{ConfigError, ProviderError};
use crate::providers::{
    compute_cost, AiProvider, GenerationParams, Prompt, ProviderId, ProviderReply,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude (Messages API) プロバイダー
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl ClaudeProvider {
    /// 新しいClaudeプロバイダーを作成
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
                provider: ProviderId::Claude,
                timeout_secs: self.timeout_secs,
            }
        } else {
            ProviderError::Transport {
                provider: ProviderId::Claude,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl AiProvider for ClaudeProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system: (!prompt.system.is_empty()).then_some(prompt.system.as_str()),
            messages: vec![WireMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                provider: ProviderId::Claude,
            });
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport {
                provider: ProviderId::Claude,
                message: format!("Claude API error: {} - {}", status, error_text),
            });
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: ProviderId::Claude,
                    message: e.to_string(),
                })?;

        let content = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: ProviderId::Claude,
                message: "empty completion".to_string(),
            });
        }

        let cost_usd = compute_cost(
            ProviderId::Claude,
            &self.model,
            parsed.usage.input_tokens,
            parsed.usage.output_tokens,
        );
        tracing::debug!(
            model = %self.model,
            tokens_in = parsed.usage.input_tokens,
            tokens_out = parsed.usage.output_tokens,
            cost_usd,
            "claude completion finished"
        );

        Ok(ProviderReply {
            content,
            tokens_in: parsed.usage.input_tokens,
            tokens_out: parsed.usage.output_tokens,
            cost_usd,
        })
    }
}
