//! AIプロバイダー抽象
//!
//! 各ベンダーのアダプターは固定の能力契約 `AiProvider` を実装し、
//! 設定のルーティングテーブルによって選択される。実行時の型検査で
//! 分岐することはない。

pub mod claude;
pub mod deepseek;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProvidersConfig;
use crate::error::{ConfigError, ProviderError};

/// 対応プロバイダーの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Anthropic Claude (Messages API)
    Claude,
    /// DeepSeek (OpenAI互換 chat completions)
    DeepSeek,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Claude => "claude",
            Self::DeepSeek => "deepseek",
        };
        write!(f, "{s}")
    }
}

/// ルーティング対象のタスク種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// 記事本文の生成
    Generation,
    /// 監査不合格項目の修正
    Correction,
    /// キーワード戦略の立案
    Strategy,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Generation => "generation",
            Self::Correction => "correction",
            Self::Strategy => "strategy",
        };
        write!(f, "{s}")
    }
}

/// プロバイダーとモデルの組
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub provider: ProviderId,
    pub model: String,
}

impl ProviderSpec {
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// 生成プロンプト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// システム指示
    pub system: String,
    /// ユーザー本文
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// 1回の生成呼び出しのパラメータ
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// 最大出力トークン数
    pub max_tokens: u32,
    /// 温度パラメータ（0.0-2.0）
    pub temperature: f32,
    /// 呼び出し元タスクのヒント（台帳記録用）
    pub task_hint: TaskKind,
}

impl GenerationParams {
    pub fn new(task_hint: TaskKind) -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
            task_hint,
        }
    }

    /// 最大トークン数を設定
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// 温度を設定
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// プロバイダー呼び出しの成功結果
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// 生成されたテキスト
    pub content: String,
    /// 入力トークン数
    pub tokens_in: u64,
    /// 出力トークン数
    pub tokens_out: u64,
    /// この呼び出しのコスト (USD)
    pub cost_usd: f64,
}

/// AIプロバイダーの共通インターフェース
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// プロバイダー識別子
    fn id(&self) -> ProviderId;

    /// 使用中のモデル名
    fn model(&self) -> &str;

    /// テキスト生成を1回実行する
    ///
    /// タイムアウト・ネットワーク・非成功ステータスはすべて
    /// `ProviderError` に分類して返す。内部でのリトライはしない。
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError>;
}

/// モデル別の100万トークンあたり価格 (input, output) USD
pub fn model_pricing(provider: ProviderId, model: &str) -> (f64, f64) {
    match provider {
        ProviderId::Claude => {
            if model.contains("haiku") {
                (1.00, 5.00)
            } else if model.contains("opus") {
                (5.00, 25.00)
            } else {
                (3.00, 15.00)
            }
        }
        ProviderId::DeepSeek => (0.28, 0.42),
    }
}

/// トークン使用量から呼び出しコストを求める（小数6桁に丸め）
pub fn compute_cost(provider: ProviderId, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    let (input_price, output_price) = model_pricing(provider, model);
    let cost = (tokens_in as f64 / 1_000_000.0) * input_price
        + (tokens_out as f64 / 1_000_000.0) * output_price;
    (cost * 1_000_000.0).round() / 1_000_000.0
}

/// プロバイダーファクトリー
pub fn build_provider(
    spec: &ProviderSpec,
    providers: &ProvidersConfig,
) -> Result<Arc<dyn AiProvider>, ConfigError> {
    let settings = providers
        .get(spec.provider)
        .ok_or(ConfigError::MissingProvider(spec.provider))?;

    match spec.provider {
        ProviderId::Claude => Ok(Arc::new(claude::ClaudeProvider::new(&spec.model, settings)?)),
        ProviderId::DeepSeek => Ok(Arc::new(deepseek::DeepSeekProvider::new(
            &spec.model,
            settings,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepseek_cost_per_million_tokens() {
        // 1Mトークン入出力で $0.28 + $0.42
        let cost = compute_cost(ProviderId::DeepSeek, "deepseek-chat", 1_000_000, 1_000_000);
        assert!((cost - 0.70).abs() < 0.01);
    }

    #[test]
    fn test_claude_pricing_by_model_family() {
        assert_eq!(
            model_pricing(ProviderId::Claude, "claude-3-haiku-20240307"),
            (1.00, 5.00)
        );
        assert_eq!(
            model_pricing(ProviderId::Claude, "claude-3-5-sonnet-20241022"),
            (3.00, 15.00)
        );
        assert_eq!(
            model_pricing(ProviderId::Claude, "claude-3-opus-20240229"),
            (5.00, 25.00)
        );
        // 未知モデルは sonnet 相当の価格で概算する
        assert_eq!(
            model_pricing(ProviderId::Claude, "claude-next"),
            (3.00, 15.00)
        );
    }

    #[test]
    fn test_cost_rounds_to_six_decimals() {
        let cost = compute_cost(ProviderId::Claude, "claude-3-haiku-20240307", 1234, 567);
        assert_eq!(cost, 0.004069);
    }

    #[test]
    fn test_spec_display() {
        let spec = ProviderSpec::new(ProviderId::DeepSeek, "deepseek-chat");
        assert_eq!(spec.to_string(), "deepseek/deepseek-chat");
        assert_eq!(TaskKind::Correction.to_string(), "correction");
    }
}
