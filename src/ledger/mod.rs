//! AI使用コスト台帳
//!
//! プロバイダー呼び出し1回につき1レコードを追記する。追記のみで
//! 更新・削除はなく、コスト集計の唯一の情報源となる。台帳書き込みの
//! 失敗はパイプラインを失敗させない（記録して続行）。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::providers::{ProviderId, ProviderReply, ProviderSpec, TaskKind};
use crate::text::truncate_chars;

/// プロンプトプレビューの最大文字数
const PROMPT_PREVIEW_CHARS: usize = 500;

/// AI呼び出し1回分の使用記録
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiUsageRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub post_id: Option<Uuid>,
    pub provider: ProviderId,
    pub model: String,
    pub task: TaskKind,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub success: bool,
    pub error_detail: Option<String>,
    /// プロンプト先頭500文字
    pub prompt_preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AiUsageRecord {
    /// 成功した呼び出しの記録を作る
    pub fn success(
        client_id: Uuid,
        post_id: Option<Uuid>,
        spec: &ProviderSpec,
        task: TaskKind,
        reply: &ProviderReply,
        prompt: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            post_id,
            provider: spec.provider,
            model: spec.model.clone(),
            task,
            tokens_in: reply.tokens_in,
            tokens_out: reply.tokens_out,
            cost_usd: reply.cost_usd,
            success: true,
            error_detail: None,
            prompt_preview: preview(prompt),
            created_at: Utc::now(),
        }
    }

    /// 失敗した呼び出しの記録を作る
    pub fn failure(
        client_id: Uuid,
        post_id: Option<Uuid>,
        spec: &ProviderSpec,
        task: TaskKind,
        error_detail: impl Into<String>,
        prompt: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            post_id,
            provider: spec.provider,
            model: spec.model.clone(),
            task,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            success: false,
            error_detail: Some(error_detail.into()),
            prompt_preview: preview(prompt),
            created_at: Utc::now(),
        }
    }
}

fn preview(prompt: &str) -> Option<String> {
    if prompt.is_empty() {
        None
    } else {
        Some(truncate_chars(prompt, PROMPT_PREVIEW_CHARS).to_string())
    }
}

/// 台帳バックエンドの共通インターフェース
#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// 使用記録を追記する
    async fn append(&self, record: AiUsageRecord) -> Result<(), LedgerError>;

    /// 全記録のスナップショットを返す
    async fn snapshot(&self) -> Result<Vec<AiUsageRecord>, LedgerError>;
}

/// インメモリ台帳バックエンド
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<AiUsageRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(&self, record: AiUsageRecord) -> Result<(), LedgerError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        records.push(record);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<AiUsageRecord>, LedgerError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.clone())
    }
}

/// 集計クエリの条件
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    pub client_id: Option<Uuid>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub provider: Option<ProviderId>,
}

impl LedgerQuery {
    /// 全クライアント横断のクエリ
    pub fn all() -> Self {
        Self::default()
    }

    /// 特定クライアントに絞る
    pub fn for_client(client_id: Uuid) -> Self {
        Self {
            client_id: Some(client_id),
            ..Self::default()
        }
    }

    /// 年月で絞る
    pub fn in_month(mut self, year: i32, month: u32) -> Self {
        self.year = Some(year);
        self.month = Some(month);
        self
    }

    /// プロバイダーで絞る
    pub fn for_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    fn matches(&self, record: &AiUsageRecord) -> bool {
        if let Some(client_id) = self.client_id {
            if record.client_id != client_id {
                return false;
            }
        }
        if let Some(year) = self.year {
            if record.created_at.year() != year {
                return false;
            }
        }
        if let Some(month) = self.month {
            if record.created_at.month() != month {
                return false;
            }
        }
        if let Some(provider) = self.provider {
            if record.provider != provider {
                return false;
            }
        }
        true
    }
}

/// プロバイダー+モデル別の集計行
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCostSummary {
    pub provider: ProviderId,
    pub model: String,
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// 小数4桁に丸めた合計コスト (USD)
    pub cost_usd: f64,
}

/// クエリ結果の集計
///
/// コストとトークンは成功した呼び出しのみを合算する。
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub calls: u64,
    pub failures: u64,
    /// コスト降順のプロバイダー+モデル別内訳
    pub by_provider: Vec<ProviderCostSummary>,
}

/// コスト台帳のファサード
///
/// `record` はベストエフォート。バックエンドの失敗は警告ログに残して
/// 握りつぶし、呼び出し元のパイプラインを失敗させない。
#[derive(Debug, Clone)]
pub struct CostLedger {
    backend: Arc<dyn LedgerStore>,
}

impl CostLedger {
    pub fn new(backend: Arc<dyn LedgerStore>) -> Self {
        Self { backend }
    }

    /// インメモリバックエンドで構築する
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedger::new()))
    }

    /// 使用記録を追記する（ベストエフォート）
    pub async fn record(&self, record: AiUsageRecord) {
        let provider = record.provider;
        let model = record.model.clone();
        let task = record.task;
        let client_id = record.client_id;
        let cost_usd = record.cost_usd;
        match self.backend.append(record).await {
            Ok(()) => {
                tracing::info!(
                    %client_id,
                    %provider,
                    %model,
                    %task,
                    cost_usd,
                    "usage recorded"
                );
            }
            Err(e) => {
                tracing::warn!(
                    %client_id,
                    %provider,
                    error = %e,
                    "ledger write failed, continuing"
                );
            }
        }
    }

    /// 条件に合う記録を集計する
    pub async fn query(&self, query: &LedgerQuery) -> Result<CostSummary, LedgerError> {
        let records = self.backend.snapshot().await?;

        let mut summary = CostSummary {
            cost_usd: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            calls: 0,
            failures: 0,
            by_provider: Vec::new(),
        };
        let mut breakdown: HashMap<(ProviderId, String), ProviderCostSummary> = HashMap::new();

        for record in records.iter().filter(|r| query.matches(r)) {
            if !record.success {
                summary.failures += 1;
                continue;
            }
            summary.calls += 1;
            summary.cost_usd += record.cost_usd;
            summary.tokens_in += record.tokens_in;
            summary.tokens_out += record.tokens_out;

            let entry = breakdown
                .entry((record.provider, record.model.clone()))
                .or_insert_with(|| ProviderCostSummary {
                    provider: record.provider,
                    model: record.model.clone(),
                    calls: 0,
                    tokens_in: 0,
                    tokens_out: 0,
                    cost_usd: 0.0,
                });
            entry.calls += 1;
            entry.tokens_in += record.tokens_in;
            entry.tokens_out += record.tokens_out;
            entry.cost_usd += record.cost_usd;
        }

        let mut by_provider: Vec<ProviderCostSummary> = breakdown.into_values().collect();
        for row in &mut by_provider {
            row.cost_usd = (row.cost_usd * 10_000.0).round() / 10_000.0;
        }
        by_provider.sort_by(|a, b| {
            b.cost_usd
                .partial_cmp(&a.cost_usd)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        summary.by_provider = by_provider;

        Ok(summary)
    }

    /// クライアントの全記録を返す（失敗記録も含む）
    pub async fn records_for_client(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<AiUsageRecord>, LedgerError> {
        let records = self.backend.snapshot().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.client_id == client_id)
            .collect())
    }
}
