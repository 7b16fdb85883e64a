//! AIルーター
//!
//! タスク種別とクライアントプランから主プロバイダを解決し、失敗時は
//! 全タスク共通のフォールバックを一度だけ試す。1回の生成ステップで
//! 外部呼び出しは最大2回。同じプロバイダを二度呼ぶことはない。
//! 成否にかかわらず各試行を1件ずつコスト台帳へ記録する。

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{EngineConfig, RoutingConfig};
use crate::error::{ConfigError, ProviderError, RouterError};
use crate::ledger::{AiUsageRecord, CostLedger};
use crate::providers::{
    build_provider, AiProvider, GenerationParams, Prompt, ProviderId, ProviderReply, ProviderSpec,
    TaskKind,
};
use crate::store::PlanTier;

/// ルーティング済み応答
#[derive(Debug, Clone)]
pub struct RoutedReply {
    pub content: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub provider: ProviderId,
    pub model: String,
    pub fallback_used: bool,
}

impl RoutedReply {
    fn from_reply(reply: ProviderReply, spec: &ProviderSpec, fallback_used: bool) -> Self {
        Self {
            content: reply.content,
            tokens_in: reply.tokens_in,
            tokens_out: reply.tokens_out,
            cost_usd: reply.cost_usd,
            provider: spec.provider,
            model: spec.model.clone(),
            fallback_used,
        }
    }
}

/// タスクルーター
///
/// ルーティング表から到達可能な全スペックのアダプタを構築時に用意する。
/// 表が未設定のプロバイダを参照していれば構築時点で `ConfigError`。
pub struct AiRouter {
    routing: RoutingConfig,
    adapters: HashMap<ProviderSpec, Arc<dyn AiProvider>>,
    ledger: CostLedger,
}

impl std::fmt::Debug for AiRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiRouter")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AiRouter {
    /// 設定からルーターを構築する
    pub fn new(config: &EngineConfig, ledger: CostLedger) -> Result<Self, ConfigError> {
        let mut adapters: HashMap<ProviderSpec, Arc<dyn AiProvider>> = HashMap::new();
        for spec in config.routing.all_specs() {
            if !adapters.contains_key(spec) {
                adapters.insert(spec.clone(), build_provider(spec, &config.providers)?);
            }
        }
        Ok(Self {
            routing: config.routing.clone(),
            adapters,
            ledger,
        })
    }

    /// アダプタを差し替えてルーターを組む
    ///
    /// 表にないスペックのアダプタは無視される。別バックエンドや
    /// スクリプト化したプロバイダを使うテストの入口。
    pub fn with_adapters(
        routing: RoutingConfig,
        adapters: Vec<(ProviderSpec, Arc<dyn AiProvider>)>,
        ledger: CostLedger,
    ) -> Self {
        Self {
            routing,
            adapters: adapters.into_iter().collect(),
            ledger,
        }
    }

    /// タスクとプランから(主, フォールバック)スペックを解決する
    pub fn route(
        &self,
        task: TaskKind,
        plan: PlanTier,
    ) -> Result<(ProviderSpec, ProviderSpec), RouterError> {
        let route = self
            .routing
            .tasks
            .get(&task)
            .ok_or(RouterError::UnknownRoute(task))?;
        let primary = route
            .plan_overrides
            .get(&plan)
            .unwrap_or(&route.default)
            .clone();
        Ok((primary, self.routing.fallback.clone()))
    }

    /// 主プロバイダで生成し、失敗したらフォールバックを一度だけ試す
    pub async fn generate(
        &self,
        task: TaskKind,
        plan: PlanTier,
        client_id: Uuid,
        post_id: Option<Uuid>,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<RoutedReply, RouterError> {
        let (primary, fallback) = self.route(task, plan)?;

        let primary_err = match self
            .attempt(&primary, task, client_id, post_id, prompt, params)
            .await?
        {
            Ok(reply) => {
                tracing::debug!(%task, provider = %primary, "primary provider succeeded");
                return Ok(RoutedReply::from_reply(reply, &primary, false));
            }
            Err(e) => e,
        };
        tracing::warn!(
            %task,
            provider = %primary,
            error = %primary_err,
            "primary provider failed"
        );

        if fallback == primary {
            return Err(RouterError::AllProvidersFailed {
                task,
                detail: format!(
                    "{primary} failed with {}; fallback is the same spec",
                    primary_err.kind()
                ),
            });
        }

        match self
            .attempt(&fallback, task, client_id, post_id, prompt, params)
            .await?
        {
            Ok(reply) => {
                tracing::info!(%task, provider = %fallback, "fallback provider succeeded");
                Ok(RoutedReply::from_reply(reply, &fallback, true))
            }
            Err(fallback_err) => Err(RouterError::AllProvidersFailed {
                task,
                detail: format!(
                    "{primary} failed with {}, {fallback} failed with {}",
                    primary_err.kind(),
                    fallback_err.kind()
                ),
            }),
        }
    }

    /// 1回の試行。成功も失敗も台帳へ記録する
    async fn attempt(
        &self,
        spec: &ProviderSpec,
        task: TaskKind,
        client_id: Uuid,
        post_id: Option<Uuid>,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<Result<ProviderReply, ProviderError>, RouterError> {
        let adapter = self
            .adapters
            .get(spec)
            .ok_or(RouterError::UnknownRoute(task))?;
        let result = adapter.generate(prompt, params).await;
        let record = match &result {
            Ok(reply) => {
                AiUsageRecord::success(client_id, post_id, spec, task, reply, &prompt.user)
            }
            Err(e) => {
                AiUsageRecord::failure(client_id, post_id, spec, task, e.to_string(), &prompt.user)
            }
        };
        self.ledger.record(record).await;
        Ok(result)
    }
}
