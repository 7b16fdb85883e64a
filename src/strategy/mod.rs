//! キーワード戦略プランナー
//!
//! AI にクラスター化したキーワード計画を JSON で出させ、スキーマ検証に
//! 通ったバッチだけを単一ストア操作で永続化する。検証に落ちたバッチは
//! 一行も保存しない。マネーページが未登録のクライアントには戦略を
//! 立てない(リンク先がない計画は無意味なため)。

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::EngineConfig;
use crate::error::StrategyError;
use crate::prompt::PromptBuilder;
use crate::providers::{GenerationParams, TaskKind};
use crate::router::AiRouter;
use crate::store::{MemoryStore, SeoKeyword, TopicCluster};

/// 戦略レスポンスのスキーマ
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StrategyProposal {
    #[validate(length(min = 1, message = "at least one cluster is required"), nested)]
    pub clusters: Vec<ClusterProposal>,

    #[serde(default)]
    pub suggested_calendar: Option<String>,
}

/// クラスター提案
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterProposal {
    #[validate(length(min = 1, message = "cluster name must not be empty"))]
    pub name: String,

    #[validate(length(min = 1, message = "pillar keyword must not be empty"))]
    pub pillar_keyword: String,

    #[serde(default)]
    pub pillar_title: Option<String>,

    #[validate(length(min = 1, message = "a cluster needs at least one keyword"), nested)]
    pub keywords: Vec<KeywordProposal>,
}

/// キーワード提案
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KeywordProposal {
    #[validate(length(min = 1, message = "keyword must not be empty"))]
    pub keyword: String,

    #[serde(default)]
    pub intent: Option<String>,

    #[serde(default)]
    pub difficulty: Option<String>,

    #[serde(default)]
    pub volume: Option<String>,

    #[serde(default)]
    pub suggested_title: Option<String>,

    #[serde(default = "default_priority")]
    #[validate(range(min = 1, max = 5))]
    pub priority: u8,
}

fn default_priority() -> u8 {
    3
}

/// 永続化済みバッチの結果
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub cluster_ids: Vec<Uuid>,
    pub keyword_ids: Vec<Uuid>,
    pub suggested_calendar: Option<String>,
}

/// レスポンス本文から提案をパースする
///
/// コードフェンスを剥がして JSON として読み、失敗したら本文中の
/// 最初の `{` から最後の `}` までを抜き出して再試行する。
pub fn parse_proposal(raw: &str) -> Result<StrategyProposal, StrategyError> {
    let cleaned = strip_fences(raw);
    match serde_json::from_str(&cleaned) {
        Ok(proposal) => Ok(proposal),
        Err(first) => {
            let block_re = Regex::new(r"(?s)\{.*\}").unwrap();
            let Some(block) = block_re.find(&cleaned) else {
                return Err(StrategyError::MalformedResponse(format!(
                    "no JSON object in response: {first}"
                )));
            };
            serde_json::from_str(block.as_str()).map_err(|e| {
                StrategyError::MalformedResponse(format!("invalid strategy JSON: {e}"))
            })
        }
    }
}

/// スキーマ検証とバッチ内キーワード一意性の確認
pub fn validate_proposal(proposal: &StrategyProposal) -> Result<(), StrategyError> {
    proposal
        .validate()
        .map_err(|e| StrategyError::MalformedResponse(e.to_string()))?;

    let mut seen: HashSet<String> = HashSet::new();
    for cluster in &proposal.clusters {
        for keyword in &cluster.keywords {
            if !seen.insert(keyword.keyword.to_lowercase()) {
                return Err(StrategyError::MalformedResponse(format!(
                    "duplicate keyword in batch: {}",
                    keyword.keyword
                )));
            }
        }
    }
    Ok(())
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// 戦略プランナー
#[derive(Debug)]
pub struct KeywordStrategyPlanner {
    store: Arc<MemoryStore>,
    router: Arc<AiRouter>,
    prompts: PromptBuilder,
    max_tokens: u32,
    temperature: f32,
}

impl KeywordStrategyPlanner {
    pub fn new(store: Arc<MemoryStore>, router: Arc<AiRouter>, config: &EngineConfig) -> Self {
        Self {
            store,
            router,
            prompts: PromptBuilder::new(&config.pipeline),
            max_tokens: config.pipeline.max_tokens,
            temperature: config.pipeline.temperature,
        }
    }

    /// クライアントのキーワード戦略を立てて永続化する
    pub async fn plan(
        &self,
        client_id: Uuid,
        num_keywords: usize,
    ) -> Result<StrategyOutcome, StrategyError> {
        let client = self
            .store
            .client(client_id)
            .ok_or(StrategyError::ClientNotFound(client_id))?;
        let money_pages = self.store.money_pages_for(client_id);
        if money_pages.is_empty() {
            return Err(StrategyError::NoMoneyPages);
        }
        let existing: Vec<String> = self
            .store
            .keywords_for(client_id)
            .into_iter()
            .map(|k| k.keyword)
            .collect();

        let prompt = self
            .prompts
            .strategy(&client, &money_pages, &existing, num_keywords);
        let params = GenerationParams::new(TaskKind::Strategy)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let reply = self
            .router
            .generate(
                TaskKind::Strategy,
                client.plan,
                client_id,
                None,
                &prompt,
                &params,
            )
            .await?;

        let proposal = parse_proposal(&reply.content)?;
        validate_proposal(&proposal)?;

        let mut clusters = Vec::with_capacity(proposal.clusters.len());
        let mut keywords = Vec::new();
        for cluster_proposal in &proposal.clusters {
            let mut cluster = TopicCluster::new(
                client_id,
                &cluster_proposal.name,
                &cluster_proposal.pillar_keyword,
            );
            cluster.pillar_title = cluster_proposal.pillar_title.clone();
            cluster.keywords_total = cluster_proposal.keywords.len() as u32;

            for keyword_proposal in &cluster_proposal.keywords {
                let mut keyword = SeoKeyword::new(client_id, &keyword_proposal.keyword)
                    .with_cluster(cluster.id)
                    .with_priority(keyword_proposal.priority);
                if let Some(intent) = &keyword_proposal.intent {
                    keyword = keyword.with_intent(intent);
                }
                if let Some(title) = &keyword_proposal.suggested_title {
                    keyword = keyword.with_suggested_title(title);
                }
                keywords.push(keyword);
            }
            clusters.push(cluster);
        }

        let (cluster_ids, keyword_ids) = self.store.insert_strategy_batch(clusters, keywords);
        tracing::info!(
            %client_id,
            clusters = cluster_ids.len(),
            keywords = keyword_ids.len(),
            "strategy batch persisted"
        );
        Ok(StrategyOutcome {
            cluster_ids,
            keyword_ids,
            suggested_calendar: proposal.suggested_calendar,
        })
    }
}
