//! コンテンツエンジン
//!
//! 生成 → 監査 → 修正ループ → リンク注入 → 最終監査のパイプラインを
//! 1キーワード1ランとして実行する。ランはストアに途中結果を書かない。
//! 永続化は最終監査の後に一括で行うため、途中で打ち切られたランが
//! 部分的な記事や監査履歴を残すことはない。複数ランはワーカープール
//! 上限の下で並行実行される。

pub mod locks;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditReport, Draft, SeoAuditor};
use crate::config::{EngineConfig, LinkConfig, PipelineConfig};
use crate::error::{ConfigError, EngineError};
use crate::ledger::CostLedger;
use crate::links::{InjectionOutcome, InternalCandidate, LinkInjector};
use crate::prompt::draft::DraftParts;
use crate::prompt::PromptBuilder;
use crate::providers::{GenerationParams, TaskKind};
use crate::router::AiRouter;
use crate::store::{
    BlogPost, Client, KeywordStatus, MemoryStore, MoneyPage, PostStatus, SeoKeyword,
};

use self::locks::KeywordLocks;

/// パイプライン実行の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Pending,
    Generating,
    Auditing,
    Correcting,
    Ready,
    LinkInjected,
    InReview,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Generating => "generating",
            PipelineStage::Auditing => "auditing",
            PipelineStage::Correcting => "correcting",
            PipelineStage::Ready => "ready",
            PipelineStage::LinkInjected => "link_injected",
            PipelineStage::InReview => "in_review",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 1ランの結果
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub post_id: Uuid,
    pub keyword_id: Uuid,
    pub final_score: u8,
    pub attempt_count: u8,
    pub status: PostStatus,
    pub cost_usd: f64,
    pub injection: InjectionOutcome,
}

/// コンテンツエンジン
#[derive(Debug)]
pub struct ContentEngine {
    store: Arc<MemoryStore>,
    router: Arc<AiRouter>,
    ledger: CostLedger,
    auditor: SeoAuditor,
    prompts: PromptBuilder,
    injector: LinkInjector,
    pipeline: PipelineConfig,
    links: LinkConfig,
    locks: Arc<KeywordLocks>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ContentEngine {
    /// 設定から全部品を組み立てる
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.check_routing()?;
        let ledger = CostLedger::in_memory();
        let router = Arc::new(AiRouter::new(config, ledger.clone())?);
        Ok(Self::new(
            Arc::new(MemoryStore::new()),
            router,
            ledger,
            config,
        ))
    }

    /// 組み立て済みの部品からエンジンを構築する
    pub fn new(
        store: Arc<MemoryStore>,
        router: Arc<AiRouter>,
        ledger: CostLedger,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            router,
            ledger,
            auditor: SeoAuditor::new(),
            prompts: PromptBuilder::new(&config.pipeline),
            injector: LinkInjector::new(&config.links),
            pipeline: config.pipeline.clone(),
            links: config.links.clone(),
            locks: Arc::new(KeywordLocks::new()),
            workers: Arc::new(Semaphore::new(config.pipeline.worker_pool.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// 記録の読み出し窓口
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// 協調シャットダウン。実行中のランは次の段階境界で止まる
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// 登録済みキーワード1件の記事を生成する
    pub async fn generate_for_keyword(
        &self,
        keyword_id: Uuid,
    ) -> Result<PipelineOutcome, EngineError> {
        let keyword = self
            .store
            .keyword(keyword_id)
            .ok_or(EngineError::KeywordNotFound(keyword_id))?;
        let client = self
            .store
            .client(keyword.client_id)
            .ok_or(EngineError::ClientNotFound(keyword.client_id))?;
        let money_pages = self.store.money_pages_for(client.id);
        if money_pages.is_empty() {
            return Err(EngineError::NoMoneyPages);
        }
        let published = self
            .store
            .published_posts(client.id, self.pipeline.internal_link_candidates);

        let _guard = self.locks.acquire(keyword_id, Arc::clone(&self.store))?;
        self.run_pipeline(&client, &keyword, &money_pages, &published)
            .await
    }

    /// アドホックなキーワードを登録して即時生成する
    pub async fn generate_direct(
        &self,
        client_id: Uuid,
        keyword_text: &str,
        secondary_keywords: Vec<String>,
    ) -> Result<PipelineOutcome, EngineError> {
        if self.store.client(client_id).is_none() {
            return Err(EngineError::ClientNotFound(client_id));
        }
        let keyword = self.store.insert_keyword(
            SeoKeyword::new(client_id, keyword_text).with_secondary(secondary_keywords),
        );
        self.generate_for_keyword(keyword.id).await
    }

    /// 保留キューの上位 `n` 件を並行生成する
    ///
    /// 各キーワードは独立したランとして実行され、1件の失敗が他を
    /// 止めることはない。
    pub async fn generate_batch(
        &self,
        n: usize,
    ) -> Vec<(Uuid, Result<PipelineOutcome, EngineError>)> {
        let pending = self.store.pending_queue(n);
        tracing::info!(selected = pending.len(), "starting batch generation");
        stream::iter(pending)
            .map(|keyword| {
                let workers = Arc::clone(&self.workers);
                async move {
                    let result = match workers.acquire_owned().await {
                        Ok(_permit) => self.generate_for_keyword(keyword.id).await,
                        Err(_) => Err(EngineError::Cancelled),
                    };
                    (keyword.id, result)
                }
            })
            .buffer_unordered(self.pipeline.worker_pool.max(1))
            .collect()
            .await
    }

    /// 再生成なしで再監査し、履歴に追記してスコアを更新する
    pub fn audit_post(&self, post_id: Uuid) -> Result<AuditReport, EngineError> {
        let post = self
            .store
            .post(post_id)
            .ok_or(EngineError::PostNotFound(post_id))?;
        let (keyword_text, secondary) =
            match post.keyword_id.and_then(|id| self.store.keyword(id)) {
                Some(keyword) => (keyword.keyword, keyword.secondary_keywords),
                None => (post.title.clone(), Vec::new()),
            };
        let draft = Draft::new(
            &post.title,
            &post.meta_description,
            &post.slug,
            &post.content,
            keyword_text,
        )
        .with_secondary(secondary);
        let report = self.auditor.audit(&draft);
        self.store
            .append_audit(AuditRecord::new(post.id, report.clone()));
        self.store.update_post(post.id, |p| p.seo_score = report.score);
        Ok(report)
    }

    /// 公開ゲート。条件をすべて満たすときだけ `published` へ進める
    pub fn publish(&self, post_id: Uuid) -> Result<BlogPost, EngineError> {
        let post = self
            .store
            .post(post_id)
            .ok_or(EngineError::PostNotFound(post_id))?;

        let mut reasons = Vec::new();
        match self.store.latest_audit(post_id) {
            Some(record) => {
                let report = &record.report;
                if report.score < self.pipeline.min_score {
                    reasons.push(format!(
                        "score {} is below the minimum {}",
                        report.score, self.pipeline.min_score
                    ));
                }
                if report.stats.money_links < self.links.min_money_links {
                    reasons.push(format!(
                        "{} money links present, {} required",
                        report.stats.money_links, self.links.min_money_links
                    ));
                }
                if report.stats.internal_links < self.links.min_internal_links {
                    reasons.push(format!(
                        "{} internal links present, {} required",
                        report.stats.internal_links, self.links.min_internal_links
                    ));
                }
            }
            None => reasons.push("no audit on record".to_string()),
        }
        if !matches!(
            post.status,
            PostStatus::InReview | PostStatus::Approved | PostStatus::Unpublished
        ) {
            reasons.push(format!("status {} is not publishable", post.status));
        }
        if !reasons.is_empty() {
            return Err(EngineError::PublishRejected { reasons });
        }

        self.store
            .update_post(post_id, |p| p.status = PostStatus::Published)
            .ok_or(EngineError::PostNotFound(post_id))
    }

    /// 公開済み記事を取り下げる。記事は削除しない
    pub fn unpublish(&self, post_id: Uuid) -> Result<BlogPost, EngineError> {
        let post = self
            .store
            .post(post_id)
            .ok_or(EngineError::PostNotFound(post_id))?;
        if post.status != PostStatus::Published {
            return Err(EngineError::InvalidTransition(format!(
                "cannot unpublish a {} post",
                post.status
            )));
        }
        self.store
            .update_post(post_id, |p| p.status = PostStatus::Unpublished)
            .ok_or(EngineError::PostNotFound(post_id))
    }

    async fn run_pipeline(
        &self,
        client: &Client,
        keyword: &SeoKeyword,
        money_pages: &[MoneyPage],
        published: &[BlogPost],
    ) -> Result<PipelineOutcome, EngineError> {
        let mut stage = PipelineStage::Pending;
        self.advance(&mut stage, PipelineStage::Generating, keyword.id);
        self.check_cancelled()?;

        let prompt = self
            .prompts
            .generation(keyword, client, money_pages, published);
        let params = GenerationParams::new(TaskKind::Generation)
            .with_max_tokens(self.pipeline.max_tokens)
            .with_temperature(self.pipeline.temperature);
        let reply = match self
            .router
            .generate(
                TaskKind::Generation,
                client.plan,
                client.id,
                None,
                &prompt,
                &params,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.store
                    .set_keyword_status(keyword.id, KeywordStatus::Failed);
                self.advance(&mut stage, PipelineStage::Failed, keyword.id);
                return Err(EngineError::GenerationUnavailable(e));
            }
        };
        let mut run_cost = reply.cost_usd;
        let mut parts = DraftParts::parse(&reply.content, &keyword.keyword);
        let mut draft = parts.to_draft(&keyword.keyword, &keyword.secondary_keywords);

        self.advance(&mut stage, PipelineStage::Auditing, keyword.id);
        self.check_cancelled()?;
        let mut report = self.auditor.audit(&draft);

        let mut attempt_count: u8 = 0;
        while report.score < self.pipeline.min_score
            && attempt_count < self.pipeline.max_correction_attempts
        {
            self.advance(&mut stage, PipelineStage::Correcting, keyword.id);
            self.check_cancelled()?;
            attempt_count += 1;

            let correction = self.prompts.correction(&draft, &report);
            let correction_params = GenerationParams::new(TaskKind::Correction)
                .with_max_tokens(self.pipeline.max_tokens)
                .with_temperature(self.pipeline.temperature);
            match self
                .router
                .generate(
                    TaskKind::Correction,
                    client.plan,
                    client.id,
                    None,
                    &correction,
                    &correction_params,
                )
                .await
            {
                Ok(corrected) => {
                    run_cost += corrected.cost_usd;
                    parts = DraftParts::parse_correction(&corrected.content, &parts);
                    draft = parts.to_draft(&keyword.keyword, &keyword.secondary_keywords);
                }
                Err(e) => {
                    tracing::warn!(
                        keyword_id = %keyword.id,
                        attempt = attempt_count,
                        error = %e,
                        "correction call failed, keeping previous draft"
                    );
                }
            }

            self.advance(&mut stage, PipelineStage::Auditing, keyword.id);
            report = self.auditor.audit(&draft);
        }

        if report.score >= self.pipeline.min_score {
            self.advance(&mut stage, PipelineStage::Ready, keyword.id);
        }
        self.check_cancelled()?;

        let candidates = self.internal_candidates(published);
        let (final_html, injection) = self.injector.inject(
            &draft.html,
            &keyword.keyword,
            money_pages,
            &candidates,
            keyword.cluster_id,
        );
        draft.html = final_html;
        self.advance(&mut stage, PipelineStage::LinkInjected, keyword.id);

        let final_report = self.auditor.audit(&draft);
        let approved = final_report.score >= self.pipeline.min_score;

        let mut post = BlogPost::new(client.id, Some(keyword.id), &parts.title);
        post.slug = parts.slug.clone();
        post.content = draft.html.clone();
        post.meta_description = parts.meta_description.clone();
        post.excerpt = parts.excerpt.clone();
        post.status = if approved {
            PostStatus::InReview
        } else {
            PostStatus::Failed
        };
        post.seo_score = final_report.score;
        post.attempt_count = attempt_count;
        post.cost_accumulated = round_usd(run_cost);
        let post = self.store.insert_post(post);
        self.store
            .append_audit(AuditRecord::new(post.id, final_report.clone()));

        if approved {
            self.store
                .set_keyword_status(keyword.id, KeywordStatus::Used);
            if let Some(cluster_id) = keyword.cluster_id {
                self.store.increment_cluster_usage(cluster_id);
            }
            self.advance(&mut stage, PipelineStage::InReview, keyword.id);
        } else {
            self.store
                .set_keyword_status(keyword.id, KeywordStatus::Failed);
            self.advance(&mut stage, PipelineStage::Failed, keyword.id);
        }

        tracing::info!(
            keyword_id = %keyword.id,
            post_id = %post.id,
            score = final_report.score,
            attempts = attempt_count,
            cost_usd = post.cost_accumulated,
            status = %post.status,
            "pipeline run finished"
        );

        Ok(PipelineOutcome {
            post_id: post.id,
            keyword_id: keyword.id,
            final_score: final_report.score,
            attempt_count,
            status: post.status,
            cost_usd: post.cost_accumulated,
            injection,
        })
    }

    fn internal_candidates(&self, published: &[BlogPost]) -> Vec<InternalCandidate> {
        published
            .iter()
            .map(|post| {
                let mut candidate = InternalCandidate::new(&post.title, &post.slug);
                if let Some(keyword) = post.keyword_id.and_then(|id| self.store.keyword(id)) {
                    candidate = candidate.with_keyword(&keyword.keyword);
                    if let Some(cluster_id) = keyword.cluster_id {
                        candidate = candidate.with_cluster(cluster_id);
                    }
                }
                candidate
            })
            .collect()
    }

    fn advance(&self, stage: &mut PipelineStage, next: PipelineStage, keyword_id: Uuid) {
        tracing::debug!(%keyword_id, from = %stage, to = %next, "pipeline stage");
        *stage = next;
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

fn round_usd(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Client, PlanTier};

    fn sync_engine() -> ContentEngine {
        let config = EngineConfig::default();
        let ledger = CostLedger::in_memory();
        let router = Arc::new(AiRouter::with_adapters(
            config.routing.clone(),
            vec![],
            ledger.clone(),
        ));
        ContentEngine::new(Arc::new(MemoryStore::new()), router, ledger, &config)
    }

    fn weak_post(engine: &ContentEngine, status: PostStatus) -> BlogPost {
        let client = engine.store().register_client(Client::new(
            "Cliente",
            "https://cliente.mx",
            PlanTier::Free,
        ));
        let mut post = BlogPost::new(client.id, None, "Un título");
        post.slug = "un-titulo".to_string();
        post.content = "<p>Texto corto sin enlaces.</p>".to_string();
        post.meta_description = "Meta breve.".to_string();
        post.status = status;
        engine.store().insert_post(post)
    }

    #[test]
    fn test_publish_rejects_with_reasons() {
        let engine = sync_engine();
        let post = weak_post(&engine, PostStatus::InReview);
        engine.audit_post(post.id).unwrap();

        let err = engine.publish(post.id).unwrap_err();
        match err {
            EngineError::PublishRejected { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("score")));
                assert!(reasons.iter().any(|r| r.contains("money links")));
                assert!(reasons.iter().any(|r| r.contains("internal links")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_publish_requires_an_audit_record() {
        let engine = sync_engine();
        let post = weak_post(&engine, PostStatus::InReview);
        let err = engine.publish(post.id).unwrap_err();
        match err {
            EngineError::PublishRejected { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("no audit")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unpublish_requires_published_status() {
        let engine = sync_engine();
        let post = weak_post(&engine, PostStatus::InReview);
        let err = engine.unpublish(post.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[test]
    fn test_audit_post_appends_history_and_refreshes_score() {
        let engine = sync_engine();
        let post = weak_post(&engine, PostStatus::Draft);
        let first = engine.audit_post(post.id).unwrap();
        let second = engine.audit_post(post.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.store().audit_history(post.id).len(), 2);
        assert_eq!(
            engine.store().post(post.id).unwrap().seo_score,
            second.score
        );
    }

    #[test]
    fn test_stage_names_are_snake_case() {
        assert_eq!(PipelineStage::LinkInjected.to_string(), "link_injected");
        assert_eq!(PipelineStage::InReview.to_string(), "in_review");
    }
}
