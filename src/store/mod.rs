//! ドメインレコードとインメモリストア
//!
//! 外部永続化レイヤーの代わりとなるコンテンツストア。コラボレータは
//! ここを通じてクライアントとマネーページを登録し、エンジンは生成結果を
//! 永続化する。

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditRecord;

/// クライアントの契約プラン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Agency,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Agency => "agency",
        };
        write!(f, "{s}")
    }
}

/// テナント（クライアント）レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub site_url: String,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: impl Into<String>, site_url: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            site_url: site_url.into(),
            plan,
            created_at: Utc::now(),
        }
    }
}

/// 収益ページ（リンク誘導先）レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyPage {
    pub id: Uuid,
    pub client_id: Uuid,
    pub url: String,
    pub title: String,
    pub category: Option<String>,
    /// アンカーテキスト候補（優先順）
    pub anchor_texts: Vec<String>,
    /// 1-5、高いほど優先
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

impl MoneyPage {
    pub fn new(
        client_id: Uuid,
        url: impl Into<String>,
        title: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            url: url.into(),
            title: title.into(),
            category: None,
            anchor_texts: Vec::new(),
            priority: priority.clamp(1, 5),
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_anchors(mut self, anchors: Vec<String>) -> Self {
        self.anchor_texts = anchors;
        self
    }
}

/// トピッククラスター（キーワード群）レコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCluster {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub pillar_keyword: String,
    pub pillar_title: Option<String>,
    pub keywords_total: u32,
    pub keywords_used: u32,
    pub created_at: DateTime<Utc>,
}

impl TopicCluster {
    pub fn new(
        client_id: Uuid,
        name: impl Into<String>,
        pillar_keyword: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            name: name.into(),
            pillar_keyword: pillar_keyword.into(),
            pillar_title: None,
            keywords_total: 0,
            keywords_used: 0,
            created_at: Utc::now(),
        }
    }
}

/// キーワードの生成状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordStatus {
    Pending,
    Generating,
    Used,
    Failed,
}

impl fmt::Display for KeywordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Used => "used",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// SEOキーワードレコード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoKeyword {
    pub id: Uuid,
    pub client_id: Uuid,
    pub cluster_id: Option<Uuid>,
    pub keyword: String,
    pub secondary_keywords: Vec<String>,
    pub intent: Option<String>,
    /// 1-5、高いほど優先
    pub priority: u8,
    pub suggested_title: Option<String>,
    pub status: KeywordStatus,
    /// ストア採番の単調シーケンス。バッチ選択のタイブレークに使う
    pub created_seq: u64,
    pub created_at: DateTime<Utc>,
}

impl SeoKeyword {
    pub fn new(client_id: Uuid, keyword: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            cluster_id: None,
            keyword: keyword.into(),
            secondary_keywords: Vec::new(),
            intent: None,
            priority: 3,
            suggested_title: None,
            status: KeywordStatus::Pending,
            created_seq: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_cluster(mut self, cluster_id: Uuid) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    pub fn with_secondary(mut self, secondary: Vec<String>) -> Self {
        self.secondary_keywords = secondary;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_suggested_title(mut self, title: impl Into<String>) -> Self {
        self.suggested_title = Some(title.into());
        self
    }
}

/// 記事の公開状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    InReview,
    Failed,
    Approved,
    Published,
    Unpublished,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Failed => "failed",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Unpublished => "unpublished",
        };
        write!(f, "{s}")
    }
}

/// 生成記事レコード。削除されず、非公開化のみ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub client_id: Uuid,
    pub keyword_id: Option<Uuid>,
    pub title: String,
    /// クライアント内で一意。衝突時はストアが `-2`, `-3` を付与
    pub slug: String,
    pub content: String,
    pub meta_description: String,
    pub excerpt: String,
    pub status: PostStatus,
    pub seo_score: u8,
    pub attempt_count: u8,
    /// この記事の生成に成功したプロバイダ呼び出しの合計コスト (USD)
    pub cost_accumulated: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogPost {
    pub fn new(client_id: Uuid, keyword_id: Option<Uuid>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            client_id,
            keyword_id,
            title: title.into(),
            slug: String::new(),
            content: String::new(),
            meta_description: String::new(),
            excerpt: String::new(),
            status: PostStatus::Draft,
            seo_score: 0,
            attempt_count: 0,
            cost_accumulated: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    clients: HashMap<Uuid, Client>,
    /// 登録順を保持（リンク注入のタイブレークに使う）
    money_pages: Vec<MoneyPage>,
    clusters: HashMap<Uuid, TopicCluster>,
    keywords: Vec<SeoKeyword>,
    posts: Vec<BlogPost>,
    audits: Vec<AuditRecord>,
    next_seq: u64,
}

/// インメモリのコンテンツストア
///
/// 同期 `RwLock` を使う。ロックガードの `Drop` から同期的に呼ばれるため
/// async ロックは使えない。毒化したロックは回復して継続する。
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- クライアント ---

    pub fn register_client(&self, client: Client) -> Client {
        let mut inner = self.write_inner();
        inner.clients.insert(client.id, client.clone());
        client
    }

    pub fn client(&self, id: Uuid) -> Option<Client> {
        self.read_inner().clients.get(&id).cloned()
    }

    // --- マネーページ ---

    pub fn register_money_page(&self, page: MoneyPage) -> MoneyPage {
        let mut inner = self.write_inner();
        inner.money_pages.push(page.clone());
        page
    }

    /// クライアントのマネーページを登録順で返す
    pub fn money_pages_for(&self, client_id: Uuid) -> Vec<MoneyPage> {
        self.read_inner()
            .money_pages
            .iter()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect()
    }

    // --- クラスター ---

    pub fn insert_cluster(&self, cluster: TopicCluster) -> TopicCluster {
        let mut inner = self.write_inner();
        inner.clusters.insert(cluster.id, cluster.clone());
        cluster
    }

    pub fn cluster(&self, id: Uuid) -> Option<TopicCluster> {
        self.read_inner().clusters.get(&id).cloned()
    }

    pub fn clusters_for(&self, client_id: Uuid) -> Vec<TopicCluster> {
        let mut list: Vec<TopicCluster> = self
            .read_inner()
            .clusters
            .values()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.created_at);
        list
    }

    /// クラスターの消化カウンタを進める
    pub fn increment_cluster_usage(&self, cluster_id: Uuid) -> bool {
        let mut inner = self.write_inner();
        match inner.clusters.get_mut(&cluster_id) {
            Some(cluster) => {
                cluster.keywords_used = cluster.keywords_used.saturating_add(1);
                true
            }
            None => false,
        }
    }

    // --- キーワード ---

    /// キーワードを登録し、`created_seq` を採番して返す
    pub fn insert_keyword(&self, mut keyword: SeoKeyword) -> SeoKeyword {
        let mut inner = self.write_inner();
        inner.next_seq += 1;
        keyword.created_seq = inner.next_seq;
        inner.keywords.push(keyword.clone());
        keyword
    }

    pub fn keyword(&self, id: Uuid) -> Option<SeoKeyword> {
        self.read_inner()
            .keywords
            .iter()
            .find(|k| k.id == id)
            .cloned()
    }

    pub fn keywords_for(&self, client_id: Uuid) -> Vec<SeoKeyword> {
        self.read_inner()
            .keywords
            .iter()
            .filter(|k| k.client_id == client_id)
            .cloned()
            .collect()
    }

    /// 保留中キーワードを優先度降順、採番順で最大 `limit` 件返す
    pub fn pending_keywords(&self, client_id: Uuid, limit: usize) -> Vec<SeoKeyword> {
        let mut list: Vec<SeoKeyword> = self
            .read_inner()
            .keywords
            .iter()
            .filter(|k| k.client_id == client_id && k.status == KeywordStatus::Pending)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_seq.cmp(&b.created_seq))
        });
        list.truncate(limit);
        list
    }

    /// 全クライアント横断の保留キュー。並び順は `pending_keywords` と同じ
    pub fn pending_queue(&self, limit: usize) -> Vec<SeoKeyword> {
        let mut list: Vec<SeoKeyword> = self
            .read_inner()
            .keywords
            .iter()
            .filter(|k| k.status == KeywordStatus::Pending)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_seq.cmp(&b.created_seq))
        });
        list.truncate(limit);
        list
    }

    pub fn set_keyword_status(&self, id: Uuid, status: KeywordStatus) -> bool {
        let mut inner = self.write_inner();
        match inner.keywords.iter_mut().find(|k| k.id == id) {
            Some(keyword) => {
                keyword.status = status;
                true
            }
            None => false,
        }
    }

    /// 現在の状態が `from` のときだけ `to` に遷移させる
    pub fn update_keyword_status_if(&self, id: Uuid, from: KeywordStatus, to: KeywordStatus) -> bool {
        let mut inner = self.write_inner();
        match inner
            .keywords
            .iter_mut()
            .find(|k| k.id == id && k.status == from)
        {
            Some(keyword) => {
                keyword.status = to;
                true
            }
            None => false,
        }
    }

    /// 戦略バッチの一括登録。クラスターとキーワードを単一ロック下で
    /// 挿入するため、部分的な永続化は起こらない
    pub fn insert_strategy_batch(
        &self,
        clusters: Vec<TopicCluster>,
        keywords: Vec<SeoKeyword>,
    ) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut inner = self.write_inner();
        let cluster_ids: Vec<Uuid> = clusters.iter().map(|c| c.id).collect();
        let mut keyword_ids = Vec::with_capacity(keywords.len());
        for cluster in clusters {
            inner.clusters.insert(cluster.id, cluster);
        }
        for mut keyword in keywords {
            inner.next_seq += 1;
            keyword.created_seq = inner.next_seq;
            keyword_ids.push(keyword.id);
            inner.keywords.push(keyword);
        }
        (cluster_ids, keyword_ids)
    }

    // --- 記事 ---

    /// 記事を登録する。スラッグはクライアント内で一意化される
    pub fn insert_post(&self, mut post: BlogPost) -> BlogPost {
        let mut inner = self.write_inner();
        post.slug = dedupe_slug(&inner.posts, post.client_id, &post.slug);
        inner.posts.push(post.clone());
        post
    }

    pub fn post(&self, id: Uuid) -> Option<BlogPost> {
        self.read_inner().posts.iter().find(|p| p.id == id).cloned()
    }

    pub fn posts_for(&self, client_id: Uuid) -> Vec<BlogPost> {
        self.read_inner()
            .posts
            .iter()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect()
    }

    /// 公開済み記事を新しい順に最大 `limit` 件返す（内部リンク候補用）
    pub fn published_posts(&self, client_id: Uuid, limit: usize) -> Vec<BlogPost> {
        self.read_inner()
            .posts
            .iter()
            .rev()
            .filter(|p| p.client_id == client_id && p.status == PostStatus::Published)
            .take(limit)
            .cloned()
            .collect()
    }

    /// 記事を更新する。`updated_at` はストアが進める
    pub fn update_post<F>(&self, id: Uuid, f: F) -> Option<BlogPost>
    where
        F: FnOnce(&mut BlogPost),
    {
        let mut inner = self.write_inner();
        match inner.posts.iter_mut().find(|p| p.id == id) {
            Some(post) => {
                f(post);
                post.updated_at = Utc::now();
                Some(post.clone())
            }
            None => None,
        }
    }

    // --- 監査履歴 ---

    pub fn append_audit(&self, record: AuditRecord) {
        let mut inner = self.write_inner();
        inner.audits.push(record);
    }

    /// 記事の監査履歴を記録順で返す
    pub fn audit_history(&self, post_id: Uuid) -> Vec<AuditRecord> {
        self.read_inner()
            .audits
            .iter()
            .filter(|a| a.post_id == post_id)
            .cloned()
            .collect()
    }

    pub fn latest_audit(&self, post_id: Uuid) -> Option<AuditRecord> {
        self.read_inner()
            .audits
            .iter()
            .rev()
            .find(|a| a.post_id == post_id)
            .cloned()
    }
}

/// 衝突しないスラッグを求める。`base`, `base-2`, `base-3`, … の順で試す
fn dedupe_slug(posts: &[BlogPost], client_id: Uuid, base: &str) -> String {
    let taken = |candidate: &str| {
        posts
            .iter()
            .any(|p| p.client_id == client_id && p.slug == candidate)
    };
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
