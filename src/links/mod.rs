//! リンク注入
//!
//! 監査が数えるリンク区分(マネーリンク = 絶対 http(s)、内部リンク =
//! サイト内パス)と同じ分類で既存リンクを棚卸しし、各区分が最低本数に
//! 届くまで決定的に補充する。AI は介在しない。既存リンクの削除や
//! 書き換えは行わず、同一 URL の重複挿入もしない。

use std::collections::HashSet;

use uuid::Uuid;

use crate::config::LinkConfig;
use crate::html::{is_absolute_http, is_internal_href, HtmlAnalyzer};
use crate::store::MoneyPage;

/// HTML 中の既存リンクの棚卸し
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkInventory {
    pub money_urls: HashSet<String>,
    pub internal_urls: HashSet<String>,
}

impl LinkInventory {
    /// HTML を走査して区分別の URL 集合を作る
    pub fn scan(html: &str) -> Self {
        Self::scan_with(&HtmlAnalyzer::new(), html)
    }

    pub(crate) fn scan_with(analyzer: &HtmlAnalyzer, html: &str) -> Self {
        let mut inventory = Self::default();
        for anchor in analyzer.anchors(html) {
            if is_absolute_http(&anchor.href) {
                inventory.money_urls.insert(anchor.href);
            } else if is_internal_href(&anchor.href) {
                inventory.internal_urls.insert(anchor.href);
            }
        }
        inventory
    }

    pub fn money_count(&self) -> usize {
        self.money_urls.len()
    }

    pub fn internal_count(&self) -> usize {
        self.internal_urls.len()
    }
}

/// 内部リンク候補
///
/// 公開済み記事から作る。keyword と cluster_id は関連度順位付けに使う。
#[derive(Debug, Clone)]
pub struct InternalCandidate {
    pub title: String,
    pub slug: String,
    pub keyword: Option<String>,
    pub cluster_id: Option<Uuid>,
}

impl InternalCandidate {
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            keyword: None,
            cluster_id: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_cluster(mut self, cluster_id: Uuid) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }
}

/// 注入結果(区分別に追加した URL)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionOutcome {
    pub money_added: Vec<String>,
    pub internal_added: Vec<String>,
}

impl InjectionOutcome {
    pub fn total(&self) -> usize {
        self.money_added.len() + self.internal_added.len()
    }
}

/// 決定的リンク注入器
#[derive(Debug, Clone)]
pub struct LinkInjector {
    config: LinkConfig,
    analyzer: HtmlAnalyzer,
}

impl LinkInjector {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            config: config.clone(),
            analyzer: HtmlAnalyzer::new(),
        }
    }

    /// 各区分を最低本数まで補充した HTML と追加内容を返す
    ///
    /// マネーページは優先度降順(同点は登録順)、内部候補は同一クラスタ
    /// 優先のうえキーワードの単語重なり降順。挿入位置はキーワード初出
    /// 段落の直後、なければ最終段落の直前、それもなければ末尾。
    pub fn inject(
        &self,
        html: &str,
        keyword: &str,
        money_pages: &[MoneyPage],
        candidates: &[InternalCandidate],
        cluster_id: Option<Uuid>,
    ) -> (String, InjectionOutcome) {
        let inventory = LinkInventory::scan_with(&self.analyzer, html);
        let mut present: HashSet<String> = inventory
            .money_urls
            .union(&inventory.internal_urls)
            .cloned()
            .collect();
        let mut outcome = InjectionOutcome::default();
        let mut out = html.to_string();

        let money_slots = top_up(
            inventory.money_count(),
            self.config.min_money_links,
            self.config.max_money_links,
        );
        if money_slots > 0 {
            let mut ordered: Vec<&MoneyPage> = money_pages
                .iter()
                .filter(|page| is_absolute_http(&page.url))
                .collect();
            ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

            let mut block = Vec::new();
            for page in ordered {
                if block.len() >= money_slots {
                    break;
                }
                if present.contains(&page.url) {
                    continue;
                }
                let anchor = page
                    .anchor_texts
                    .first()
                    .map(String::as_str)
                    .unwrap_or(&page.title);
                block.push(format!(
                    "<p><a href=\"{}\" title=\"{}\">{}</a></p>",
                    page.url, page.title, anchor
                ));
                present.insert(page.url.clone());
                outcome.money_added.push(page.url.clone());
            }
            if !block.is_empty() {
                out = self.insert_block(&out, keyword, &block.join("\n"));
            }
        }

        let internal_slots = top_up(
            inventory.internal_count(),
            self.config.min_internal_links,
            self.config.max_internal_links,
        );
        if internal_slots > 0 {
            let mut block = Vec::new();
            for candidate in rank_candidates(candidates, keyword, cluster_id) {
                if block.len() >= internal_slots {
                    break;
                }
                let href = format!("/blog/{}", candidate.slug);
                if present.contains(&href) {
                    continue;
                }
                block.push(format!(
                    "<p><a href=\"{}\" title=\"{}\">{}</a></p>",
                    href, candidate.title, candidate.title
                ));
                present.insert(href.clone());
                outcome.internal_added.push(href);
            }
            if !block.is_empty() {
                out = self.insert_block(&out, keyword, &block.join("\n"));
            }
        }

        (out, outcome)
    }

    fn insert_block(&self, html: &str, keyword: &str, block: &str) -> String {
        if let Some(pos) = self.analyzer.paragraph_boundary_after(html, keyword) {
            let mut out = String::with_capacity(html.len() + block.len() + 1);
            out.push_str(&html[..pos]);
            out.push('\n');
            out.push_str(block);
            out.push_str(&html[pos..]);
            out
        } else if let Some(pos) = self.analyzer.last_paragraph_start(html) {
            format!("{}{}\n{}", &html[..pos], block, &html[pos..])
        } else if html.is_empty() {
            block.to_string()
        } else {
            format!("{html}\n{block}")
        }
    }
}

fn top_up(existing: usize, min: usize, max: usize) -> usize {
    min.saturating_sub(existing).min(max.saturating_sub(existing))
}

fn rank_candidates<'a>(
    candidates: &'a [InternalCandidate],
    keyword: &str,
    cluster_id: Option<Uuid>,
) -> Vec<&'a InternalCandidate> {
    let keyword_lower = keyword.to_lowercase();
    let mut scored: Vec<(usize, usize, &InternalCandidate)> = candidates
        .iter()
        .map(|candidate| {
            let shared = match (candidate.cluster_id, cluster_id) {
                (Some(a), Some(b)) if a == b => 1,
                _ => 0,
            };
            let phrase = candidate
                .keyword
                .as_deref()
                .unwrap_or(&candidate.title)
                .to_lowercase();
            let overlap = phrase
                .split_whitespace()
                .filter(|word| word.chars().count() > 3 && keyword_lower.contains(*word))
                .count();
            (shared, overlap, candidate)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    scored.into_iter().map(|(_, _, c)| c).collect()
}
