//! モデル出力のパース
//!
//! 生成結果の先頭メタデータ行(META_TITLE など)と HTML 本文を分離する。
//! 欠けたフィールドは決定的な既定値で補い、後段が常に完全なドラフトを
//! 受け取れるようにする。修正応答は前回値を既定値として合成するため、
//! 一部フィールドしか返さない応答でも確定済みの値が退行しない。

use crate::audit::Draft;
use crate::html::HtmlAnalyzer;
use crate::text::{slugify, title_case, truncate_chars};

/// META_DESCRIPTION の補完時に切り出す文字数
const META_FALLBACK_CHARS: usize = 155;

/// メタデータ行の生の抽出結果
#[derive(Debug, Default)]
struct RawMeta {
    title: Option<String>,
    meta_description: Option<String>,
    slug: Option<String>,
    excerpt: Option<String>,
}

/// パース済みドラフト
#[derive(Debug, Clone, PartialEq)]
pub struct DraftParts {
    pub title: String,
    pub meta_description: String,
    pub slug: String,
    pub excerpt: String,
    pub html: String,
}

impl DraftParts {
    /// モデル出力をメタデータと HTML に分解する
    ///
    /// メタデータ行は本文中のどこにあっても拾い、HTML からは取り除く。
    /// 同じ行が複数回現れた場合は最後の値が勝つ。
    pub fn parse(raw: &str, keyword: &str) -> Self {
        let (meta, html) = split_metadata(raw);
        let analyzer = HtmlAnalyzer::new();

        let title = meta
            .title
            .or_else(|| analyzer.first_h1(&html))
            .unwrap_or_else(|| title_case(keyword));
        let slug = meta
            .slug
            .map(|s| slugify(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&title));
        let meta_description = meta.meta_description.unwrap_or_else(|| {
            truncate_chars(&analyzer.body_text(&html), META_FALLBACK_CHARS).to_string()
        });
        let excerpt = meta.excerpt.unwrap_or_else(|| meta_description.clone());

        Self {
            title,
            meta_description,
            slug,
            excerpt,
            html,
        }
    }

    /// 修正応答をパースし、欠けたフィールドは前回値で埋める
    ///
    /// 本文が空の応答は修正失敗として前回の HTML を保持する。
    pub fn parse_correction(raw: &str, previous: &DraftParts) -> Self {
        let (meta, html) = split_metadata(raw);
        let html = if html.is_empty() {
            previous.html.clone()
        } else {
            html
        };

        Self {
            title: meta.title.unwrap_or_else(|| previous.title.clone()),
            meta_description: meta
                .meta_description
                .unwrap_or_else(|| previous.meta_description.clone()),
            slug: meta
                .slug
                .map(|s| slugify(&s))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| previous.slug.clone()),
            excerpt: meta.excerpt.unwrap_or_else(|| previous.excerpt.clone()),
            html,
        }
    }

    /// 監査入力へ変換する
    pub fn to_draft(&self, keyword: &str, secondary: &[String]) -> Draft {
        Draft::new(
            &self.title,
            &self.meta_description,
            &self.slug,
            &self.html,
            keyword,
        )
        .with_secondary(secondary.to_vec())
    }
}

fn split_metadata(raw: &str) -> (RawMeta, String) {
    let mut meta = RawMeta::default();
    let mut html_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        if let Some(value) = prefix_value(trimmed, "META_TITLE:") {
            meta.title = value;
        } else if let Some(value) = prefix_value(trimmed, "META_DESCRIPTION:") {
            meta.meta_description = value;
        } else if let Some(value) = prefix_value(trimmed, "SLUG:") {
            meta.slug = value;
        } else if let Some(value) = prefix_value(trimmed, "EXCERPT:") {
            meta.excerpt = value;
        } else {
            html_lines.push(line);
        }
    }

    (meta, html_lines.join("\n").trim().to_string())
}

/// 前置詞が一致したら値を返す。値が空の行は「欠けている」扱い
fn prefix_value(line: &str, prefix: &str) -> Option<Option<String>> {
    line.strip_prefix(prefix).map(|rest| {
        let value = rest.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}
