//! SEO監査スコアラー
//!
//! 15項目の独立した二値チェックでドラフトを採点する。各チェックは
//! 合格時に固定の重みを加算し、重みの合計は100。採点はドラフト内容の
//! 純関数であり、同じ入力は常に同じレポートを返す。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::html::{is_absolute_http, is_internal_href, HtmlAnalyzer};
use crate::text::{char_index_of, count_occurrences, keyword_density, slugify, word_count};

/// 監査対象のドラフト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub meta_description: String,
    pub slug: String,
    pub html: String,
    pub keyword: String,
    pub secondary_keywords: Vec<String>,
}

impl Draft {
    pub fn new(
        title: impl Into<String>,
        meta_description: impl Into<String>,
        slug: impl Into<String>,
        html: impl Into<String>,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            meta_description: meta_description.into(),
            slug: slug.into(),
            html: html.into(),
            keyword: keyword.into(),
            secondary_keywords: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, secondary: Vec<String>) -> Self {
        self.secondary_keywords = secondary;
        self
    }
}

/// チェック項目の識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    TitleKeyword,
    TitleLength,
    MetaKeyword,
    MetaLength,
    SlugKeyword,
    FirstParagraphKeyword,
    KeywordDensity,
    HeadingCount,
    HeadingKeyword,
    WordCount,
    MoneyLinks,
    InternalLinks,
    StructuredData,
    ImageAltCoverage,
    LinkSanity,
}

impl CheckId {
    /// 全チェックの固定順
    pub const ALL: [CheckId; 15] = [
        CheckId::TitleKeyword,
        CheckId::TitleLength,
        CheckId::MetaKeyword,
        CheckId::MetaLength,
        CheckId::SlugKeyword,
        CheckId::FirstParagraphKeyword,
        CheckId::KeywordDensity,
        CheckId::HeadingCount,
        CheckId::HeadingKeyword,
        CheckId::WordCount,
        CheckId::MoneyLinks,
        CheckId::InternalLinks,
        CheckId::StructuredData,
        CheckId::ImageAltCoverage,
        CheckId::LinkSanity,
    ];

    /// このチェックの配点
    pub fn weight(self) -> u8 {
        match self {
            CheckId::TitleKeyword => 10,
            CheckId::TitleLength => 5,
            CheckId::MetaKeyword => 5,
            CheckId::MetaLength => 5,
            CheckId::SlugKeyword => 5,
            CheckId::FirstParagraphKeyword => 10,
            CheckId::KeywordDensity => 10,
            CheckId::HeadingCount => 5,
            CheckId::HeadingKeyword => 5,
            CheckId::WordCount => 10,
            CheckId::MoneyLinks => 10,
            CheckId::InternalLinks => 10,
            CheckId::StructuredData => 4,
            CheckId::ImageAltCoverage => 3,
            CheckId::LinkSanity => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckId::TitleKeyword => "title_keyword",
            CheckId::TitleLength => "title_length",
            CheckId::MetaKeyword => "meta_keyword",
            CheckId::MetaLength => "meta_length",
            CheckId::SlugKeyword => "slug_keyword",
            CheckId::FirstParagraphKeyword => "first_paragraph_keyword",
            CheckId::KeywordDensity => "keyword_density",
            CheckId::HeadingCount => "heading_count",
            CheckId::HeadingKeyword => "heading_keyword",
            CheckId::WordCount => "word_count",
            CheckId::MoneyLinks => "money_links",
            CheckId::InternalLinks => "internal_links",
            CheckId::StructuredData => "structured_data",
            CheckId::ImageAltCoverage => "image_alt_coverage",
            CheckId::LinkSanity => "link_sanity",
        }
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// チェック1項目の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub id: CheckId,
    pub passed: bool,
    pub weight: u8,
    /// 不合格時の問題の説明（スペイン語、修正プロンプトに埋め込まれる）
    pub problem: Option<String>,
    /// 不合格時の修正提案
    pub suggestion: Option<String>,
}

impl CheckOutcome {
    fn pass(id: CheckId) -> Self {
        Self {
            id,
            passed: true,
            weight: id.weight(),
            problem: None,
            suggestion: None,
        }
    }

    fn fail(id: CheckId, problem: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            id,
            passed: false,
            weight: id.weight(),
            problem: Some(problem.into()),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// 本文の計測値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub word_count: usize,
    pub keyword_occurrences: usize,
    /// 小数2桁に丸めた密度(%)。合否判定は丸め前の値で行う
    pub density_pct: f64,
    pub h2_count: usize,
    pub money_links: usize,
    pub internal_links: usize,
    pub images_total: usize,
    pub images_with_alt: usize,
}

/// 監査レポート（純関数の出力、時刻を含まない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// 0-100
    pub score: u8,
    pub checks: Vec<CheckOutcome>,
    pub problems: Vec<String>,
    pub suggestions: Vec<String>,
    pub stats: ContentStats,
}

impl AuditReport {
    /// 指定チェックの結果
    pub fn check(&self, id: CheckId) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.id == id)
    }

    pub fn passed(&self, id: CheckId) -> bool {
        self.check(id).is_some_and(|c| c.passed)
    }

    /// 不合格チェックだけを列挙する
    pub fn failed_checks(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// ストアに積まれる監査履歴エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub post_id: Uuid,
    pub report: AuditReport,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(post_id: Uuid, report: AuditReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            report,
            recorded_at: Utc::now(),
        }
    }
}

/// SEO監査器
#[derive(Debug, Clone, Default)]
pub struct SeoAuditor {
    analyzer: HtmlAnalyzer,
}

impl SeoAuditor {
    pub fn new() -> Self {
        Self {
            analyzer: HtmlAnalyzer::new(),
        }
    }

    /// ドラフトを採点する
    pub fn audit(&self, draft: &Draft) -> AuditReport {
        let keyword = &draft.keyword;
        let body = self.analyzer.body_text(&draft.html);
        let words = word_count(&body);
        let occurrences = count_occurrences(&body, keyword);
        let density = keyword_density(&body, keyword);
        let h2s = self.analyzer.h2_headings(&draft.html);
        let anchors = self.analyzer.anchors(&draft.html);
        let money_links = anchors.iter().filter(|a| is_absolute_http(&a.href)).count();
        let internal_links = anchors.iter().filter(|a| is_internal_href(&a.href)).count();
        let alts = self.analyzer.image_alts(&draft.html);
        let images_with_alt = alts
            .iter()
            .filter(|a| a.as_deref().is_some_and(|s| !s.is_empty()))
            .count();

        let stats = ContentStats {
            word_count: words,
            keyword_occurrences: occurrences,
            density_pct: (density * 100.0).round() / 100.0,
            h2_count: h2s.len(),
            money_links,
            internal_links,
            images_total: alts.len(),
            images_with_alt,
        };

        let mut checks = Vec::with_capacity(CheckId::ALL.len());

        // 1. タイトル先頭20文字以内にキーワード
        checks.push(match char_index_of(&draft.title, keyword) {
            Some(idx) if idx < 20 => CheckOutcome::pass(CheckId::TitleKeyword),
            _ => CheckOutcome::fail(
                CheckId::TitleKeyword,
                format!(
                    "La keyword principal '{keyword}' no aparece al inicio del título"
                ),
                format!("Mover '{keyword}' a los primeros 20 caracteres del título"),
            ),
        });

        // 2. タイトル60文字以内
        let title_chars = draft.title.chars().count();
        checks.push(if title_chars <= 60 {
            CheckOutcome::pass(CheckId::TitleLength)
        } else {
            CheckOutcome::fail(
                CheckId::TitleLength,
                format!("Título de {title_chars} caracteres (máximo 60)"),
                "Acortar el título a 60 caracteres o menos".to_string(),
            )
        });

        // 3. メタディスクリプションにキーワード
        checks.push(if count_occurrences(&draft.meta_description, keyword) > 0 {
            CheckOutcome::pass(CheckId::MetaKeyword)
        } else {
            CheckOutcome::fail(
                CheckId::MetaKeyword,
                "La keyword no está en la meta description".to_string(),
                format!("Incluir '{keyword}' en la meta description"),
            )
        });

        // 4. メタディスクリプション120-155文字
        let meta_chars = draft.meta_description.chars().count();
        checks.push(if (120..=155).contains(&meta_chars) {
            CheckOutcome::pass(CheckId::MetaLength)
        } else {
            CheckOutcome::fail(
                CheckId::MetaLength,
                format!("Meta description de {meta_chars} caracteres (ideal 120-155)"),
                "Ajustar la meta description a entre 120 y 155 caracteres".to_string(),
            )
        });

        // 5. スラッグにキーワード
        let keyword_slug = slugify(keyword);
        checks.push(if !keyword_slug.is_empty() && draft.slug.contains(&keyword_slug) {
            CheckOutcome::pass(CheckId::SlugKeyword)
        } else {
            CheckOutcome::fail(
                CheckId::SlugKeyword,
                "El slug no contiene la keyword".to_string(),
                format!("Usar '{keyword_slug}' dentro del slug"),
            )
        });

        // 6. 最初の100語にキーワード
        let first_words: Vec<&str> = body.split_whitespace().take(100).collect();
        let first_block = first_words.join(" ");
        checks.push(if count_occurrences(&first_block, keyword) > 0 {
            CheckOutcome::pass(CheckId::FirstParagraphKeyword)
        } else {
            CheckOutcome::fail(
                CheckId::FirstParagraphKeyword,
                "La keyword no aparece en las primeras 100 palabras".to_string(),
                format!("Mencionar '{keyword}' en el primer párrafo"),
            )
        });

        // 7. キーワード密度 0.5-2.5%
        checks.push(if (0.5..=2.5).contains(&density) {
            CheckOutcome::pass(CheckId::KeywordDensity)
        } else if density < 0.5 {
            CheckOutcome::fail(
                CheckId::KeywordDensity,
                format!("Keyword density muy baja ({density:.1}%)"),
                "Usar la keyword más veces de forma natural".to_string(),
            )
        } else {
            CheckOutcome::fail(
                CheckId::KeywordDensity,
                format!("Keyword density alta ({density:.1}%), riesgo de keyword stuffing"),
                "Reducir las repeticiones de la keyword".to_string(),
            )
        });

        // 8. H2見出し3つ以上
        checks.push(if h2s.len() >= 3 {
            CheckOutcome::pass(CheckId::HeadingCount)
        } else {
            CheckOutcome::fail(
                CheckId::HeadingCount,
                format!("Solo {} secciones H2 (mínimo 3)", h2s.len()),
                "Agregar más secciones H2".to_string(),
            )
        });

        // 9. いずれかのH2に主/副キーワード
        let heading_hit = h2s.iter().any(|h2| {
            count_occurrences(h2, keyword) > 0
                || draft
                    .secondary_keywords
                    .iter()
                    .any(|sec| count_occurrences(h2, sec) > 0)
        });
        checks.push(if heading_hit {
            CheckOutcome::pass(CheckId::HeadingKeyword)
        } else {
            CheckOutcome::fail(
                CheckId::HeadingKeyword,
                "Ningún H2 contiene la keyword ni las secundarias".to_string(),
                "Incluir la keyword o una secundaria en al menos un H2".to_string(),
            )
        });

        // 10. 本文800-3000語
        checks.push(if (800..=3000).contains(&words) {
            CheckOutcome::pass(CheckId::WordCount)
        } else if words < 800 {
            CheckOutcome::fail(
                CheckId::WordCount,
                format!("Artículo muy corto ({words} palabras, mínimo 800)"),
                "Ampliar el contenido a al menos 800 palabras".to_string(),
            )
        } else {
            CheckOutcome::fail(
                CheckId::WordCount,
                format!("Artículo muy largo ({words} palabras, máximo 3000)"),
                "Recortar el contenido por debajo de 3000 palabras".to_string(),
            )
        });

        // 11. マネーリンク2本以上
        checks.push(if money_links >= 2 {
            CheckOutcome::pass(CheckId::MoneyLinks)
        } else {
            CheckOutcome::fail(
                CheckId::MoneyLinks,
                format!("Solo {money_links} money links (mínimo 2)"),
                "Agregar links a las páginas de conversión del cliente".to_string(),
            )
        });

        // 12. 内部リンク2本以上
        checks.push(if internal_links >= 2 {
            CheckOutcome::pass(CheckId::InternalLinks)
        } else {
            CheckOutcome::fail(
                CheckId::InternalLinks,
                format!("Solo {internal_links} internal links (mínimo 2)"),
                "Enlazar al menos 2 artículos del blog".to_string(),
            )
        });

        // 13. JSON-LD構造化データ
        checks.push(if self.analyzer.has_structured_data(&draft.html) {
            CheckOutcome::pass(CheckId::StructuredData)
        } else {
            CheckOutcome::fail(
                CheckId::StructuredData,
                "Sin datos estructurados JSON-LD".to_string(),
                "Incluir un bloque <script type=\"application/ld+json\">".to_string(),
            )
        });

        // 14. 画像が1枚以上あり、全てにaltテキスト
        checks.push(if !alts.is_empty() && images_with_alt == alts.len() {
            CheckOutcome::pass(CheckId::ImageAltCoverage)
        } else if alts.is_empty() {
            CheckOutcome::fail(
                CheckId::ImageAltCoverage,
                "Sin imágenes".to_string(),
                "Agregar al menos 1 imagen con alt text que incluya la keyword".to_string(),
            )
        } else {
            CheckOutcome::fail(
                CheckId::ImageAltCoverage,
                format!("Imágenes sin alt text ({images_with_alt}/{})", alts.len()),
                "Completar el alt text de todas las imágenes".to_string(),
            )
        });

        // 15. リンクの健全性
        let links_ok = anchors.iter().all(|a| {
            let href = a.href.trim();
            if href.is_empty() || href == "#" {
                return false;
            }
            if is_absolute_http(href) {
                return url::Url::parse(href).is_ok();
            }
            true
        });
        checks.push(if links_ok {
            CheckOutcome::pass(CheckId::LinkSanity)
        } else {
            CheckOutcome::fail(
                CheckId::LinkSanity,
                "Hay links con href vacío o inválido".to_string(),
                "Corregir o eliminar los links inválidos".to_string(),
            )
        });

        let score: u8 = checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.weight)
            .sum::<u8>()
            .min(100);
        let problems = checks
            .iter()
            .filter_map(|c| c.problem.clone())
            .collect();
        let suggestions = checks
            .iter()
            .filter_map(|c| c.suggestion.clone())
            .collect();

        AuditReport {
            score,
            checks,
            problems,
            suggestions,
            stats,
        }
    }
}
