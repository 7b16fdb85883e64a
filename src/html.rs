//! 監査とリンク注入が共有するHTML解析ヘルパー
//!
//! HTMLパーサは持たず、生成記事の規則的なマークアップを前提とした
//! 正規表現ベースの軽量解析を行う。

use regex::Regex;

/// 解析済みアンカータグ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// href属性の値
    pub href: String,
    /// アンカーテキスト(内側タグ除去済み)
    pub text: String,
}

/// HTML文字列の正規表現ベース解析器
#[derive(Debug, Clone)]
pub struct HtmlAnalyzer {
    anchor_re: Regex,
    img_re: Regex,
    alt_re: Regex,
    h1_re: Regex,
    h2_re: Regex,
    ld_json_re: Regex,
    script_style_re: Regex,
    tag_re: Regex,
    p_close_re: Regex,
    p_open_re: Regex,
}

impl HtmlAnalyzer {
    /// 新しい解析器を作成
    pub fn new() -> Self {
        Self {
            anchor_re: Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#)
                .unwrap(),
            img_re: Regex::new(r"(?is)<img\b[^>]*>").unwrap(),
            alt_re: Regex::new(r#"(?is)\balt\s*=\s*["']([^"']*)["']"#).unwrap(),
            h1_re: Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap(),
            h2_re: Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").unwrap(),
            ld_json_re: Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["']"#)
                .unwrap(),
            script_style_re: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
                .unwrap(),
            tag_re: Regex::new(r"(?s)<[^>]+>").unwrap(),
            p_close_re: Regex::new(r"(?i)</p\s*>").unwrap(),
            p_open_re: Regex::new(r"(?i)<p[\s>]").unwrap(),
        }
    }

    /// タグを除いた本文テキストを返す(空白正規化済み)
    ///
    /// script/style はタグごと中身を落とすので、JSON-LD が
    /// 単語数やキーワード密度を汚すことはない。
    pub fn body_text(&self, html: &str) -> String {
        let without_blocks = self.script_style_re.replace_all(html, " ");
        let without_tags = self.tag_re.replace_all(&without_blocks, " ");
        let decoded = decode_entities(&without_tags);
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// 最初のH1見出しの内側テキスト
    pub fn first_h1(&self, html: &str) -> Option<String> {
        self.h1_re
            .captures(html)
            .map(|c| self.inner_text(c.get(1).map_or("", |m| m.as_str())))
    }

    /// H2見出しの内側テキストを列挙する
    pub fn h2_headings(&self, html: &str) -> Vec<String> {
        self.h2_re
            .captures_iter(html)
            .map(|c| self.inner_text(c.get(1).map_or("", |m| m.as_str())))
            .collect()
    }

    /// アンカータグを列挙する
    pub fn anchors(&self, html: &str) -> Vec<Anchor> {
        self.anchor_re
            .captures_iter(html)
            .map(|c| Anchor {
                href: c.get(1).map_or("", |m| m.as_str()).trim().to_string(),
                text: self.inner_text(c.get(2).map_or("", |m| m.as_str())),
            })
            .collect()
    }

    /// imgタグのalt属性を列挙する(altなしはNone)
    pub fn image_alts(&self, html: &str) -> Vec<Option<String>> {
        self.img_re
            .find_iter(html)
            .map(|tag| {
                self.alt_re
                    .captures(tag.as_str())
                    .map(|c| c.get(1).map_or("", |m| m.as_str()).trim().to_string())
            })
            .collect()
    }

    /// JSON-LD構造化データの有無
    pub fn has_structured_data(&self, html: &str) -> bool {
        self.ld_json_re.is_match(html)
    }

    /// キーワード初出を含む段落の閉じタグ直後のバイト位置
    pub fn paragraph_boundary_after(&self, html: &str, keyword: &str) -> Option<usize> {
        let kw_re = Regex::new(&format!("(?i){}", regex::escape(keyword))).ok()?;
        let hit = kw_re.find(html)?;
        let close = self.p_close_re.find_at(html, hit.end())?;
        Some(close.end())
    }

    /// 最後の段落の開始バイト位置
    pub fn last_paragraph_start(&self, html: &str) -> Option<usize> {
        self.p_open_re.find_iter(html).last().map(|m| m.start())
    }

    /// 内側HTMLからタグを除去してトリムする
    fn inner_text(&self, inner: &str) -> String {
        let stripped = self.tag_re.replace_all(inner, " ");
        decode_entities(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for HtmlAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// 絶対http(s)リンクか
pub fn is_absolute_http(href: &str) -> bool {
    let h = href.trim().to_ascii_lowercase();
    h.starts_with("http://") || h.starts_with("https://")
}

/// 同一サイト内への相対リンクか
pub fn is_internal_href(href: &str) -> bool {
    let h = href.trim();
    if h.is_empty() || h.starts_with('#') {
        return false;
    }
    let lower = h.to_ascii_lowercase();
    !(lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:"))
}

/// よく現れるHTMLエンティティだけを戻す
fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
