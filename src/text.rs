//! キーワード・スラッグ処理のテキストユーティリティ

/// キーワードをURLスラッグへ変換する
///
/// 小文字化してアクセントを折り畳み、英数字以外を落として
/// 空白をハイフンに置き換える。連続ハイフンは1つに潰す。
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_hyphen = false;
    for c in input.to_lowercase().chars() {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_hyphen = false;
        } else if (c == ' ' || c == '-' || c == '_') && !prev_hyphen && !out.is_empty() {
            out.push('-');
            prev_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// アクセント付き文字をASCIIへ折り畳む(入力は小文字前提)
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        _ => c,
    }
}

/// 本文の単語数を数える
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// フレーズの出現回数を数える(大文字小文字を区別しない、重複なし)
pub fn count_occurrences(text: &str, phrase: &str) -> usize {
    let haystack = normalize_ws(&text.to_lowercase());
    let needle = normalize_ws(&phrase.to_lowercase());
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle.as_str()).count()
}

/// キーワード密度(%)を計算する
pub fn keyword_density(text: &str, phrase: &str) -> f64 {
    let words = word_count(text);
    if words == 0 {
        return 0.0;
    }
    (count_occurrences(text, phrase) as f64 / words as f64) * 100.0
}

/// 大文字小文字を無視した最初の出現位置(文字単位)
pub fn char_index_of(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.to_lowercase();
    let n = needle.to_lowercase();
    if n.is_empty() {
        return None;
    }
    h.find(&n).map(|byte_idx| h[..byte_idx].chars().count())
}

/// 各単語の先頭を大文字化する
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 文字数で安全に切り詰める
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 空白を単一スペースへ正規化する
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_punctuation() {
        assert_eq!(
            slugify("Cómo Comprar Casa en CDMX ¡Guía 2025!"),
            "como-comprar-casa-en-cdmx-guia-2025"
        );
        assert_eq!(slugify("  señal --- fuerte  "), "senal-fuerte");
        assert_eq!(slugify("¿qué?"), "que");
    }

    #[test]
    fn occurrences_ignore_case_and_extra_whitespace() {
        let text = "Comprar casa en CDMX es fácil. comprar  casa en cdmx hoy.";
        assert_eq!(count_occurrences(text, "comprar casa en CDMX"), 2);
        assert_eq!(count_occurrences(text, "departamento"), 0);
        assert_eq!(count_occurrences(text, ""), 0);
    }

    #[test]
    fn density_is_occurrences_over_words() {
        // 10 words, 1 occurrence of a 2-word phrase
        let text = "comprar casa hoy es una buena idea para invertir bien";
        assert_eq!(word_count(text), 10);
        let d = keyword_density(text, "comprar casa");
        assert!((d - 10.0).abs() < f64::EPSILON);
        assert_eq!(keyword_density("", "x"), 0.0);
    }

    #[test]
    fn char_index_counts_chars_not_bytes() {
        assert_eq!(char_index_of("Guía para comprar", "comprar"), Some(10));
        assert_eq!(char_index_of("Comprar casa", "COMPRAR"), Some(0));
        assert_eq!(char_index_of("nada", "casa"), None);
    }

    #[test]
    fn title_case_and_truncation() {
        assert_eq!(title_case("comprar casa en cdmx"), "Comprar Casa En Cdmx");
        assert_eq!(truncate_chars("áéíóú", 3), "áéí");
        assert_eq!(truncate_chars("corto", 10), "corto");
    }
}
