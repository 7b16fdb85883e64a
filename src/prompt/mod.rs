//! プロンプトビルダー
//!
//! 監査基準と同じ制約を生成指示に埋め込むことで、監査器が検証する
//! 条件がモデルへ実際に渡した指示と一致する状態を保つ。修正プロンプトは
//! 不合格チェックだけを列挙し、合格済み項目を壊す方向の書き換えを避ける。

pub mod draft;

use crate::audit::{AuditReport, Draft};
use crate::config::PipelineConfig;
use crate::providers::Prompt;
use crate::store::{BlogPost, Client, MoneyPage, SeoKeyword};

/// 記事1本あたりに提示するマネーページ上限
const MONEY_PAGES_PER_ARTICLE: usize = 2;

/// プロンプトビルダー
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    target_words: u32,
    internal_candidates: usize,
}

impl PromptBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            target_words: config.target_words,
            internal_candidates: config.internal_link_candidates,
        }
    }

    /// 記事生成プロンプトを組み立てる
    pub fn generation(
        &self,
        keyword: &SeoKeyword,
        client: &Client,
        money_pages: &[MoneyPage],
        internal_posts: &[BlogPost],
    ) -> Prompt {
        let kw = &keyword.keyword;
        let secondary = if keyword.secondary_keywords.is_empty() {
            "ninguna".to_string()
        } else {
            keyword
                .secondary_keywords
                .iter()
                .map(|k| format!("\"{k}\""))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let system = format!(
            r#"Eres un redactor SEO experto. Tu ÚNICO objetivo es escribir un artículo
que POSICIONE EN GOOGLE para la keyword "{kw}".

REGLAS SEO OBLIGATORIAS — NO NEGOCIABLES:

1. KEYWORD PRINCIPAL: "{kw}"
   - DEBE aparecer al inicio del título (primeros 20 caracteres)
   - DEBE aparecer en las primeras 100 palabras del artículo
   - DEBE aparecer en al menos 1 H2
   - DEBE aparecer 4-8 veces en total (density ~1-2%)
   - Usar variaciones naturales también

2. KEYWORDS SECUNDARIAS: {secondary}
   - Cada una debe aparecer al menos 1 vez en el artículo
   - Idealmente en un H2 o H3

3. ESTRUCTURA:
   - Título H1: máximo 60 caracteres, keyword al inicio
   - Al menos 3 secciones con H2, idealmente 4
   - Párrafos cortos (3-4 oraciones máximo)
   - Longitud total: {target_words} palabras aproximadamente
   - Incluir al menos 1 imagen con alt text descriptivo
   - Incluir un bloque <script type="application/ld+json"> con schema Article

4. PRIMER PÁRRAFO:
   - Hook que enganche al lector
   - Keyword principal en las primeras 2 oraciones

5. ÚLTIMO PÁRRAFO:
   - Resumen de los puntos clave
   - CTA claro dirigido al negocio del cliente

CLIENTE: {client_name}
SITIO WEB: {site_url}

IMPORTANTE: El artículo NO debe sonar robótico ni genérico.
Debe ser útil, con datos concretos y ejemplos reales."#,
            kw = kw,
            secondary = secondary,
            target_words = self.target_words,
            client_name = client.name,
            site_url = client.site_url,
        );

        let mut user = format!(
            "Escribe un artículo de blog SEO-optimizado.\n\nKEYWORD PRINCIPAL: {kw}\nKEYWORDS SECUNDARIAS: {secondary}\n"
        );
        if let Some(intent) = &keyword.intent {
            user.push_str(&format!("INTENCIÓN DE BÚSQUEDA: {intent}\n"));
        }
        if let Some(title) = &keyword.suggested_title {
            user.push_str(&format!("TÍTULO SUGERIDO: {title}\n"));
        }

        let selected = select_money_pages(kw, money_pages, MONEY_PAGES_PER_ARTICLE);
        if !selected.is_empty() {
            user.push_str(
                "\nLINKS AL SITIO DEL CLIENTE (incluir de forma natural en el artículo):\n",
            );
            for page in &selected {
                let anchors = if page.anchor_texts.is_empty() {
                    format!("\"{}\"", page.title)
                } else {
                    page.anchor_texts
                        .iter()
                        .take(2)
                        .map(|a| format!("\"{a}\""))
                        .collect::<Vec<_>>()
                        .join(" o ")
                };
                user.push_str(&format!(
                    "  - Enlazar a {} usando como texto: {}\n",
                    page.url, anchors
                ));
            }
            user.push_str("  Estos links son OBLIGATORIOS. Insértalos donde fluyan naturalmente.\n");
        }

        if !internal_posts.is_empty() {
            user.push_str("\nARTÍCULOS EXISTENTES DEL BLOG (enlazar 2-3 de forma natural):\n");
            for post in internal_posts.iter().take(self.internal_candidates) {
                user.push_str(&format!("  - \"{}\" → /blog/{}\n", post.title, post.slug));
            }
            user.push_str("  Inserta links a 2-3 de estos artículos donde sea relevante.\n");
        }

        user.push_str(
            r#"
FORMATO DE SALIDA:
Primero genera estas líneas (una por línea, sin formato extra):
META_TITLE: [título SEO, máx 60 chars, keyword al inicio]
META_DESCRIPTION: [descripción con keyword + CTA, 120-155 chars]
SLUG: [url-amigable-con-keyword]
EXCERPT: [2 oraciones para preview/redes sociales]

Luego el artículo completo en HTML:
- <h1> para el título
- <h2> para secciones principales
- <h3> para subsecciones
- <p> para párrafos
- <ul>/<li> para listas donde aplique
- <a href="URL"> para links (internos y al sitio del cliente)
- NO incluir <html>, <head> ni <body>
"#,
        );

        Prompt::new(system, user)
    }

    /// 監査結果から修正プロンプトを組み立てる
    ///
    /// 不合格チェックの問題と提案だけを埋め込む。全基準を再列挙すると
    /// 合格済みの項目までモデルが書き換えてしまうため。
    pub fn correction(&self, draft: &Draft, report: &AuditReport) -> Prompt {
        let system = "Eres un editor SEO experto. Corriges artículos puntualmente \
                      sin cambiar su estructura general ni su tono."
            .to_string();

        let stats = &report.stats;
        let mut user = format!(
            r#"Revisa y CORRIGE este artículo según los problemas SEO detectados.

KEYWORD PRINCIPAL: "{kw}"
KEYWORDS SECUNDARIAS: {secondary}

ESTADÍSTICAS ACTUALES:
- Puntuación SEO: {score}/100
- Palabras: {words}
- Keyword density: {density}%
- Veces que aparece la keyword: {occurrences}
- H2s: {h2s}
- Money links: {money}
- Links internos: {internal}
"#,
            kw = draft.keyword,
            secondary = if draft.secondary_keywords.is_empty() {
                "ninguna".to_string()
            } else {
                draft.secondary_keywords.join(", ")
            },
            score = report.score,
            words = stats.word_count,
            density = stats.density_pct,
            occurrences = stats.keyword_occurrences,
            h2s = stats.h2_count,
            money = stats.money_links,
            internal = stats.internal_links,
        );

        let failed = report.failed_checks();
        if !failed.is_empty() {
            user.push_str("\nPROBLEMAS A CORREGIR:\n");
            for check in &failed {
                if let Some(problem) = &check.problem {
                    user.push_str(&format!("  - {problem}\n"));
                }
            }
            user.push_str("\nCÓMO CORREGIRLOS:\n");
            for check in &failed {
                if let Some(suggestion) = &check.suggestion {
                    user.push_str(&format!("  - {suggestion}\n"));
                }
            }
        }

        user.push_str(&format!(
            r#"
INSTRUCCIONES:
1. Corrige TODOS los problemas listados
2. NO cambies la estructura general del artículo
3. NO toques las partes que ya cumplen
4. Devuelve el documento completo en el mismo formato de salida
   (META_TITLE, META_DESCRIPTION, SLUG, EXCERPT y luego el HTML corregido)

DOCUMENTO ACTUAL:
META_TITLE: {title}
META_DESCRIPTION: {meta}
SLUG: {slug}

{html}"#,
            title = draft.title,
            meta = draft.meta_description,
            slug = draft.slug,
            html = draft.html,
        ));

        Prompt::new(system, user)
    }

    /// キーワード戦略プロンプトを組み立てる
    pub fn strategy(
        &self,
        client: &Client,
        money_pages: &[MoneyPage],
        existing_keywords: &[String],
        num_keywords: usize,
    ) -> Prompt {
        let system = "Eres un consultor SEO experto en estrategia de contenido.\n\
                      Tu trabajo es planificar qué keywords atacar con un blog para maximizar\n\
                      el tráfico orgánico de un negocio.\n\n\
                      Responde SOLO en formato JSON válido, sin texto adicional ni backticks."
            .to_string();

        let mut user = format!(
            "Genera una estrategia de keywords para el blog de este negocio:\n\n\
             NEGOCIO: {}\nSITIO WEB: {}\n\nPÁGINAS DE CONVERSIÓN (los clusters deben llevar tráfico hacia ellas):\n",
            client.name, client.site_url
        );
        for page in money_pages {
            let category = page.category.as_deref().unwrap_or("general");
            user.push_str(&format!(
                "  - {} | {} | categoría: {} | prioridad: {}\n",
                page.url, page.title, category, page.priority
            ));
        }
        user.push_str(&format!(
            "\nKEYWORDS YA USADAS (no repetir): {}\n\nGenera {} keywords organizadas en clusters temáticos.\n",
            if existing_keywords.is_empty() {
                "ninguna".to_string()
            } else {
                existing_keywords.join(", ")
            },
            num_keywords
        ));

        user.push_str(
            r#"
FORMATO JSON REQUERIDO:
{
    "clusters": [
        {
            "name": "Nombre del cluster temático",
            "pillar_keyword": "keyword principal competitiva del cluster",
            "pillar_title": "Título sugerido para el pillar article",
            "keywords": [
                {
                    "keyword": "keyword long-tail específica",
                    "intent": "informacional | transaccional | navegacional",
                    "difficulty": "baja | media | alta",
                    "volume": "alto | medio | bajo",
                    "suggested_title": "Título SEO sugerido para el artículo",
                    "priority": 3
                }
            ]
        }
    ],
    "suggested_calendar": "resumen opcional del calendario editorial"
}

CRITERIOS DE SELECCIÓN:
- Mezclar keywords informacionales (atraer tráfico) y transaccionales (convertir)
- Priorizar keywords de cola larga con menor competencia
- Incluir keywords con intención local si aplica (ciudad/región)
- Organizar en clusters de 3-5 keywords por tema
- El pillar de cada cluster debe ser la keyword más competitiva
"#,
        );

        Prompt::new(system, user)
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

/// キーワードとの関連度でマネーページを選ぶ
///
/// 配点は優先度 + 10(キーワードの包含一致) + 3(単語の重なり)。
/// 同点は登録順を保つ。
pub fn select_money_pages(keyword: &str, pages: &[MoneyPage], max_pages: usize) -> Vec<MoneyPage> {
    let keyword_lower = keyword.to_lowercase();
    let mut scored: Vec<(i64, &MoneyPage)> = pages
        .iter()
        .map(|page| {
            let mut score = page.priority as i64;
            let mut phrases: Vec<String> = vec![page.title.to_lowercase()];
            phrases.extend(page.anchor_texts.iter().map(|a| a.to_lowercase()));
            for phrase in &phrases {
                if phrase.is_empty() {
                    continue;
                }
                if phrase.contains(&keyword_lower) || keyword_lower.contains(phrase.as_str()) {
                    score += 10;
                } else if phrase
                    .split_whitespace()
                    .any(|word| keyword_lower.contains(word))
                {
                    score += 3;
                }
            }
            (score, page)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(max_pages)
        .map(|(_, page)| page.clone())
        .collect()
}
