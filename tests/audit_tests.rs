//! SEO Audit Scoring Tests
//!
//! Exercises the 15 binary checks against realistic Spanish drafts: a
//! strong article that passes every check and controlled mutations that
//! knock out one check at a time.

use seoforge_rs::audit::{CheckId, Draft, SeoAuditor};

fn init_test_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

const KEYWORD: &str = "comprar casa en cdmx";
const TITLE: &str = "Comprar casa en CDMX: guía completa 2025";
const META: &str = "Descubre cómo comprar casa en CDMX: precios por zona, crédito hipotecario y consejos de expertos para elegir tu próxima vivienda sin errores.";
const SLUG: &str = "comprar-casa-en-cdmx-guia";

const FILLER: &str = "<p>El mercado inmobiliario capitalino ofrece opciones para casi cualquier presupuesto, desde departamentos compactos en zonas céntricas hasta casas amplias en los alrededores del sur.</p>";

/// Cuerpo que aprueba los 15 checks: keyword al inicio del título y del
/// primer párrafo, 6 menciones en ~935 palabras, 3 H2, 2 money links,
/// 2 internos, imagen con alt y bloque JSON-LD.
fn strong_article_html() -> String {
    let mut html = String::new();
    html.push_str("<h1>Comprar casa en CDMX: guía completa 2025</h1>");
    html.push_str("<p>Comprar casa en CDMX es una de las decisiones financieras más importantes de tu vida. En esta guía revisamos los precios de vivienda por zona, los trámites y cómo funciona el crédito hipotecario paso a paso.</p>");
    html.push_str("<img src=\"/img/casa-cdmx.jpg\" alt=\"Fachada de una casa en la Ciudad de México\">");
    html.push_str("<h2>Por qué comprar casa en CDMX este año</h2>");
    html.push_str("<p>La capital concentra empleo, servicios y una red de transporte que sostiene la demanda de vivienda. Esa demanda mantiene el valor de las propiedades incluso en ciclos económicos complicados.</p>");
    for _ in 0..10 {
        html.push_str(FILLER);
    }
    html.push_str("<h2>Crédito hipotecario: requisitos y bancos</h2>");
    html.push_str("<p>Antes de comprar casa en CDMX conviene precalificar tu crédito hipotecario en al menos dos bancos y comparar la tasa, el plazo y los seguros incluidos.</p>");
    html.push_str("<p>Explora el catálogo en <a href=\"https://inmobiliaria-norte.mx/propiedades\" title=\"Propiedades en venta\">ver propiedades</a> para comparar opciones reales.</p>");
    html.push_str("<p>Si necesitas ayuda personalizada, <a href=\"https://inmobiliaria-norte.mx/contacto\" title=\"Contacto\">agenda una asesoría</a> sin costo.</p>");
    for _ in 0..10 {
        html.push_str(FILLER);
    }
    html.push_str("<h2>Precios de vivienda por zona</h2>");
    html.push_str("<p>Los precios de vivienda al comprar casa en CDMX cambian por alcaldía: el sur y el poniente son más caros, mientras que el oriente ofrece opciones accesibles para una primera compra.</p>");
    html.push_str("<p>Complementa con la <a href=\"/blog/guia-credito-hipotecario\" title=\"Guía de crédito\">guía de crédito hipotecario</a> del blog.</p>");
    html.push_str("<p>También te puede servir <a href=\"/blog/errores-al-comprar-vivienda\" title=\"Errores comunes\">errores al comprar vivienda</a> antes de firmar.</p>");
    for _ in 0..10 {
        html.push_str(FILLER);
    }
    html.push_str("<script type=\"application/ld+json\">{\"@context\":\"https://schema.org\",\"@type\":\"Article\",\"headline\":\"Comprar casa en CDMX: guía completa 2025\"}</script>");
    html.push_str("<p>En resumen, comprar casa en CDMX exige comparar zonas, validar el crédito y revisar cada contrato. Empieza hoy con la información de esta guía y toma una decisión segura.</p>");
    html
}

fn strong_draft() -> Draft {
    Draft::new(TITLE, META, SLUG, strong_article_html(), KEYWORD).with_secondary(vec![
        "crédito hipotecario".to_string(),
        "precios de vivienda".to_string(),
    ])
}

fn weak_draft() -> Draft {
    Draft::new(
        "Una guía inmobiliaria",
        "Guía breve.",
        "guia",
        "<h1>Una guía inmobiliaria</h1><p>Texto breve sobre vivienda.</p>",
        KEYWORD,
    )
}

#[test]
fn test_strong_article_passes_every_check() {
    init_test_logger();

    let report = SeoAuditor::new().audit(&strong_draft());
    log::info!(
        "strong article: score={} words={} density={}",
        report.score,
        report.stats.word_count,
        report.stats.density_pct
    );

    for check in &report.checks {
        assert!(check.passed, "check {} falló inesperadamente", check.id);
    }
    assert_eq!(report.score, 100);
    assert!(report.problems.is_empty());
    assert!(report.suggestions.is_empty());

    assert_eq!(report.stats.keyword_occurrences, 6);
    assert!((900..=1000).contains(&report.stats.word_count));
    assert_eq!(report.stats.h2_count, 3);
    assert_eq!(report.stats.money_links, 2);
    assert_eq!(report.stats.internal_links, 2);
    assert_eq!(report.stats.images_total, 1);
    assert_eq!(report.stats.images_with_alt, 1);
    assert!((0.5..=2.5).contains(&report.stats.density_pct));
}

#[test]
fn test_weak_draft_scores_only_vacuous_checks() {
    init_test_logger();

    let report = SeoAuditor::new().audit(&weak_draft());

    // Solo sobreviven la longitud del título y la sanidad de links (sin anchors).
    assert!(report.passed(CheckId::TitleLength));
    assert!(report.passed(CheckId::LinkSanity));
    assert_eq!(report.score, 8);
    assert_eq!(report.failed_checks().len(), 13);
    assert_eq!(report.problems.len(), 13);
    assert_eq!(report.suggestions.len(), 13);
}

#[test]
fn test_same_draft_always_same_report() {
    let auditor = SeoAuditor::new();
    let draft = strong_draft();
    let first = auditor.audit(&draft);
    let second = auditor.audit(&draft);
    assert_eq!(first, second);
}

#[test]
fn test_title_keyword_window_is_twenty_chars() {
    let auditor = SeoAuditor::new();

    // "La guía definitiva para " son 24 caracteres: keyword fuera de la ventana.
    let mut late = strong_draft();
    late.title = "La guía definitiva para comprar casa en CDMX".to_string();
    let report = auditor.audit(&late);
    assert!(!report.passed(CheckId::TitleKeyword));
    assert!(report.passed(CheckId::TitleLength));

    // Mayúsculas distintas no afectan la detección.
    let mut upper = strong_draft();
    upper.title = "COMPRAR CASA EN CDMX sin errores".to_string();
    assert!(auditor.audit(&upper).passed(CheckId::TitleKeyword));
}

#[test]
fn test_meta_description_length_window() {
    let auditor = SeoAuditor::new();
    // "comprar casa en cdmx " + relleno: 21 caracteres + n.
    for (pad, expected) in [(98, false), (99, true), (134, true), (135, false)] {
        let mut draft = strong_draft();
        draft.meta_description = format!("comprar casa en cdmx {}", "a".repeat(pad));
        assert_eq!(draft.meta_description.chars().count(), 21 + pad);
        let report = auditor.audit(&draft);
        assert_eq!(
            report.passed(CheckId::MetaLength),
            expected,
            "meta de {} caracteres",
            21 + pad
        );
        // La keyword sigue presente en todos los casos.
        assert!(report.passed(CheckId::MetaKeyword));
    }
}

#[test]
fn test_density_rejects_low_and_stuffed_bodies() {
    let auditor = SeoAuditor::new();

    // 1 mención en ~400 palabras: 0.25%, por debajo del piso.
    let low_html = format!(
        "<p>comprar casa en cdmx {}</p>",
        "palabra ".repeat(399).trim_end()
    );
    let mut low = strong_draft();
    low.html = low_html;
    let low_report = auditor.audit(&low);
    assert!(!low_report.passed(CheckId::KeywordDensity));

    // 13 menciones en ~400 palabras: 3.25%, keyword stuffing.
    let stuffed_html = format!(
        "<p>{}{}</p>",
        "comprar casa en cdmx ".repeat(13),
        "palabra ".repeat(348).trim_end()
    );
    let mut stuffed = strong_draft();
    stuffed.html = stuffed_html;
    let stuffed_report = auditor.audit(&stuffed);
    assert!(!stuffed_report.passed(CheckId::KeywordDensity));
    let problem = stuffed_report
        .check(CheckId::KeywordDensity)
        .and_then(|c| c.problem.as_deref())
        .expect("problema registrado");
    assert!(problem.contains("stuffing"));
}

#[test]
fn test_link_checks_classify_by_category() {
    let auditor = SeoAuditor::new();

    // Un solo money link y cero internos.
    let mut draft = strong_draft();
    draft.html = format!(
        "{}<p><a href=\"https://tienda.mx/oferta\">oferta</a></p>",
        "<p>texto</p>".repeat(3)
    );
    let report = auditor.audit(&draft);
    assert!(!report.passed(CheckId::MoneyLinks));
    assert!(!report.passed(CheckId::InternalLinks));
    assert_eq!(report.stats.money_links, 1);
    assert_eq!(report.stats.internal_links, 0);

    // href="#" rompe la sanidad de links aunque haya suficientes.
    let mut broken = strong_draft();
    broken.html = format!("{}<p><a href=\"#\">aquí</a></p>", strong_article_html());
    assert!(!auditor.audit(&broken).passed(CheckId::LinkSanity));
}

#[test]
fn test_image_alt_coverage_requires_all_images() {
    let auditor = SeoAuditor::new();

    let mut missing_alt = strong_draft();
    missing_alt.html = format!("{}<img src=\"/img/extra.jpg\">", strong_article_html());
    let report = auditor.audit(&missing_alt);
    assert!(!report.passed(CheckId::ImageAltCoverage));
    assert_eq!(report.stats.images_total, 2);
    assert_eq!(report.stats.images_with_alt, 1);

    let mut no_images = strong_draft();
    no_images.html = strong_article_html().replace("<img src=\"/img/casa-cdmx.jpg\" alt=\"Fachada de una casa en la Ciudad de México\">", "");
    let report = auditor.audit(&no_images);
    assert!(!report.passed(CheckId::ImageAltCoverage));
    let problem = report
        .check(CheckId::ImageAltCoverage)
        .and_then(|c| c.problem.as_deref())
        .expect("problema registrado");
    assert!(problem.contains("Sin imágenes"));
}

#[test]
fn test_score_composes_from_failed_weights() {
    let auditor = SeoAuditor::new();

    // Solo MetaLength (5 puntos) falla.
    let mut short_meta = strong_draft();
    short_meta.meta_description = "Guía corta de comprar casa en cdmx.".to_string();
    let report = auditor.audit(&short_meta);
    assert!(!report.passed(CheckId::MetaLength));
    assert_eq!(report.score, 95);

    // MetaLength + SlugKeyword (5 + 5) fallan.
    let mut two_failures = short_meta.clone();
    two_failures.slug = "guia-inmobiliaria".to_string();
    let report = auditor.audit(&two_failures);
    assert_eq!(report.failed_checks().len(), 2);
    assert_eq!(report.score, 90);
}

#[test]
fn test_secondary_keywords_satisfy_heading_check() {
    let auditor = SeoAuditor::new();

    // Sin la mención de keyword en H2 el check cae, salvo que una
    // secundaria lo rescate.
    let html = strong_article_html().replace(
        "<h2>Por qué comprar casa en CDMX este año</h2>",
        "<h2>Por qué mudarse a la capital este año</h2>",
    );

    let with_secondary = Draft::new(TITLE, META, SLUG, html.clone(), KEYWORD)
        .with_secondary(vec!["crédito hipotecario".to_string()]);
    assert!(auditor.audit(&with_secondary).passed(CheckId::HeadingKeyword));

    let without_secondary = Draft::new(TITLE, META, SLUG, html, KEYWORD);
    assert!(!auditor
        .audit(&without_secondary)
        .passed(CheckId::HeadingKeyword));
}
