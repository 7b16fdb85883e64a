//! Keyword Strategy Integration Tests
//!
//! Runs the planner end to end with a scripted provider: the prompt must
//! carry the client's store state, valid batches persist atomically and
//! feed the pending queue, and failed calls persist nothing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use seoforge_rs::config::{EngineConfig, RoutingConfig, TaskRoute};
use seoforge_rs::error::{ProviderError, StrategyError};
use seoforge_rs::ledger::CostLedger;
use seoforge_rs::providers::{
    AiProvider, GenerationParams, Prompt, ProviderId, ProviderReply, ProviderSpec, TaskKind,
};
use seoforge_rs::router::AiRouter;
use seoforge_rs::store::{Client, KeywordStatus, MemoryStore, MoneyPage, PlanTier, SeoKeyword};
use seoforge_rs::strategy::KeywordStrategyPlanner;

fn init_test_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

const TWO_CLUSTER_JSON: &str = r#"{
    "clusters": [
        {
            "name": "Compra de departamentos",
            "pillar_keyword": "comprar depa en cdmx",
            "pillar_title": "Comprar depa en CDMX: guía 2025",
            "keywords": [
                {"keyword": "comprar depa en cdmx", "intent": "transaccional", "priority": 5},
                {"keyword": "depas en preventa", "priority": 4}
            ]
        },
        {
            "name": "Crédito hipotecario",
            "pillar_keyword": "crédito hipotecario cdmx",
            "keywords": [
                {"keyword": "mejores tasas hipotecarias", "priority": 3},
                {"keyword": "requisitos infonavit"}
            ]
        }
    ],
    "suggested_calendar": "un pillar al mes, dos soportes por semana"
}"#;

/// Adapter que guarda los prompts recibidos. `body: None` simula caída.
struct ScriptedStrategyProvider {
    body: Option<String>,
    seen: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl AiProvider for ScriptedStrategyProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    fn model(&self) -> &str {
        "claude-3-5-sonnet-20241022"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError> {
        self.seen.lock().expect("seen lock").push(prompt.clone());
        match &self.body {
            Some(body) => Ok(ProviderReply {
                content: body.clone(),
                tokens_in: 420,
                tokens_out: 900,
                cost_usd: 0.0135,
            }),
            None => Err(ProviderError::Transport {
                provider: ProviderId::Claude,
                message: "strategy outage".to_string(),
            }),
        }
    }
}

fn build_planner(
    body: Option<&str>,
) -> (
    KeywordStrategyPlanner,
    Arc<MemoryStore>,
    Arc<ScriptedStrategyProvider>,
    CostLedger,
) {
    let spec = ProviderSpec::new(ProviderId::Claude, "claude-3-5-sonnet-20241022");
    let mut tasks = std::collections::HashMap::new();
    tasks.insert(
        TaskKind::Strategy,
        TaskRoute {
            default: spec.clone(),
            plan_overrides: std::collections::HashMap::new(),
        },
    );
    let routing = RoutingConfig {
        tasks,
        fallback: spec.clone(),
    };

    let provider = Arc::new(ScriptedStrategyProvider {
        body: body.map(String::from),
        seen: Mutex::new(Vec::new()),
    });
    let ledger = CostLedger::in_memory();
    let router = Arc::new(AiRouter::with_adapters(
        routing,
        vec![(spec, provider.clone() as Arc<dyn AiProvider>)],
        ledger.clone(),
    ));
    let store = Arc::new(MemoryStore::new());
    let planner = KeywordStrategyPlanner::new(store.clone(), router, &EngineConfig::default());
    (planner, store, provider, ledger)
}

fn seeded_client(store: &MemoryStore) -> Client {
    let client = store.register_client(Client::new(
        "Inmobiliaria Centro",
        "https://inmobiliaria-centro.mx",
        PlanTier::Starter,
    ));
    store.register_money_page(
        MoneyPage::new(
            client.id,
            "https://inmobiliaria-centro.mx/departamentos",
            "Departamentos en venta",
            5,
        )
        .with_category("ventas"),
    );
    client
}

#[tokio::test]
async fn test_plan_prompt_carries_store_context() {
    init_test_logger();

    let (planner, store, provider, _ledger) = build_planner(Some(TWO_CLUSTER_JSON));
    let client = seeded_client(&store);
    store.insert_keyword(SeoKeyword::new(client.id, "hipoteca para jóvenes"));

    planner.plan(client.id, 6).await.expect("plan");

    let seen = provider.seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 1);
    let user = &seen[0].user;
    assert!(user.contains("NEGOCIO: Inmobiliaria Centro"));
    assert!(user.contains("https://inmobiliaria-centro.mx/departamentos"));
    assert!(user.contains("categoría: ventas"));
    assert!(user.contains("KEYWORDS YA USADAS (no repetir): hipoteca para jóvenes"));
    assert!(user.contains("Genera 6 keywords"));
    assert!(seen[0].system.contains("sin texto adicional ni backticks"));
}

#[tokio::test]
async fn test_multi_cluster_batch_persists_atomically() {
    init_test_logger();

    let (planner, store, _provider, _ledger) = build_planner(Some(TWO_CLUSTER_JSON));
    let client = seeded_client(&store);

    let outcome = planner.plan(client.id, 4).await.expect("plan");
    assert_eq!(outcome.cluster_ids.len(), 2);
    assert_eq!(outcome.keyword_ids.len(), 4);
    assert_eq!(
        outcome.suggested_calendar.as_deref(),
        Some("un pillar al mes, dos soportes por semana")
    );

    let clusters = store.clusters_for(client.id);
    assert_eq!(clusters.len(), 2);
    assert!(clusters.iter().all(|c| c.keywords_total == 2));
    assert!(clusters.iter().all(|c| c.keywords_used == 0));

    let keywords = store.keywords_for(client.id);
    assert_eq!(keywords.len(), 4);
    assert!(keywords
        .iter()
        .all(|k| k.status == KeywordStatus::Pending && k.cluster_id.is_some()));
    let transactional = keywords
        .iter()
        .find(|k| k.keyword == "comprar depa en cdmx")
        .expect("keyword del pillar");
    assert_eq!(transactional.intent.as_deref(), Some("transaccional"));
    assert_eq!(transactional.priority, 5);
}

#[tokio::test]
async fn test_planned_keywords_enter_the_pending_queue() {
    let (planner, store, _provider, _ledger) = build_planner(Some(TWO_CLUSTER_JSON));
    let client = seeded_client(&store);

    planner.plan(client.id, 4).await.expect("plan");

    let queue = store.pending_queue(10);
    assert_eq!(queue.len(), 4);
    // Prioridad descendente; empates en orden de inserción.
    assert_eq!(queue[0].keyword, "comprar depa en cdmx");
    assert_eq!(queue[1].keyword, "depas en preventa");
    assert_eq!(queue[2].priority, 3);
    assert_eq!(queue[3].priority, 3);
}

#[tokio::test]
async fn test_router_failure_persists_nothing() {
    init_test_logger();

    let (planner, store, provider, ledger) = build_planner(None);
    let client = seeded_client(&store);

    let err = planner.plan(client.id, 4).await.expect_err("caída total");
    assert!(matches!(err, StrategyError::Router(_)));
    assert_eq!(provider.seen.lock().expect("seen lock").len(), 1);
    assert!(store.keywords_for(client.id).is_empty());
    assert!(store.clusters_for(client.id).is_empty());

    let records = ledger.records_for_client(client.id).await.expect("ledger");
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].task, TaskKind::Strategy);
}

#[tokio::test]
async fn test_strategy_call_is_ledgered() {
    let (planner, store, _provider, ledger) = build_planner(Some(TWO_CLUSTER_JSON));
    let client = seeded_client(&store);

    planner.plan(client.id, 4).await.expect("plan");

    let records = ledger.records_for_client(client.id).await.expect("ledger");
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].task, TaskKind::Strategy);
    assert_eq!(records[0].model, "claude-3-5-sonnet-20241022");
    assert_eq!(records[0].cost_usd, 0.0135);
    assert_eq!(records[0].tokens_out, 900);
}
