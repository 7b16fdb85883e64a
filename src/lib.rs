//! # seoforge-rs
//!
//! SEO content generation pipeline for multi-client blogs.
//!
//! The crate plans keyword strategies with an AI provider, generates articles
//! through an audit-driven correction loop, injects the required money and
//! internal links deterministically, and records every provider call in an
//! append-only cost ledger. It is a library core: HTTP surfaces, schedulers
//! and CMS connectors live outside.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod html;
pub mod ledger;
pub mod links;
pub mod logging;
pub mod prompt;
pub mod providers;
pub mod router;
pub mod store;
pub mod strategy;
pub mod text;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::{ContentEngine, PipelineOutcome, PipelineStage};
pub use error::{Error, Result};
pub use ledger::CostLedger;
pub use router::AiRouter;
pub use store::MemoryStore;
pub use strategy::KeywordStrategyPlanner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = error::EngineError::NoMoneyPages;
        assert!(err.to_string().contains("money pages"));
    }
}
