//! Error types for the content generation pipeline.

use thiserror::Error;

use crate::providers::{ProviderId, TaskKind};

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type aggregating the component taxonomies
#[derive(Debug, Error)]
pub enum Error {
    /// Provider adapter failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Router failure
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// Usage ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Keyword strategy failure
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Pipeline engine failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure classification for a single provider call.
///
/// Adapters map every network/API fault to exactly one of these kinds;
/// the fallback decision in the router keys off the kind, never off the
/// underlying transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The request exceeded the adapter's configured timeout
    Timeout,
    /// Connection, TLS or non-success HTTP status failure
    Transport,
    /// The provider returned HTTP 429
    RateLimited,
    /// The response body could not be interpreted as a completion
    InvalidResponse,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by a provider adapter for a single `generate` call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request timed out
    #[error("{provider} request timed out after {timeout_secs}s")]
    Timeout {
        provider: ProviderId,
        timeout_secs: u64,
    },

    /// Network or HTTP-status failure
    #[error("transport failure calling {provider}: {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },

    /// Provider throttled the request
    #[error("{provider} rate limited the request")]
    RateLimited { provider: ProviderId },

    /// Response body was not a usable completion
    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse {
        provider: ProviderId,
        message: String,
    },
}

impl ProviderError {
    /// Classification of this failure
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::Transport { .. } => ProviderErrorKind::Transport,
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimited,
            ProviderError::InvalidResponse { .. } => ProviderErrorKind::InvalidResponse,
        }
    }

    /// Provider that produced the failure
    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::RateLimited { provider }
            | ProviderError::InvalidResponse { provider, .. } => *provider,
        }
    }
}

/// Errors surfaced by the router
#[derive(Debug, Error)]
pub enum RouterError {
    /// Primary and fallback both failed (or no distinct fallback existed)
    #[error("all providers failed for {task} task: {detail}")]
    AllProvidersFailed { task: TaskKind, detail: String },

    /// The routing table has no entry for the task
    #[error("no route configured for {0} task")]
    UnknownRoute(TaskKind),
}

/// Errors surfaced by a ledger backend
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Appending a usage record failed
    #[error("ledger append failed: {0}")]
    Append(String),

    /// Reading the record log failed
    #[error("ledger read failed: {0}")]
    Read(String),
}

/// Errors surfaced by the keyword strategy planner
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Strategy calls require at least one registered money page
    #[error("client has no money pages registered")]
    NoMoneyPages,

    /// The model's response failed schema validation; the batch is rejected
    #[error("malformed strategy response: {0}")]
    MalformedResponse(String),

    /// The routed strategy call failed on all providers
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Client does not exist
    #[error("client {0} not found")]
    ClientNotFound(uuid::Uuid),
}

/// Errors surfaced by the content engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Client does not exist
    #[error("client {0} not found")]
    ClientNotFound(uuid::Uuid),

    /// Keyword does not exist
    #[error("keyword {0} not found")]
    KeywordNotFound(uuid::Uuid),

    /// Post does not exist
    #[error("post {0} not found")]
    PostNotFound(uuid::Uuid),

    /// The keyword's client has no money pages registered
    #[error("client has no money pages registered")]
    NoMoneyPages,

    /// Another pipeline run already holds this keyword
    #[error("keyword {0} already has a generation in flight")]
    AlreadyGenerating(uuid::Uuid),

    /// The initial generation call failed on all providers
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(#[source] RouterError),

    /// The run observed engine shutdown between stages
    #[error("pipeline run cancelled")]
    Cancelled,

    /// Publish gate conditions not met
    #[error("publish rejected: {}", .reasons.join("; "))]
    PublishRejected { reasons: Vec<String> },

    /// Requested status change is not a legal transition
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying loader failure (file parse, env merge, deserialize)
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Structurally valid but semantically unusable configuration
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Routing table references a provider with no credentials configured
    #[error("provider {0} referenced by routing table but not configured")]
    MissingProvider(ProviderId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_kind_classification() {
        let err = ProviderError::RateLimited {
            provider: ProviderId::DeepSeek,
        };
        assert_eq!(err.kind(), ProviderErrorKind::RateLimited);
        assert_eq!(err.provider(), ProviderId::DeepSeek);
    }

    #[test]
    fn error_messages_carry_context() {
        let err = ProviderError::Timeout {
            provider: ProviderId::Claude,
            timeout_secs: 60,
        };
        assert_eq!(err.to_string(), "claude request timed out after 60s");

        let err = RouterError::UnknownRoute(TaskKind::Correction);
        assert!(err.to_string().contains("correction"));
    }

    #[test]
    fn publish_rejection_joins_reasons() {
        let err = EngineError::PublishRejected {
            reasons: vec!["seo score 55 below 70".into(), "1 money link".into()],
        };
        assert_eq!(
            err.to_string(),
            "publish rejected: seo score 55 below 70; 1 money link"
        );
    }
}
