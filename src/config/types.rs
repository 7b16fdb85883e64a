//! Configuration types for the content generation pipeline.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::providers::{ProviderId, ProviderSpec, TaskKind};
use crate::store::PlanTier;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider credentials and HTTP settings
    pub providers: ProvidersConfig,

    /// Task routing table
    pub routing: RoutingConfig,

    /// Pipeline bounds and thresholds
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Link injection minimums and caps
    #[validate(nested)]
    pub links: LinkConfig,

    /// Logging configuration
    pub logging: LogConfig,
}

impl EngineConfig {
    /// Cross-field checks the derive cannot express: link bounds ordering and
    /// routing entries that reference unconfigured providers.
    pub fn check_routing(&self) -> Result<(), ConfigError> {
        if self.links.min_money_links > self.links.max_money_links {
            return Err(ConfigError::Invalid(format!(
                "links.min_money_links ({}) exceeds links.max_money_links ({})",
                self.links.min_money_links, self.links.max_money_links
            )));
        }
        if self.links.min_internal_links > self.links.max_internal_links {
            return Err(ConfigError::Invalid(format!(
                "links.min_internal_links ({}) exceeds links.max_internal_links ({})",
                self.links.min_internal_links, self.links.max_internal_links
            )));
        }
        for spec in self.routing.all_specs() {
            if !self.providers.is_configured(spec.provider) {
                return Err(ConfigError::MissingProvider(spec.provider));
            }
        }
        Ok(())
    }
}

/// Credentials and HTTP settings per provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Anthropic Claude settings
    pub claude: Option<ProviderSettings>,

    /// DeepSeek settings
    pub deepseek: Option<ProviderSettings>,
}

impl ProvidersConfig {
    /// Settings for one provider, if configured
    pub fn get(&self, id: ProviderId) -> Option<&ProviderSettings> {
        match id {
            ProviderId::Claude => self.claude.as_ref(),
            ProviderId::DeepSeek => self.deepseek.as_ref(),
        }
    }

    /// Whether credentials exist for the provider
    pub fn is_configured(&self, id: ProviderId) -> bool {
        self.get(id).is_some()
    }
}

/// Per-provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; never serialized back out, redacted in Debug output
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Override for the provider's API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

/// Task routing table: per-task default spec plus plan-tier overrides,
/// and one global fallback spec
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Route per task kind
    pub tasks: HashMap<TaskKind, TaskRoute>,

    /// Provider tried after the primary fails, for every task
    pub fallback: ProviderSpec,
}

impl RoutingConfig {
    /// Every provider spec reachable from the table
    pub fn all_specs(&self) -> Vec<&ProviderSpec> {
        let mut specs: Vec<&ProviderSpec> = vec![&self.fallback];
        for route in self.tasks.values() {
            specs.push(&route.default);
            specs.extend(route.plan_overrides.values());
        }
        specs
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let sonnet = ProviderSpec::new(ProviderId::Claude, "claude-3-5-sonnet-20241022");
        let haiku = ProviderSpec::new(ProviderId::Claude, "claude-3-haiku-20240307");
        let deepseek = ProviderSpec::new(ProviderId::DeepSeek, "deepseek-chat");

        let mut tasks = HashMap::new();
        tasks.insert(
            TaskKind::Generation,
            TaskRoute {
                default: deepseek.clone(),
                plan_overrides: HashMap::from([
                    (PlanTier::Pro, sonnet.clone()),
                    (PlanTier::Agency, sonnet.clone()),
                ]),
            },
        );
        tasks.insert(
            TaskKind::Correction,
            TaskRoute {
                default: haiku.clone(),
                plan_overrides: HashMap::from([
                    (PlanTier::Pro, sonnet.clone()),
                    (PlanTier::Agency, sonnet.clone()),
                ]),
            },
        );
        tasks.insert(
            TaskKind::Strategy,
            TaskRoute {
                default: sonnet,
                plan_overrides: HashMap::new(),
            },
        );

        Self {
            tasks,
            fallback: haiku,
        }
    }
}

/// Primary provider for a task plus plan-tier escalations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRoute {
    /// Spec used when no override matches the client plan
    pub default: ProviderSpec,

    /// Plan-tier specific escalations
    #[serde(default)]
    pub plan_overrides: HashMap<PlanTier, ProviderSpec>,
}

/// Pipeline bounds and thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum audit score an article must reach
    #[validate(range(min = 1, max = 100))]
    pub min_score: u8,

    /// Correction cycles allowed before the run is forced to failed
    #[validate(range(max = 5))]
    pub max_correction_attempts: u8,

    /// Concurrent pipeline runs allowed in a batch
    #[validate(range(min = 1, max = 64))]
    pub worker_pool: usize,

    /// Published posts offered as internal-link candidates
    #[validate(range(min = 1, max = 20))]
    pub internal_link_candidates: usize,

    /// Word count requested from the model
    #[validate(range(min = 300, max = 10000))]
    pub target_words: u32,

    /// Completion token budget per provider call
    pub max_tokens: u32,

    /// Sampling temperature per provider call
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_score: 70,
            max_correction_attempts: 2,
            worker_pool: num_cpus::get().max(1),
            internal_link_candidates: 5,
            target_words: 1200,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Link injection minimums and caps
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LinkConfig {
    /// Money links every article must end up with
    #[validate(range(min = 1, max = 10))]
    pub min_money_links: usize,

    /// Internal links every article must end up with
    #[validate(range(min = 1, max = 10))]
    pub min_internal_links: usize,

    /// Hard cap on money links after injection
    #[validate(range(min = 1, max = 10))]
    pub max_money_links: usize,

    /// Hard cap on internal links after injection
    #[validate(range(min = 1, max = 10))]
    pub max_internal_links: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            min_money_links: 2,
            min_internal_links: 2,
            max_money_links: 4,
            max_internal_links: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_consistent() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pipeline.min_score, 70);
        assert_eq!(cfg.pipeline.max_correction_attempts, 2);
        assert_eq!(cfg.links.min_money_links, 2);
        // default routing references providers that have no credentials yet
        assert!(cfg.check_routing().is_err());
    }

    #[test]
    fn routing_default_escalates_paid_tiers() {
        let routing = RoutingConfig::default();
        let gen = &routing.tasks[&TaskKind::Generation];
        assert_eq!(gen.default.provider, ProviderId::DeepSeek);
        assert_eq!(
            gen.plan_overrides[&PlanTier::Pro].provider,
            ProviderId::Claude
        );
        assert!(!gen.plan_overrides.contains_key(&PlanTier::Free));
        assert_eq!(routing.fallback.provider, ProviderId::Claude);
    }

    #[test]
    fn link_bounds_ordering_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.links.min_money_links = 6;
        cfg.links.max_money_links = 4;
        assert!(cfg.check_routing().is_err());
    }
}
