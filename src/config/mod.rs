//! Pipeline configuration: types, defaults and the layered loader.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    EngineConfig, LinkConfig, PipelineConfig, ProviderSettings, ProvidersConfig, RoutingConfig,
    TaskRoute,
};
