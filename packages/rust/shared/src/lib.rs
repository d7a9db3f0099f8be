//! Shared types, error model, and configuration for Dossier.
//!
//! This crate is the foundation depended on by all other Dossier crates.
//! It provides:
//! - The unified error type ([`DossierError`])
//! - Domain types ([`Profile`], [`Contact`], [`Metrics`], [`Notice`], [`RunReport`])
//! - Decodable records and their schemas ([`Structured`])
//! - Configuration ([`AppConfig`], [`RetryPolicy`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod schema;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EngineConfig, LlmConfig, Provider, RetryConfig, RetryPolicy, RoutingMode,
    RunConfig, ScrapeConfig, SearchConfig, apply_env_overrides, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{DossierError, Result};
pub use schema::{ContactList, ProfileFacts, RoutingChoice, Structured};
pub use types::{
    Contact, EntityInput, Metrics, Notice, NoticeLevel, NoticeSource, Profile, ProfilePatch,
    Role, RunId, RunReport, RunStatus, UNRESOLVED_NAME,
};
