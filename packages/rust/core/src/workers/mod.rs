//! Extraction workers and the dispatch table the run loop routes through.
//!
//! Each worker reads the [`RunState`], gathers context from the collectors,
//! asks the backend for one structured record, and returns a
//! [`PartialUpdate`]. Workers never mutate state themselves.

mod compliance;
mod contacts;
mod metrics;
mod profile;

use std::sync::Arc;

use dossier_collectors::{PageScraper, RegistryLookup, SearchProvider, format_hits};
use dossier_llm::{ResilientClient, StructuredDecoder};
use dossier_shared::{AppConfig, Role};

use crate::state::{PartialUpdate, RunState, WorkerError};

pub use compliance::ComplianceWorker;
pub use contacts::ContactWorker;
pub use metrics::MetricsWorker;
pub use profile::ProfileWorker;

/// One role in the fixed worker pool.
pub trait Worker: Send + Sync {
    fn role(&self) -> Role;

    fn run(&self, state: &RunState) -> Result<PartialUpdate, WorkerError>;
}

// ---------------------------------------------------------------------------
// Toolkit
// ---------------------------------------------------------------------------

/// Size limits applied to collected context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectLimits {
    pub max_results: usize,
    pub max_contact_chars: usize,
    pub max_registry_chars: usize,
}

impl Default for CollectLimits {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CollectLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_results: config.search.max_results,
            max_contact_chars: config.scrape.max_contact_chars,
            max_registry_chars: config.scrape.max_registry_chars,
        }
    }
}

/// Shared handles every worker is built from.
#[derive(Clone)]
pub struct Toolkit {
    pub client: Arc<ResilientClient>,
    pub decoder: Arc<StructuredDecoder>,
    pub search: Arc<dyn SearchProvider>,
    pub scraper: Arc<dyn PageScraper>,
    pub registries: Vec<Arc<dyn RegistryLookup>>,
    pub limits: CollectLimits,
}

impl Toolkit {
    /// Search and render the hits as prompt context.
    pub(crate) fn search_context(&self, query: &str) -> String {
        format_hits(&self.search.search(query, self.limits.max_results))
    }
}

// ---------------------------------------------------------------------------
// Crew
// ---------------------------------------------------------------------------

/// Dispatch table: exactly one worker per [`Role`].
pub struct Crew {
    legal: Box<dyn Worker>,
    contact: Box<dyn Worker>,
    metrics: Box<dyn Worker>,
    safety: Box<dyn Worker>,
}

impl Crew {
    /// The standard four workers sharing one toolkit.
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            legal: Box::new(ProfileWorker::new(toolkit.clone())),
            contact: Box::new(ContactWorker::new(toolkit.clone())),
            metrics: Box::new(MetricsWorker::new(toolkit.clone())),
            safety: Box::new(ComplianceWorker::new(toolkit)),
        }
    }

    /// Assemble a crew from arbitrary workers, one per role.
    pub fn from_workers(
        legal: Box<dyn Worker>,
        contact: Box<dyn Worker>,
        metrics: Box<dyn Worker>,
        safety: Box<dyn Worker>,
    ) -> Self {
        Self {
            legal,
            contact,
            metrics,
            safety,
        }
    }

    pub fn get(&self, role: Role) -> &dyn Worker {
        match role {
            Role::Legal => self.legal.as_ref(),
            Role::Contact => self.contact.as_ref(),
            Role::Metrics => self.metrics.as_ref(),
            Role::Safety => self.safety.as_ref(),
        }
    }
}
