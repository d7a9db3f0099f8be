//! Supervised enrichment of business profiles.
//!
//! A [`Supervisor`] routes each entity through a fixed crew of extraction
//! workers, merging their partial updates into one [`Profile`](dossier_shared::Profile)
//! until the compliance review has run or a limit is hit. The
//! [`Orchestrator`] drives that loop and produces a
//! [`RunReport`](dossier_shared::RunReport).

pub mod engine;
pub mod merge;
pub mod state;
pub mod supervisor;
pub mod workers;

pub use engine::{Orchestrator, RunObserver, SilentObserver};
pub use merge::{apply, merge};
pub use state::{PartialUpdate, RunState, WorkerError};
pub use supervisor::{
    Decision, FinishReason, LlmRouter, ROUTING_RUBRIC, RoutingModel, RuleRouter, Supervisor,
};
pub use workers::{
    CollectLimits, ComplianceWorker, ContactWorker, Crew, MetricsWorker, ProfileWorker, Toolkit,
    Worker,
};
