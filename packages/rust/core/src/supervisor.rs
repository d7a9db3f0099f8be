//! The supervisor: decides which worker acts next, or that the run is over.
//!
//! Each cycle increments the iteration counter, then:
//! 1. finishes if the compliance worker has left any notice, or the cap is exceeded
//! 2. routes to `legal` while the entity name is unresolved
//! 3. otherwise asks the routing model, mapping unknown answers to `safety`

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use dossier_llm::{ChatRequest, StructuredDecoder};
use dossier_shared::{DossierError, Profile, Result, Role, RoutingChoice};

use crate::state::RunState;

/// Routing rules shown to the model (and applied by [`RuleRouter`]).
pub const ROUTING_RUBRIC: &str = "You are a research supervisor managing a team of agents:
- legal: Extracts company name, description, industry, website.
- contact: Extracts key contacts.
- metrics: Extracts financial metrics.
- safety: Validates data and checks compliance.

Your goal is to fully enrich the company profile. Decide who should act next.
Rules:
1. If basic info (description, website) is missing, call 'legal'.
2. If contacts are missing, call 'contact'.
3. If metrics are missing, call 'metrics'.
4. If you have called an agent and it didn't find anything, move to the next step.
5. If all data is present or you have tried everything, call 'safety'.

Respond with ONE word: legal, contact, metrics, safety.";

// ---------------------------------------------------------------------------
// Routing models
// ---------------------------------------------------------------------------

/// Picks the next role from the current profile.
pub trait RoutingModel: Send + Sync {
    /// Returns a raw routing token; the supervisor normalizes it.
    fn decide(&self, profile_json: &str, rubric: &str, attempted: &[Role]) -> Result<String>;
}

/// Asks the generative backend for a [`RoutingChoice`].
pub struct LlmRouter {
    decoder: Arc<StructuredDecoder>,
}

impl LlmRouter {
    pub fn new(decoder: Arc<StructuredDecoder>) -> Self {
        Self { decoder }
    }
}

impl RoutingModel for LlmRouter {
    fn decide(&self, profile_json: &str, rubric: &str, attempted: &[Role]) -> Result<String> {
        let called = if attempted.is_empty() {
            "none".to_string()
        } else {
            attempted.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
        };
        let request = ChatRequest::prompt(
            format!("{rubric}\n\nCurrent State:\n{profile_json}\n\nAgents called so far: {called}"),
            "Who should act next?",
        );
        let choice: RoutingChoice = self.decoder.decode(&request)?;
        Ok(choice.next)
    }
}

/// Applies the rubric without a model call.
///
/// A role that has already run is skipped, which stands in for rule 4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleRouter;

impl RoutingModel for RuleRouter {
    fn decide(&self, profile_json: &str, _rubric: &str, attempted: &[Role]) -> Result<String> {
        let profile: Profile = serde_json::from_str(profile_json)
            .map_err(|e| DossierError::decoding(format!("profile state: {e}")))?;

        let missing_basic = is_blank(&profile.description) || is_blank(&profile.website);
        let gaps = [
            (missing_basic, Role::Legal),
            (profile.contacts.is_empty(), Role::Contact),
            (profile.metrics.is_none(), Role::Metrics),
        ];

        let next = gaps
            .into_iter()
            .find(|(missing, role)| *missing && !attempted.contains(role))
            .map_or(Role::Safety, |(_, role)| role);
        Ok(next.as_str().to_string())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FinishReason {
    /// The compliance worker ran.
    ComplianceReviewed,
    /// The iteration cap was exceeded.
    IterationCap,
    /// The routing model failed.
    DecisionFailed(String),
}

/// One supervisor cycle's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Route(Role),
    Finish(FinishReason),
}

pub struct Supervisor {
    router: Box<dyn RoutingModel>,
    max_iterations: u32,
}

impl Supervisor {
    pub fn new(router: Box<dyn RoutingModel>, max_iterations: u32) -> Self {
        Self {
            router,
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run one cycle: bump the counter, decide, and record the decision.
    pub fn step(&self, state: &mut RunState) -> Decision {
        state.iterations += 1;
        let decision = self.decide(state);
        state.next = match &decision {
            Decision::Route(role) => Some(*role),
            Decision::Finish(_) => None,
        };
        decision
    }

    fn decide(&self, state: &RunState) -> Decision {
        let iteration = state.iterations;

        if state.has_notice_from(Role::Safety) {
            info!(iteration, "compliance reviewed, finishing");
            return Decision::Finish(FinishReason::ComplianceReviewed);
        }
        if iteration > self.max_iterations {
            warn!(iteration, max = self.max_iterations, "iteration cap reached, finishing");
            return Decision::Finish(FinishReason::IterationCap);
        }
        if !state.profile.is_resolved() {
            debug!(iteration, "entity unresolved, routing to legal");
            return Decision::Route(Role::Legal);
        }

        let profile_json = match serde_json::to_string(&state.profile) {
            Ok(json) => json,
            Err(e) => return Decision::Finish(FinishReason::DecisionFailed(e.to_string())),
        };

        match self.router.decide(&profile_json, ROUTING_RUBRIC, &state.attempted) {
            Ok(token) => match Role::from_token(&token) {
                Some(role) => {
                    info!(iteration, next = %role, "supervisor routed");
                    Decision::Route(role)
                }
                None => {
                    warn!(iteration, %token, "invalid routing decision, defaulting to safety");
                    Decision::Route(Role::Safety)
                }
            },
            Err(e) => {
                error!(iteration, error = %e, "routing decision failed");
                Decision::Finish(FinishReason::DecisionFailed(e.to_string()))
            }
        }
    }
}
