//! The run loop: supervisor → worker → merge, until the supervisor finishes
//! or the step limit is hit.
//!
//! One [`Orchestrator`] is built per process and reused for every entity.
//! Runs are strictly sequential and block the calling thread.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use dossier_collectors::{
    HttpScraper, PageScraper, SearchProvider, TavilySearch, default_registries,
};
use dossier_llm::{ResilientClient, StructuredDecoder, backend_from_config};
use dossier_shared::{
    AppConfig, EngineConfig, EntityInput, Notice, NoticeLevel, NoticeSource, Result, RetryPolicy,
    Role, RoutingMode, RunId, RunReport, RunStatus,
};

use crate::merge;
use crate::state::RunState;
use crate::supervisor::{Decision, FinishReason, LlmRouter, RoutingModel, RuleRouter, Supervisor};
use crate::workers::{CollectLimits, Crew, Toolkit};

/// Progress callback for reporting run status.
pub trait RunObserver: Send + Sync {
    /// Called after each supervisor cycle that routes to a worker.
    fn routed(&self, entity: &str, iteration: u32, role: Role);
    /// Called when a worker returns, successfully or not.
    fn worker_done(&self, entity: &str, role: Role, ok: bool);
    /// Called once with the final report.
    fn finished(&self, report: &RunReport);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl RunObserver for SilentObserver {
    fn routed(&self, _entity: &str, _iteration: u32, _role: Role) {}
    fn worker_done(&self, _entity: &str, _role: Role, _ok: bool) {}
    fn finished(&self, _report: &RunReport) {}
}

/// How the loop stopped.
enum Outcome {
    Finished(FinishReason),
    StepLimit,
}

pub struct Orchestrator {
    supervisor: Supervisor,
    crew: Crew,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(supervisor: Supervisor, crew: Crew, config: EngineConfig) -> Self {
        Self {
            supervisor,
            crew,
            config,
        }
    }

    /// Wire the real backend, collaborators and router from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = backend_from_config(&config.llm)?;
        let client = Arc::new(
            ResilientClient::new(backend, RetryPolicy::from(&config.retry))
                .with_payload_logging(config.llm.log_payloads),
        );
        let decoder = Arc::new(StructuredDecoder::new(Arc::clone(&client)));

        let search: Arc<dyn SearchProvider> = Arc::new(TavilySearch::from_config(&config.search)?);
        let scraper: Arc<dyn PageScraper> = Arc::new(HttpScraper::from_config(&config.scrape)?);
        let registries = default_registries(Arc::clone(&search), Arc::clone(&scraper));

        let router: Box<dyn RoutingModel> = match config.run.routing {
            RoutingMode::Llm => Box::new(LlmRouter::new(Arc::clone(&decoder))),
            RoutingMode::Rules => Box::new(RuleRouter),
        };
        info!(routing = ?config.run.routing, "orchestrator ready");

        let engine = EngineConfig::from(config);
        let toolkit = Toolkit {
            client,
            decoder,
            search,
            scraper,
            registries,
            limits: CollectLimits::from(config),
        };

        Ok(Self::new(
            Supervisor::new(router, engine.max_iterations),
            Crew::new(toolkit),
            engine,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one entity with the configured step limit.
    pub fn run(&self, input: &EntityInput, observer: &dyn RunObserver) -> RunReport {
        self.run_with_limit(input, self.config.step_limit, observer)
    }

    /// Run one entity to completion.
    ///
    /// Every supervisor cycle and every worker execution costs one step.
    /// The report always carries the profile assembled so far.
    #[instrument(skip_all, fields(entity = %input.entity_name, step_limit = step_limit))]
    pub fn run_with_limit(
        &self,
        input: &EntityInput,
        step_limit: u32,
        observer: &dyn RunObserver,
    ) -> RunReport {
        let start = Instant::now();
        let run_id = RunId::new();

        if input.entity_name.trim().is_empty() {
            warn!("skipping record with blank entity name");
            let report = RunReport {
                run_id,
                entity_name: input.entity_name.clone(),
                status: RunStatus::Error,
                profile: None,
                notices: Vec::new(),
                error: Some("entity name is blank".into()),
                iterations: 0,
                elapsed_ms: elapsed_ms(start),
            };
            observer.finished(&report);
            return report;
        }

        info!(%run_id, "run started");
        let mut state = RunState::new(input.clone());
        let outcome = self.drive(&mut state, step_limit, observer);

        let (status, error) = match outcome {
            Outcome::Finished(FinishReason::ComplianceReviewed) => (RunStatus::Success, None),
            Outcome::Finished(FinishReason::IterationCap) => {
                state.notices.push(supervisor_notice(
                    NoticeLevel::Warning,
                    format!("Iteration cap of {} reached.", self.supervisor.max_iterations()),
                ));
                (RunStatus::RecursionLimit, None)
            }
            Outcome::StepLimit => {
                state.notices.push(supervisor_notice(
                    NoticeLevel::Warning,
                    format!("Step limit of {step_limit} reached."),
                ));
                (RunStatus::RecursionLimit, None)
            }
            Outcome::Finished(FinishReason::DecisionFailed(message)) => {
                let error = format!("supervisor decision failed: {message}");
                state.notices.push(supervisor_notice(NoticeLevel::Error, error.clone()));
                (RunStatus::Error, Some(error))
            }
        };

        let report = RunReport {
            run_id,
            entity_name: input.entity_name.clone(),
            status,
            profile: Some(state.profile),
            notices: state.notices,
            error,
            iterations: state.iterations,
            elapsed_ms: elapsed_ms(start),
        };

        info!(
            status = report.status.as_str(),
            iterations = report.iterations,
            elapsed_ms = report.elapsed_ms,
            "run finished"
        );
        observer.finished(&report);
        report
    }

    fn drive(&self, state: &mut RunState, step_limit: u32, observer: &dyn RunObserver) -> Outcome {
        let mut steps = 0u32;

        loop {
            steps += 1;
            if steps > step_limit {
                warn!(steps, "step limit reached before supervisor cycle");
                return Outcome::StepLimit;
            }

            let role = match self.supervisor.step(state) {
                Decision::Finish(reason) => return Outcome::Finished(reason),
                Decision::Route(role) => role,
            };
            let entity = state.entity_name().to_string();
            observer.routed(&entity, state.iterations, role);

            steps += 1;
            if steps > step_limit {
                warn!(steps, %role, "step limit reached before worker");
                return Outcome::StepLimit;
            }

            state.attempted.push(role);
            let ok = match self.crew.get(role).run(state) {
                Ok(update) => {
                    if let Some(patch) = update.patch {
                        state.profile = merge::apply(std::mem::take(&mut state.profile), patch);
                    }
                    state.notices.extend(update.notices);
                    true
                }
                Err(e) => {
                    warn!(%role, error = %e.source, "worker failed, continuing");
                    state.notices.push(e.into_notice());
                    false
                }
            };
            observer.worker_done(&entity, role, ok);
        }
    }
}

fn supervisor_notice(level: NoticeLevel, message: impl Into<String>) -> Notice {
    Notice::new(NoticeSource::Supervisor, level, message)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use dossier_collectors::SearchHit;
    use dossier_llm::{ChatRequest, ScriptedBackend};
    use dossier_shared::DossierError;

    use super::*;
    use crate::workers::testing::{FakeRegistry, FakeScraper, FakeSearch, toolkit};

    /// Plays every role of the backend for "Acme Srl".
    fn acme_backend() -> ScriptedBackend {
        ScriptedBackend::from_fn(|request: &ChatRequest| {
            let system = request.messages[0].content.as_str();
            let reply = if system.contains("research supervisor") {
                let called = system.rsplit("Agents called so far: ").next().unwrap_or_default();
                let next = if !called.contains("contact") {
                    "contact"
                } else if !called.contains("metrics") {
                    "metrics"
                } else {
                    "safety"
                };
                format!(r#"{{"next": "{next}"}}"#)
            } else if system.contains("corporate research agent") {
                r#"{"name": "Acme Srl", "description": "Industrial widgets",
                    "industry": "Manufacturing", "website": "acme.it"}"#
                    .to_string()
            } else if system.contains("recruitment research agent") {
                r#"{"contacts": [{"name": "Mario Rossi", "role": "CEO", "email": "mario@acme.it"}]}"#
                    .to_string()
            } else if system.contains("financial analyst") {
                "```json\n{\"revenue\": 1000000, \"employees\": 12}\n```".to_string()
            } else if system.contains("compliance officer") {
                "SAFE".to_string()
            } else {
                return Err(DossierError::Network(format!("unexpected prompt: {system}")));
            };
            Ok(reply)
        })
    }

    fn orchestrator(backend: Arc<ScriptedBackend>, router: Option<Box<dyn RoutingModel>>) -> Orchestrator {
        let search = Arc::new(FakeSearch::default().with(
            "official website",
            vec![SearchHit::new("Acme Srl", "Widgets from Milano", "https://acme.it")],
        ));
        let scraper = Arc::new(FakeScraper {
            contact_pages: vec![("acme.it".into(), "Mario Rossi CEO mario@acme.it".into())],
            ..Default::default()
        });
        let tools = toolkit(
            backend,
            search,
            scraper,
            vec![Arc::new(FakeRegistry("UfficioCamerale", Some("P.IVA 01234567890".into())))],
        );
        let router =
            router.unwrap_or_else(|| Box::new(LlmRouter::new(Arc::clone(&tools.decoder))));
        Orchestrator::new(
            Supervisor::new(router, 10),
            Crew::new(tools),
            EngineConfig::default(),
        )
    }

    /// Always answers the same token.
    struct FixedRouter(&'static str);

    impl RoutingModel for FixedRouter {
        fn decide(&self, _profile_json: &str, _rubric: &str, _attempted: &[Role]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRouter;

    impl RoutingModel for FailingRouter {
        fn decide(&self, _profile_json: &str, _rubric: &str, _attempted: &[Role]) -> Result<String> {
            Err(DossierError::decoding("no JSON object found in reply"))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RunObserver for RecordingObserver {
        fn routed(&self, _entity: &str, iteration: u32, role: Role) {
            self.events.lock().expect("lock").push(format!("{iteration}:{role}"));
        }
        fn worker_done(&self, _entity: &str, role: Role, ok: bool) {
            self.events.lock().expect("lock").push(format!("{role}:{ok}"));
        }
        fn finished(&self, report: &RunReport) {
            self.events.lock().expect("lock").push(report.status.as_str().to_string());
        }
    }

    #[test]
    fn acme_end_to_end_succeeds() {
        let backend = Arc::new(acme_backend());
        let engine = orchestrator(Arc::clone(&backend), None);
        let observer = RecordingObserver::default();

        let report = engine.run(&EntityInput::named("Acme Srl"), &observer);

        assert_eq!(report.status, RunStatus::Success);
        assert!(report.error.is_none());
        assert_eq!(report.iterations, 5);

        let profile = report.profile.expect("profile");
        assert_eq!(profile.name, "Acme Srl");
        assert_eq!(profile.website.as_deref(), Some("acme.it"));
        assert_eq!(profile.contacts.len(), 1);
        assert_eq!(profile.contacts[0].email.as_deref(), Some("mario@acme.it"));
        assert_eq!(profile.metrics.and_then(|m| m.employees), Some(12));

        assert!(report.notices.iter().any(|n| n.is_from(Role::Safety)));
        assert!(report.notices.iter().all(|n| n.level != NoticeLevel::Error));

        assert_eq!(
            *observer.events.lock().expect("lock"),
            [
                "1:legal", "legal:true", "2:contact", "contact:true", "3:metrics",
                "metrics:true", "4:safety", "safety:true", "SUCCESS",
            ]
        );
    }

    #[test]
    fn rule_router_reaches_the_same_result() {
        let backend = Arc::new(acme_backend());
        let engine = orchestrator(Arc::clone(&backend), Some(Box::new(RuleRouter)));

        let report = engine.run(&EntityInput::named("Acme Srl"), &SilentObserver);
        assert_eq!(report.status, RunStatus::Success);
        assert!(
            backend
                .calls()
                .iter()
                .all(|c| !c.messages[0].content.contains("research supervisor"))
        );
    }

    #[test]
    fn step_limit_yields_recursion_limit_with_partial_profile() {
        let engine = orchestrator(Arc::new(acme_backend()), None);

        let report = engine.run_with_limit(&EntityInput::named("Acme Srl"), 3, &SilentObserver);

        assert_eq!(report.status, RunStatus::RecursionLimit);
        assert_eq!(report.profile.expect("profile").name, "Acme Srl");
        assert!(
            report
                .notices
                .iter()
                .any(|n| n.source == NoticeSource::Supervisor && n.message.contains("Step limit"))
        );
    }

    #[test]
    fn iteration_cap_yields_recursion_limit() {
        let backend = Arc::new(ScriptedBackend::from_fn(|request: &ChatRequest| {
            if request.messages[0].content.contains("corporate research agent") {
                Ok(r#"{"name": "Acme Srl"}"#.to_string())
            } else {
                Ok("nothing useful".to_string())
            }
        }));
        let engine = orchestrator(backend, Some(Box::new(FixedRouter("metrics"))));

        let report = engine.run(&EntityInput::named("Acme Srl"), &SilentObserver);

        assert_eq!(report.status, RunStatus::RecursionLimit);
        assert_eq!(report.iterations, 11);
        let failures = report
            .notices
            .iter()
            .filter(|n| n.is_from(Role::Metrics) && n.level == NoticeLevel::Error)
            .count();
        assert_eq!(failures, 9);
    }

    #[test]
    fn invalid_routing_tokens_still_terminate_successfully() {
        let engine = orchestrator(Arc::new(acme_backend()), Some(Box::new(FixedRouter("finance"))));

        let report = engine.run(&EntityInput::named("Acme Srl"), &SilentObserver);

        assert_eq!(report.status, RunStatus::Success);
        assert!(report.iterations <= 10);
        assert_eq!(report.iterations, 3);
        assert!(report.notices.iter().any(|n| n.is_from(Role::Safety)));
        assert_eq!(report.profile.expect("profile").name, "Acme Srl");
    }

    #[test]
    fn decision_failure_is_error_with_message() {
        let engine = orchestrator(Arc::new(acme_backend()), Some(Box::new(FailingRouter)));

        let report = engine.run(&EntityInput::named("Acme Srl"), &SilentObserver);

        assert_eq!(report.status, RunStatus::Error);
        assert!(report.error.as_deref().is_some_and(|e| e.contains("no JSON object")));
        assert_eq!(report.profile.expect("profile").name, "Acme Srl");
    }

    #[test]
    fn blank_entity_is_rejected_without_calls() {
        let backend = Arc::new(acme_backend());
        let engine = orchestrator(Arc::clone(&backend), None);

        let report = engine.run(&EntityInput::named("   "), &SilentObserver);

        assert_eq!(report.status, RunStatus::Error);
        assert!(report.profile.is_none());
        assert_eq!(backend.call_count(), 0);
    }
}
