//! Compliance worker (`safety`): data-quality checks and a restricted-industry review.
//!
//! Never touches profile fields. Always leaves at least one notice behind, which
//! is what tells the supervisor the review has happened.

use tracing::{info, instrument, warn};

use dossier_llm::ChatRequest;
use dossier_shared::{Notice, NoticeLevel, Role};

use super::{Toolkit, Worker};
use crate::state::{PartialUpdate, RunState, WorkerError};

const SYSTEM_PROMPT: &str = "You are a compliance officer. Check if the company operates in \
    any illegal or restricted industries (e.g., weapons, gambling). Respond with 'SAFE' or \
    'UNSAFE: <reason>'.";

pub struct ComplianceWorker {
    tools: Toolkit,
}

impl ComplianceWorker {
    pub fn new(tools: Toolkit) -> Self {
        Self { tools }
    }
}

/// Outcome of the restricted-industry review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Safe,
    Unsafe,
    Unclear,
}

impl Verdict {
    fn from_reply(reply: &str) -> Self {
        let upper = reply.to_uppercase();
        if upper.contains("UNSAFE") {
            Self::Unsafe
        } else if upper.contains("SAFE") {
            Self::Safe
        } else {
            Self::Unclear
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Unsafe => "UNSAFE",
            Self::Unclear => "UNCLEAR",
        }
    }
}

fn notice(level: NoticeLevel, message: impl Into<String>) -> Notice {
    Notice::from_worker(Role::Safety, level, message)
}

impl Worker for ComplianceWorker {
    fn role(&self) -> Role {
        Role::Safety
    }

    #[instrument(skip_all, fields(entity = %state.entity_name()))]
    fn run(&self, state: &RunState) -> Result<PartialUpdate, WorkerError> {
        info!("compliance worker validating data");
        let profile = &state.profile;
        let mut notices = Vec::new();

        if !profile.is_resolved() {
            notices.push(notice(NoticeLevel::Alert, "Company name missing or invalid."));
        }
        if profile.description.as_deref().is_none_or(|d| d.trim().is_empty()) {
            notices.push(notice(NoticeLevel::Warning, "Description is missing."));
        }
        if profile.contacts.is_empty() {
            notices.push(notice(NoticeLevel::Warning, "No contacts found."));
        }

        let request = ChatRequest::prompt(
            SYSTEM_PROMPT,
            format!(
                "Company: {}\nDescription: {}\nIndustry: {}",
                profile.name,
                profile.description.as_deref().unwrap_or_default(),
                profile.industry.as_deref().unwrap_or_default(),
            ),
        );

        match self.tools.client.invoke(&request) {
            Ok(reply) => {
                let reply = reply.trim();
                let verdict = Verdict::from_reply(reply);
                if verdict == Verdict::Unsafe {
                    notices.push(notice(NoticeLevel::Alert, reply));
                }
                notices.push(notice(
                    NoticeLevel::Info,
                    format!("Compliance review complete: {}", verdict.as_str()),
                ));
            }
            Err(e) => {
                warn!(error = %e, "compliance check call failed");
                notices.push(notice(NoticeLevel::Error, format!("Compliance check failed: {e}")));
            }
        }

        info!(notices = notices.len(), "compliance worker complete");
        Ok(PartialUpdate::notices(notices))
    }
}
