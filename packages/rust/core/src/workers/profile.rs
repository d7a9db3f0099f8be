//! Profile worker (`legal`): official name, description, industry, website.

use tracing::{info, instrument};

use dossier_collectors::truncate_chars;
use dossier_llm::ChatRequest;
use dossier_shared::{ProfileFacts, ProfilePatch, Role};

use super::{Toolkit, Worker};
use crate::state::{PartialUpdate, RunState, WorkerError};

const SYSTEM_PROMPT: &str = "You are a corporate research agent. Extract the official company \
    name, description, industry, and website from the search results.";

pub struct ProfileWorker {
    tools: Toolkit,
}

impl ProfileWorker {
    pub fn new(tools: Toolkit) -> Self {
        Self { tools }
    }

    /// Search results, input hints and registry extracts for the prompt.
    fn gather_context(&self, state: &RunState) -> String {
        let company = &state.input.entity_name;
        let mut context = self.tools.search_context(&format!(
            "{company} official website company description industry headquarters"
        ));

        let hints: Vec<String> = [
            ("Known domain", &state.input.domain),
            ("Industry hint", &state.input.industry),
            ("City", &state.input.city),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect();
        if !hints.is_empty() {
            context.push_str("\n\nInput Hints:\n");
            context.push_str(&hints.join("\n"));
        }

        for registry in &self.tools.registries {
            if let Some(text) = registry.lookup(company).filter(|t| !t.trim().is_empty()) {
                context.push_str(&format!(
                    "\n\n{} Data:\n{}",
                    registry.name(),
                    truncate_chars(&text, self.tools.limits.max_registry_chars)
                ));
            }
        }

        context
    }
}

impl Worker for ProfileWorker {
    fn role(&self) -> Role {
        Role::Legal
    }

    #[instrument(skip_all, fields(entity = %state.input.entity_name))]
    fn run(&self, state: &RunState) -> Result<PartialUpdate, WorkerError> {
        let company = &state.input.entity_name;
        info!("profile worker starting");

        let context = self.gather_context(state);
        let request = ChatRequest::prompt(
            SYSTEM_PROMPT,
            format!(
                "Company: {company}\n\nSearch Results:\n{context}\n\n\
                 Extract CompanyInfo (ignore contacts/metrics for now)."
            ),
        );

        let facts: ProfileFacts = self
            .tools
            .decoder
            .decode(&request)
            .map_err(|e| WorkerError::new(Role::Legal, e))?;

        info!(name = %facts.name, "profile worker resolved entity");
        Ok(PartialUpdate::patch(ProfilePatch::from(facts)))
    }
}
