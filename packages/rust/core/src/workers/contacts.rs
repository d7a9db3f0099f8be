//! Contact worker (`contact`): key people and their emails.

use tracing::{info, instrument};

use dossier_collectors::truncate_chars;
use dossier_llm::ChatRequest;
use dossier_shared::{ContactList, ProfilePatch, Role};

use super::{Toolkit, Worker};
use crate::state::{PartialUpdate, RunState, WorkerError};

const SYSTEM_PROMPT: &str = "You are a recruitment research agent. Extract a list of key \
    contacts (Name, Role, Email) from the provided text.\n\
    Prioritize contacts found on the company website.\n\
    Valid emails are crucial. Generic emails (info@, sales@) are acceptable ONLY if no personal \
    emails are found.";

pub struct ContactWorker {
    tools: Toolkit,
}

impl ContactWorker {
    pub fn new(tools: Toolkit) -> Self {
        Self { tools }
    }
}

impl Worker for ContactWorker {
    fn role(&self) -> Role {
        Role::Contact
    }

    #[instrument(skip_all, fields(entity = %state.entity_name()))]
    fn run(&self, state: &RunState) -> Result<PartialUpdate, WorkerError> {
        let company = state.entity_name();
        info!("contact worker starting");

        let mut context = String::new();

        if let Some(website) = state.profile.website.as_deref().filter(|w| !w.trim().is_empty()) {
            info!(%website, "scraping website for contacts");
            if let Some(text) = self.tools.scraper.contact_page_text(website) {
                context.push_str("\n\nWebsite Content:\n");
                context.push_str(truncate_chars(&text, self.tools.limits.max_contact_chars));
            }
        }

        context.push_str("\n\nSearch Results:\n");
        context.push_str(&self.tools.search_context(&format!(
            "{company} key executives leadership team CEO CTO contacts email"
        )));

        let request = ChatRequest::prompt(
            SYSTEM_PROMPT,
            format!("Company: {company}\n\nContext:\n{context}\n\nExtract contacts."),
        );

        let list: ContactList = self
            .tools
            .decoder
            .decode(&request)
            .map_err(|e| WorkerError::new(Role::Contact, e))?;

        let contacts: Vec<_> = list
            .contacts
            .into_iter()
            .filter(|c| !c.name.trim().is_empty())
            .collect();

        info!(found = contacts.len(), "contact worker finished");
        Ok(PartialUpdate::patch(ProfilePatch::contacts(contacts)))
    }
}
