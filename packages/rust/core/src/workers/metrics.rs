//! Metrics worker (`metrics`): revenue, headcount, growth.

use tracing::{info, instrument};

use dossier_llm::ChatRequest;
use dossier_shared::{Metrics, ProfilePatch, Role};

use super::{Toolkit, Worker};
use crate::state::{PartialUpdate, RunState, WorkerError};

const SYSTEM_PROMPT: &str =
    "You are a financial analyst. Extract revenue, employee count, and growth rate.";

pub struct MetricsWorker {
    tools: Toolkit,
}

impl MetricsWorker {
    pub fn new(tools: Toolkit) -> Self {
        Self { tools }
    }
}

impl Worker for MetricsWorker {
    fn role(&self) -> Role {
        Role::Metrics
    }

    #[instrument(skip_all, fields(entity = %state.entity_name()))]
    fn run(&self, state: &RunState) -> Result<PartialUpdate, WorkerError> {
        let company = state.entity_name();
        info!("metrics worker starting");

        let context = self.tools.search_context(&format!(
            "{company} annual revenue number of employees growth rate financial metrics"
        ));
        let request = ChatRequest::prompt(
            SYSTEM_PROMPT,
            format!("Company: {company}\n\nSearch Results:\n{context}\n\nExtract Metrics."),
        );

        let metrics: Metrics = self
            .tools
            .decoder
            .decode(&request)
            .map_err(|e| WorkerError::new(Role::Metrics, e))?;

        info!(
            revenue = ?metrics.revenue,
            employees = ?metrics.employees,
            growth_rate = ?metrics.growth_rate,
            "metrics worker finished"
        );
        Ok(PartialUpdate::patch(ProfilePatch::metrics(metrics)))
    }
}
