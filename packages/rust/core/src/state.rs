//! Per-entity run state and the values workers hand back.

use dossier_shared::{
    DossierError, EntityInput, Notice, NoticeLevel, Profile, ProfilePatch, Role,
};

/// Everything known about one entity while its run is in progress.
///
/// Created once per entity and owned by the run loop. Workers only read it.
#[derive(Debug, Clone)]
pub struct RunState {
    pub input: EntityInput,
    pub profile: Profile,
    pub notices: Vec<Notice>,
    /// The supervisor's latest routing decision (`None` = finish).
    pub next: Option<Role>,
    /// Supervisor cycles so far.
    pub iterations: u32,
    /// Roles dispatched so far, in order.
    pub attempted: Vec<Role>,
}

impl RunState {
    pub fn new(input: EntityInput) -> Self {
        Self {
            input,
            profile: Profile::unresolved(),
            notices: Vec::new(),
            next: None,
            iterations: 0,
            attempted: Vec::new(),
        }
    }

    /// Resolved profile name, or the input name while unresolved.
    pub fn entity_name(&self) -> &str {
        if self.profile.is_resolved() {
            &self.profile.name
        } else {
            &self.input.entity_name
        }
    }

    pub fn has_notice_from(&self, role: Role) -> bool {
        self.notices.iter().any(|n| n.is_from(role))
    }
}

/// A worker's contribution: an optional profile patch plus notices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate {
    pub patch: Option<ProfilePatch>,
    pub notices: Vec<Notice>,
}

impl PartialUpdate {
    pub fn patch(patch: ProfilePatch) -> Self {
        Self {
            patch: Some(patch),
            notices: Vec::new(),
        }
    }

    pub fn notices(notices: Vec<Notice>) -> Self {
        Self {
            patch: None,
            notices,
        }
    }
}

/// A worker failed outright. The run loop records it as an error notice.
#[derive(Debug, thiserror::Error)]
#[error("{role} worker failed: {source}")]
pub struct WorkerError {
    pub role: Role,
    #[source]
    pub source: DossierError,
}

impl WorkerError {
    pub fn new(role: Role, source: DossierError) -> Self {
        Self { role, source }
    }

    pub fn into_notice(self) -> Notice {
        let message = self.to_string();
        Notice::from_worker(self.role, NoticeLevel::Error, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_name_prefers_resolved_profile() {
        let mut state = RunState::new(EntityInput::named("acme"));
        assert_eq!(state.entity_name(), "acme");
        state.profile.name = "Acme Srl".into();
        assert_eq!(state.entity_name(), "Acme Srl");
    }

    #[test]
    fn worker_error_becomes_error_notice() {
        let notice = WorkerError::new(Role::Metrics, DossierError::decoding("no JSON object"))
            .into_notice();
        assert!(notice.is_from(Role::Metrics));
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("metrics worker failed"));
        assert!(notice.message.contains("no JSON object"));
    }
}
