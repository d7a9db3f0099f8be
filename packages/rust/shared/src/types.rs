//! Core domain types for Dossier runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder name carried by a profile until the profile worker resolves it.
pub const UNRESOLVED_NAME: &str = "Unknown";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A key person at the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Full name. The dedup key inside a profile.
    pub name: String,
    /// Job title or role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            email: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Financial and headcount signals. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Annual revenue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    /// Total number of employees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employees: Option<u64>,
    /// Year-over-year growth rate (signed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<f64>,
}

/// The accumulating record for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl Profile {
    /// An empty profile whose name is still the unresolved placeholder.
    pub fn unresolved() -> Self {
        Self {
            name: UNRESOLVED_NAME.to_string(),
            description: None,
            industry: None,
            website: None,
            contacts: Vec::new(),
            metrics: None,
        }
    }

    /// Whether the profile worker has produced a usable name yet.
    pub fn is_resolved(&self) -> bool {
        let name = self.name.trim();
        !name.is_empty() && name != UNRESOLVED_NAME
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// A worker's proposed contribution to a [`Profile`].
///
/// `None` / empty means "no opinion"; it never clears a known value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl ProfilePatch {
    pub fn contacts(contacts: Vec<Contact>) -> Self {
        Self {
            contacts,
            ..Default::default()
        }
    }

    pub fn metrics(metrics: Metrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Roles and notices
// ---------------------------------------------------------------------------

/// The fixed pool of worker roles the supervisor can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Resolves name, description, industry and website.
    Legal,
    /// Discovers key contacts.
    Contact,
    /// Extracts financial/headcount metrics.
    Metrics,
    /// Compliance review; always the last stage of a run.
    Safety,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Legal, Role::Contact, Role::Metrics, Role::Safety];

    /// Routing token used in prompts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Contact => "contact",
            Self::Metrics => "metrics",
            Self::Safety => "safety",
        }
    }

    /// Parse a routing token. Tolerates surrounding whitespace, quotes and case.
    pub fn from_token(token: &str) -> Option<Self> {
        let normalized = token
            .trim()
            .trim_matches(|c| c == '\'' || c == '"' || c == '`' || c == '.')
            .trim()
            .to_lowercase();
        Self::ALL.into_iter().find(|r| r.as_str() == normalized)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who attached a notice to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "role")]
pub enum NoticeSource {
    Worker(Role),
    Supervisor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Alert,
    Error,
}

/// A timestamped diagnostic note attached to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub source: NoticeSource,
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(source: NoticeSource, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            source,
            level,
            message: message.into(),
        }
    }

    /// Shorthand for a notice emitted by a worker.
    pub fn from_worker(role: Role, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::new(NoticeSource::Worker(role), level, message)
    }

    pub fn is_from(&self, role: Role) -> bool {
        self.source == NoticeSource::Worker(role)
    }
}

// ---------------------------------------------------------------------------
// Driver boundary
// ---------------------------------------------------------------------------

/// One input record handed to the engine by a driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityInput {
    pub entity_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl EntityInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            entity_name: name.into(),
            ..Default::default()
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The compliance review ran and the supervisor finished normally.
    Success,
    /// The iteration cap or the driver's step limit stopped the run.
    RecursionLimit,
    /// The run was cut short by a failure outside the workers.
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::RecursionLimit => "RECURSION_LIMIT",
            Self::Error => "ERROR",
        }
    }
}

/// The output record of one entity's run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub entity_name: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub iterations: u32,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_profile_defaults() {
        let profile = Profile::default();
        assert_eq!(profile.name, UNRESOLVED_NAME);
        assert!(!profile.is_resolved());
        assert!(profile.contacts.is_empty());
        assert!(profile.metrics.is_none());
    }

    #[test]
    fn blank_name_is_not_resolved() {
        let mut profile = Profile::unresolved();
        profile.name = "   ".into();
        assert!(!profile.is_resolved());
        profile.name = "Acme Srl".into();
        assert!(profile.is_resolved());
    }

    #[test]
    fn role_tokens_are_lenient() {
        assert_eq!(Role::from_token("contact"), Some(Role::Contact));
        assert_eq!(Role::from_token("  'Metrics' "), Some(Role::Metrics));
        assert_eq!(Role::from_token("\"SAFETY\"."), Some(Role::Safety));
        assert_eq!(Role::from_token("finance"), None);
        assert_eq!(Role::from_token(""), None);
    }

    #[test]
    fn run_status_serializes_upper_snake() {
        let json = serde_json::to_string(&RunStatus::RecursionLimit).expect("serialize");
        assert_eq!(json, r#""RECURSION_LIMIT""#);
        assert_eq!(RunStatus::Success.as_str(), "SUCCESS");
    }

    #[test]
    fn notice_source_serialization() {
        let notice = Notice::from_worker(Role::Safety, NoticeLevel::Alert, "UNSAFE: gambling");
        let json = serde_json::to_value(&notice).expect("serialize");
        assert_eq!(json["source"]["kind"], "worker");
        assert_eq!(json["source"]["role"], "safety");
        assert_eq!(json["level"], "alert");
        assert!(notice.is_from(Role::Safety));
        assert!(!notice.is_from(Role::Legal));
    }

    #[test]
    fn entity_input_accepts_minimal_record() {
        let input: EntityInput =
            serde_json::from_str(r#"{"entity_name":"Acme Srl"}"#).expect("deserialize");
        assert_eq!(input.entity_name, "Acme Srl");
        assert!(input.domain.is_none());
    }

    #[test]
    fn patch_skips_empty_fields() {
        let patch = ProfilePatch::metrics(Metrics {
            employees: Some(5),
            ..Default::default()
        });
        let json = serde_json::to_string(&patch).expect("serialize");
        assert_eq!(json, r#"{"metrics":{"employees":5}}"#);
    }
}
