//! Records that can be decoded from model output, with their JSON schemas.
//!
//! The schema is handed to the backend for native structured output and is
//! pretty-printed into the prompt when falling back to plain-text decoding.
//! Schemas are sent in strict mode, so every object lists all of its
//! properties as required and optional values are expressed as nullable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{Contact, Metrics, ProfilePatch};

/// A record type the structured decoder can produce.
pub trait Structured: DeserializeOwned {
    /// Schema name reported to backends (`[a-zA-Z0-9_-]` only).
    const NAME: &'static str;

    /// JSON Schema describing the record's shape.
    fn json_schema() -> Value;
}

fn nullable(kind: &str, description: &str) -> Value {
    json!({ "type": [kind, "null"], "description": description })
}

fn contact_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Full name of the contact" },
            "role": nullable("string", "Job title or role"),
            "email": nullable("string", "Email address"),
        },
        "required": ["name", "role", "email"],
        "additionalProperties": false,
    })
}

/// Identity facts produced by the profile worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFacts {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl Structured for ProfileFacts {
    const NAME: &'static str = "company_info";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Official company name" },
                "description": nullable("string", "Brief company description"),
                "industry": nullable("string", "Primary industry sector"),
                "website": nullable("string", "Company website URL"),
            },
            "required": ["name", "description", "industry", "website"],
            "additionalProperties": false,
        })
    }
}

impl From<ProfileFacts> for ProfilePatch {
    fn from(facts: ProfileFacts) -> Self {
        Self {
            name: Some(facts.name),
            description: facts.description,
            industry: facts.industry,
            website: facts.website,
            ..Default::default()
        }
    }
}

/// Contacts extracted by the contact worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactList {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl Structured for ContactList {
    const NAME: &'static str = "contacts_result";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "contacts": {
                    "type": "array",
                    "description": "List of key contacts",
                    "items": contact_schema(),
                },
            },
            "required": ["contacts"],
            "additionalProperties": false,
        })
    }
}

impl Structured for Metrics {
    const NAME: &'static str = "metrics";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "revenue": nullable("number", "Annual revenue"),
                "employees": nullable("integer", "Total number of employees"),
                "growth_rate": nullable("number", "Year-over-year growth rate"),
            },
            "required": ["revenue", "employees", "growth_rate"],
            "additionalProperties": false,
        })
    }
}

/// The supervisor's routing answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingChoice {
    pub next: String,
}

impl Structured for RoutingChoice {
    const NAME: &'static str = "routing_choice";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "next": {
                    "type": "string",
                    "enum": ["legal", "contact", "metrics", "safety"],
                    "description": "The worker that should act next",
                },
            },
            "required": ["next"],
            "additionalProperties": false,
        })
    }
}
