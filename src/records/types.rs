//! Content record definitions.
//!
//! Defines [`Visibility`] (the four read-access levels), [`ObservationType`], the
//! read models returned by queries ([`Observation`], [`SessionSummary`],
//! [`UserPrompt`]) and the insert payloads used by the write path.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Read-access level attached to every content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the owning agent.
    Private,
    /// Agents in the record's department.
    Department,
    /// Everyone, until project membership exists.
    Project,
    Public,
}

impl Visibility {
    pub const ALL: [Visibility; 4] = [
        Visibility::Private,
        Visibility::Department,
        Visibility::Project,
        Visibility::Public,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Department => "department",
            Self::Project => "project",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "department" => Ok(Self::Department),
            "project" => Ok(Self::Project),
            "public" => Ok(Self::Public),
            _ => Err(StoreError::InvalidVisibility(s.to_string())),
        }
    }
}

/// Kind of work an observation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    Decision,
    Bugfix,
    Feature,
    Refactor,
    Discovery,
    Change,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Discovery => "discovery",
            Self::Change => "change",
        }
    }
}

impl std::fmt::Display for ObservationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObservationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "bugfix" => Ok(Self::Bugfix),
            "feature" => Ok(Self::Feature),
            "refactor" => Ok(Self::Refactor),
            "discovery" => Ok(Self::Discovery),
            "change" => Ok(Self::Change),
            _ => Err(format!("unknown observation type: {s}")),
        }
    }
}

/// An observation row as returned by queries.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    #[serde(rename = "type")]
    pub obs_type: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub narrative: Option<String>,
    pub text: Option<String>,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub files_read: Vec<String>,
    pub files_modified: Vec<String>,
    pub prompt_number: Option<i64>,
    pub discovery_tokens: i64,
    pub agent: String,
    pub department: String,
    pub visibility: String,
    pub created_at: String,
    /// Epoch milliseconds.
    pub created_at_epoch: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: i64,
    pub memory_session_id: String,
    pub project: String,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub files_read: Vec<String>,
    pub files_edited: Vec<String>,
    pub prompt_number: Option<i64>,
    pub agent: String,
    pub department: String,
    pub visibility: String,
    pub created_at: String,
    pub created_at_epoch: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPrompt {
    pub id: i64,
    pub content_session_id: String,
    pub project: String,
    pub prompt_number: i64,
    pub prompt_text: String,
    pub agent: String,
    pub department: String,
    pub visibility: String,
    pub created_at: String,
    pub created_at_epoch: i64,
}

/// Insert payload for an observation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewObservation {
    pub memory_session_id: String,
    pub project: String,
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub prompt_number: Option<i64>,
    #[serde(default)]
    pub discovery_tokens: i64,
}

/// Insert payload for a session summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewSummary {
    pub memory_session_id: String,
    pub project: String,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub files_read: Vec<String>,
    pub files_edited: Vec<String>,
    pub prompt_number: Option<i64>,
}

/// Insert payload for a user prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrompt {
    pub content_session_id: String,
    pub project: String,
    pub prompt_number: i64,
    pub prompt_text: String,
}

/// Decode a JSON-array column, tolerating NULL and legacy non-JSON values.
pub(crate) fn parse_string_array(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}
