use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreObservationParams {
    #[schemars(description = "Session the observation belongs to")]
    pub memory_session_id: String,

    #[schemars(description = "Project the observation belongs to. Defaults to the current project.")]
    pub project: Option<String>,

    #[schemars(
        description = "Observation type: 'decision', 'bugfix', 'feature', 'refactor', 'discovery' or 'change'"
    )]
    pub r#type: String,

    #[schemars(description = "Short title")]
    pub title: Option<String>,

    #[schemars(description = "One-line elaboration of the title")]
    pub subtitle: Option<String>,

    #[schemars(description = "Longer free-form account of what happened")]
    pub narrative: Option<String>,

    #[schemars(description = "Raw text content")]
    pub text: Option<String>,

    #[schemars(description = "Discrete facts learned")]
    pub facts: Option<Vec<String>>,

    #[schemars(description = "Concept tags")]
    pub concepts: Option<Vec<String>>,

    #[schemars(description = "Files read while producing this observation")]
    pub files_read: Option<Vec<String>>,

    #[schemars(description = "Files modified while producing this observation")]
    pub files_modified: Option<Vec<String>>,

    #[schemars(description = "Index of the prompt within the session")]
    pub prompt_number: Option<i64>,

    #[schemars(
        description = "Who may read it: 'private' (only you), 'department', 'project' (default) or 'public'"
    )]
    pub visibility: Option<String>,
}
