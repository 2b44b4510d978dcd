use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindByFileParams {
    #[schemars(description = "File path, absolute or relative to the repository root, or a folder when 'folder' is true")]
    pub path: String,

    #[schemars(description = "Project to search. Defaults to the current project.")]
    pub project: Option<String>,

    #[schemars(description = "Treat 'path' as a folder and match files beneath it")]
    pub folder: Option<bool>,

    #[schemars(description = "With 'folder', only match files directly inside it, not in subfolders")]
    pub direct_children_only: Option<bool>,

    #[schemars(description = "Maximum number of observations and of summaries to return")]
    pub limit: Option<usize>,
}
