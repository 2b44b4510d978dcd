pub mod find_by_file;
pub mod search_observations;
pub mod store_observation;

use find_by_file::FindByFileParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;
use search_observations::{SearchObservationsParams, SearchSummariesParams};
use std::sync::{Arc, Mutex};
use store_observation::StoreObservationParams;

use crate::config::MnemoConfig;
use crate::records::search::{self, FileQuery};
use crate::records::store;
use crate::records::types::{NewObservation, ObservationType};
use crate::server::Caller;

/// The mnemo MCP tool handler. Holds shared state (db connection, config, the
/// session's caller identity and default project) and exposes the tools via the
/// `#[tool_router]` macro.
#[derive(Clone)]
pub struct MnemoTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    config: Arc<MnemoConfig>,
    caller: Arc<Caller>,
    project: Option<Arc<str>>,
}

#[tool_router]
impl MnemoTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        config: Arc<MnemoConfig>,
        caller: Caller,
        project: Option<String>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            config,
            caller: Arc::new(caller),
            project: project.map(Arc::from),
        }
    }

    /// Search observations visible to this session's caller.
    #[tool(description = "Search observations (decisions, bugfixes, features, refactors, discoveries, changes) by project, type, concept, file, date range or keywords. Only records you are allowed to read are returned.")]
    async fn search_observations(
        &self,
        Parameters(params): Parameters<SearchObservationsParams>,
    ) -> Result<String, String> {
        let options = params
            .into_options(self.project.as_deref())
            .map_err(|e| e.to_string())?;
        tracing::info!(
            project = options.filters.project.as_deref().unwrap_or("*"),
            query = options.query.as_deref().unwrap_or(""),
            "search_observations called"
        );
        let ctx = self.caller.access();
        let results = self
            .with_db(move |conn, config| {
                search::search_observations(conn, &ctx, &options, &config.query)
            })
            .await?;
        let count = results.len();
        to_json(&serde_json::json!({ "results": results, "count": count }))
    }

    /// Search session summaries visible to this session's caller.
    #[tool(description = "Search session summaries (request, investigation, learnings, next steps) by project, file, date range or keywords.")]
    async fn search_summaries(
        &self,
        Parameters(params): Parameters<SearchSummariesParams>,
    ) -> Result<String, String> {
        let options = params
            .into_options(self.project.as_deref())
            .map_err(|e| e.to_string())?;
        tracing::info!(
            project = options.filters.project.as_deref().unwrap_or("*"),
            "search_summaries called"
        );
        let ctx = self.caller.access();
        let results = self
            .with_db(move |conn, config| {
                search::search_summaries(conn, &ctx, &options, &config.query)
            })
            .await?;
        let count = results.len();
        to_json(&serde_json::json!({ "results": results, "count": count }))
    }

    /// Find observations and summaries that touched a file or folder.
    #[tool(description = "Find observations and session summaries that read or modified a file, or any file in a folder.")]
    async fn find_by_file(
        &self,
        Parameters(params): Parameters<FindByFileParams>,
    ) -> Result<String, String> {
        tracing::info!(path = %params.path, folder = params.folder.unwrap_or(false), "find_by_file called");
        let query = FileQuery {
            project: params
                .project
                .or_else(|| self.project.as_deref().map(str::to_string)),
            folder: params.folder.unwrap_or(false),
            direct_children_only: params.direct_children_only.unwrap_or(false),
            limit: params.limit,
        };
        let ctx = self.caller.access();
        let path = params.path;
        let matches = self
            .with_db(move |conn, config| {
                search::find_by_file(conn, &ctx, &path, &query, &config.query)
            })
            .await?;
        to_json(&matches)
    }

    /// Store an observation owned by this session's caller.
    #[tool(description = "Store an observation about work done in this session. Visibility: private, department, project (default) or public.")]
    async fn store_observation(
        &self,
        Parameters(params): Parameters<StoreObservationParams>,
    ) -> Result<String, String> {
        if !self.caller.can_write() {
            return Err("this agent does not have write permission".into());
        }
        let obs_type: ObservationType = params.r#type.parse()?;
        let project = params
            .project
            .or_else(|| self.project.as_deref().map(str::to_string))
            .ok_or("project is required: no current project could be detected")?;

        let observation = NewObservation {
            memory_session_id: params.memory_session_id,
            project,
            obs_type,
            title: params.title,
            subtitle: params.subtitle,
            narrative: params.narrative,
            text: params.text,
            facts: params.facts.unwrap_or_default(),
            concepts: params.concepts.unwrap_or_default(),
            files_read: params.files_read.unwrap_or_default(),
            files_modified: params.files_modified.unwrap_or_default(),
            prompt_number: params.prompt_number,
            discovery_tokens: 0,
        };
        let meta = self.caller.write_metadata(params.visibility);

        tracing::info!(
            project = %observation.project,
            obs_type = %obs_type,
            agent = self.caller.agent_id().unwrap_or("legacy"),
            "store_observation called"
        );

        let id = self
            .with_db(move |conn, _| store::store_observation(conn, &observation, &meta))
            .await?;
        to_json(&serde_json::json!({ "id": id }))
    }
}

impl MnemoTools {
    /// Run sync DB work on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, String>
    where
        F: FnOnce(&Connection, &MnemoConfig) -> crate::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| format!("db lock poisoned: {e}"))?;
            f(&conn, &config).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))?
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_handler]
impl ServerHandler for MnemoTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "mnemo stores observations from coding sessions. Use search_observations and \
                 search_summaries to recall past work, find_by_file to see what touched a file, \
                 and store_observation to record new work."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
