//! Server entry points: MCP over stdio and the JSON HTTP API.
//!
//! Both share one SQLite connection behind `Arc<Mutex<_>>`; handlers do their
//! database work on the blocking pool.

pub mod caller;
pub mod error;
pub mod http;

use crate::config::MnemoConfig;
use crate::db;
use crate::records::project::{ensure_project_identity, GitProbe};
use crate::tools::MnemoTools;
use anyhow::Result;
use rmcp::ServiceExt;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub use caller::Caller;

/// Shared setup: open the database and wrap it with the config for sharing.
fn setup_shared_state(config: MnemoConfig) -> Result<(Arc<Mutex<Connection>>, Arc<MnemoConfig>)> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");
    Ok((Arc::new(Mutex::new(conn)), Arc::new(config)))
}

/// Start the MCP server over stdio transport.
///
/// The caller identity comes from `auth.api_key` and is fixed for the session.
/// The working directory's project identity becomes the default project for
/// tool calls that omit one.
pub async fn serve_stdio(config: MnemoConfig) -> Result<()> {
    tracing::info!("starting mnemo MCP server on stdio");

    let (db, config) = setup_shared_state(config)?;

    let (caller, project) = {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        let caller = caller::resolve_configured_caller(&conn, &config.auth)?;
        let project = match std::env::current_dir() {
            Ok(cwd) => {
                let mut probe = GitProbe::new();
                let identity = ensure_project_identity(&conn, &cwd, &mut probe)?;
                tracing::info!(project = %identity.canonical, source = ?identity.source, "project identity");
                Some(identity.canonical)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot read working directory; no default project");
                None
            }
        };
        (caller, project)
    };

    let tools = MnemoTools::new(db, config, caller, project);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the JSON HTTP API.
pub async fn serve_http(config: MnemoConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.http_host, config.server.http_port);
    tracing::info!(addr = %bind_addr, "starting mnemo HTTP API");

    let (db, config) = setup_shared_state(config)?;
    let router = http::router(http::AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP API listening at http://{bind_addr}/api");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
