pub mod agent;
pub mod alias;
pub mod doctor;
pub mod files;
pub mod search;
pub mod stats;

use anyhow::Result;
use mnemo::config::MnemoConfig;
use mnemo::server::caller::{resolve_configured_caller, Caller};
use rusqlite::Connection;

/// Open the configured database.
fn open(config: &MnemoConfig) -> Result<Connection> {
    mnemo::db::open_database(config.resolved_db_path())
}

/// The identity CLI reads run as: the configured key's agent, or legacy.
fn caller(conn: &Connection, config: &MnemoConfig) -> Result<Caller> {
    resolve_configured_caller(conn, &config.auth)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
