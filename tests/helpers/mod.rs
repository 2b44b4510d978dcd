#![allow(dead_code)]

use mnemo::agents;
use mnemo::config::AuthConfig;
use mnemo::db;
use mnemo::records::store::{store_observation, store_summary};
use mnemo::records::types::{NewObservation, NewSummary};
use mnemo::records::{ObservationType, WriteMetadata};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Register an agent and return its plaintext key.
pub fn register_agent(conn: &mut Connection, id: &str, department: &str) -> String {
    agents::register(conn, id, Some(department), None, &AuthConfig::default())
        .unwrap()
        .api_key
        .unwrap()
}

/// Register an agent with an explicit permission list and return its key.
pub fn register_with_permissions(
    conn: &mut Connection,
    id: &str,
    department: &str,
    permissions: &[&str],
) -> String {
    agents::register(conn, id, Some(department), Some(permissions), &AuthConfig::default())
        .unwrap()
        .api_key
        .unwrap()
}

pub fn observation(project: &str, title: &str) -> NewObservation {
    NewObservation {
        memory_session_id: "session-1".into(),
        project: project.into(),
        obs_type: ObservationType::Discovery,
        title: Some(title.into()),
        subtitle: None,
        narrative: None,
        text: None,
        facts: Vec::new(),
        concepts: Vec::new(),
        files_read: Vec::new(),
        files_modified: Vec::new(),
        prompt_number: None,
        discovery_tokens: 0,
    }
}

/// Store an observation owned by `agent` (or legacy when `None`).
pub fn insert_observation(
    conn: &Connection,
    obs: &NewObservation,
    agent: Option<(&str, &str)>,
    visibility: &str,
) -> i64 {
    let meta = WriteMetadata {
        agent: agent.map(|(id, _)| id.to_string()),
        department: agent.map(|(_, dept)| dept.to_string()),
        visibility: Some(visibility.to_string()),
    };
    store_observation(conn, obs, &meta).unwrap()
}

/// Store a summary touching `files_edited`.
pub fn insert_summary(conn: &Connection, project: &str, request: &str, files_edited: &[&str]) -> i64 {
    let summary = NewSummary {
        memory_session_id: "session-1".into(),
        project: project.into(),
        request: Some(request.into()),
        files_edited: files_edited.iter().map(|f| f.to_string()).collect(),
        ..Default::default()
    };
    store_summary(conn, &summary, &WriteMetadata::default()).unwrap()
}

/// Pin an observation's creation time (epoch milliseconds).
pub fn set_created_epoch(conn: &Connection, id: i64, epoch_ms: i64) {
    conn.execute(
        "UPDATE observations SET created_at_epoch = ?1 WHERE id = ?2",
        rusqlite::params![epoch_ms, id],
    )
    .unwrap();
}
