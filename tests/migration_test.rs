mod helpers;

use mnemo::config::QueryConfig;
use mnemo::db;
use mnemo::db::migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};
use mnemo::records::search::search_observations;
use mnemo::records::{AccessContext, SearchOptions};
use tempfile::TempDir;

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn single_agent_database_upgrades_in_place() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("v1.db");

    // A database written before multi-agent support existed
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        db::schema::init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        conn.execute(
            "INSERT INTO observations (memory_session_id, project, type, title, files_read, \
             created_at, created_at_epoch) \
             VALUES ('s1', 'app', 'bugfix', 'old fix', 'src/main.rs', '2024-01-01T00:00:00Z', 1704067200000)",
            [],
        )
        .unwrap();
    }

    let conn = db::open_database(&db_path).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);

    // Old rows stay readable by an unauthenticated caller, and the
    // non-JSON files column degrades to an empty list.
    let found = search_observations(
        &conn,
        &AccessContext::anonymous(),
        &SearchOptions::default(),
        &QueryConfig::default(),
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].agent, "legacy");
    assert_eq!(found[0].visibility, "project");
    assert!(found[0].files_read.is_empty());

    let report = db::check_database_health(&conn).unwrap();
    assert_eq!(report.agent_count, 0);
    assert_eq!(report.alias_count, 0);
}
