//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            3 => migrate_v2_to_v3(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;

        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: multi-agent support.
///
/// Content rows gain owner/department/visibility columns. Existing rows pick up the
/// legacy defaults, which keeps them readable by unauthenticated callers.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    for table in ["observations", "session_summaries", "user_prompts"] {
        conn.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN agent TEXT NOT NULL DEFAULT 'legacy';
             ALTER TABLE {table} ADD COLUMN department TEXT NOT NULL DEFAULT 'default';
             ALTER TABLE {table} ADD COLUMN visibility TEXT NOT NULL DEFAULT 'project'
                 CHECK(visibility IN ('private','department','project','public'));
             CREATE INDEX IF NOT EXISTS idx_{table}_visibility ON {table}(visibility, department, agent);"
        ))?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            department TEXT NOT NULL DEFAULT 'default',
            permissions TEXT NOT NULL DEFAULT 'read,write',
            api_key_prefix TEXT,
            api_key_hash TEXT UNIQUE,
            verified INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            expires_at INTEGER,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_agents_key_prefix ON agents(api_key_prefix);
        CREATE INDEX IF NOT EXISTS idx_agents_department ON agents(department);

        CREATE TABLE IF NOT EXISTS agent_audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_agent ON agent_audit_log(agent_id, created_at_epoch);
        "#,
    )
}

/// Migration v2 → v3: project aliases for renamed project identities.
fn migrate_v2_to_v3(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS project_aliases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            old_project TEXT NOT NULL,
            new_project TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            UNIQUE(old_project, new_project)
        );

        CREATE INDEX IF NOT EXISTS idx_project_aliases_new ON project_aliases(new_project);
        "#,
    )
}
