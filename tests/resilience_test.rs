use mnemo::agents;
use mnemo::config::AuthConfig;
use mnemo::db;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.observation_count, 0);
    assert_eq!(report.audit_count, 0);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");

    let conn = db::open_database(&db_path).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[test]
fn lockout_survives_reopening_the_database() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");
    let config = AuthConfig::default();

    let key = {
        let mut conn = db::open_database(&db_path).unwrap();
        let key = agents::register(&mut conn, "alice@host", None, None, &config)
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..agents::keys::KEY_PREFIX_LEN], "f".repeat(64));
        for _ in 0..config.max_failed_attempts {
            agents::find_by_key(&conn, &wrong, &config).unwrap();
        }
        key
    };

    let conn = db::open_database(&db_path).unwrap();
    assert!(matches!(
        agents::find_by_key(&conn, &key, &config),
        Err(mnemo::StoreError::Locked { .. })
    ));
}

#[test]
fn concurrent_wrong_keys_from_two_connections_are_all_counted() {
    const PER_THREAD: u32 = 100;

    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("shared.db");
    let config = AuthConfig {
        max_failed_attempts: 100_000,
        ..AuthConfig::default()
    };

    let wrong = {
        let mut conn = db::open_database(&db_path).unwrap();
        let key = agents::register(&mut conn, "alice@host", None, None, &config)
            .unwrap()
            .api_key
            .unwrap();
        format!("{}{}", &key[..agents::keys::KEY_PREFIX_LEN], "a".repeat(64))
    };

    let connections = [
        db::open_database(&db_path).unwrap(),
        db::open_database(&db_path).unwrap(),
    ];
    let (wrong, config) = (&wrong, &config);
    let errors: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = connections
            .into_iter()
            .map(|conn| {
                scope.spawn(move || {
                    (0..PER_THREAD)
                        .filter_map(|_| agents::find_by_key(&conn, wrong, config).err())
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });
    assert!(errors.is_empty(), "{} failed, first: {:?}", errors.len(), errors.first());

    let conn = db::open_database(&db_path).unwrap();
    let agent = agents::get_agent(&conn, "alice@host").unwrap().unwrap();
    assert_eq!(agent.failed_attempts, 2 * PER_THREAD);

    let audited: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM agent_audit_log WHERE agent_id = 'alice@host' AND action = 'verify_failed'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(audited, i64::from(2 * PER_THREAD));
}
