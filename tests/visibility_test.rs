mod helpers;

use mnemo::agents;
use mnemo::config::QueryConfig;
use mnemo::records::search::search_observations;
use mnemo::records::{AccessContext, SearchFilters, SearchOptions, Visibility};

fn titles_visible_to(conn: &rusqlite::Connection, agent: Option<&str>) -> Vec<String> {
    let ctx = AccessContext::resolve(conn, agent).unwrap();
    let options = SearchOptions {
        filters: SearchFilters::for_project("acme/app"),
        ..Default::default()
    };
    let mut titles: Vec<String> = search_observations(conn, &ctx, &options, &QueryConfig::default())
        .unwrap()
        .into_iter()
        .filter_map(|o| o.title)
        .collect();
    titles.sort();
    titles
}

#[test]
fn department_colleague_and_outsider_see_different_slices() {
    let mut conn = helpers::test_db();
    helpers::register_agent(&mut conn, "alice@host", "eng");
    helpers::register_agent(&mut conn, "bob@host", "eng");
    helpers::register_agent(&mut conn, "carol@host", "mkt");

    for vis in Visibility::ALL {
        let obs = helpers::observation("acme/app", vis.as_str());
        helpers::insert_observation(&conn, &obs, Some(("alice@host", "eng")), vis.as_str());
    }

    assert_eq!(titles_visible_to(&conn, Some("bob@host")), vec!["department", "project", "public"]);
    assert_eq!(titles_visible_to(&conn, Some("carol@host")), vec!["project", "public"]);
    assert_eq!(
        titles_visible_to(&conn, Some("alice@host")),
        vec!["department", "private", "project", "public"]
    );
    assert_eq!(titles_visible_to(&conn, None), vec!["project", "public"]);
}

#[test]
fn access_matrix_matches_row_filtering() {
    let mut conn = helpers::test_db();
    helpers::register_agent(&mut conn, "alice@host", "eng");
    helpers::register_agent(&mut conn, "bob@host", "eng");
    helpers::register_agent(&mut conn, "carol@host", "mkt");

    // (owner, same department, other department, anonymous)
    let expected = [
        (Visibility::Private, [true, false, false, false]),
        (Visibility::Department, [true, true, false, false]),
        (Visibility::Project, [true, true, true, true]),
        (Visibility::Public, [true, true, true, true]),
    ];
    let callers = [Some("alice@host"), Some("bob@host"), Some("carol@host"), None];

    for (visibility, row) in expected {
        for (caller, allowed) in callers.iter().zip(row) {
            let got = agents::can_access(&conn, *caller, "alice@host", "eng", visibility).unwrap();
            assert_eq!(got, allowed, "{caller:?} reading {visibility}");
        }
    }
}

#[test]
fn legacy_write_is_readable_without_identity() {
    let conn = helpers::test_db();
    let obs = helpers::observation("acme/app", "legacy note");
    mnemo::records::store::store_observation(&conn, &obs, &Default::default()).unwrap();

    let found = search_observations(
        &conn,
        &AccessContext::anonymous(),
        &SearchOptions::default(),
        &QueryConfig::default(),
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].agent, "legacy");
    assert_eq!(found[0].department, "default");
    assert_eq!(found[0].visibility, "project");
}

#[test]
fn unknown_visibility_is_rejected_at_write_time() {
    let conn = helpers::test_db();
    let obs = helpers::observation("acme/app", "bad");
    let meta = mnemo::records::WriteMetadata {
        visibility: Some("everyone".into()),
        ..Default::default()
    };
    let err = mnemo::records::store::store_observation(&conn, &obs, &meta).unwrap_err();
    assert!(matches!(err, mnemo::StoreError::InvalidVisibility(_)));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
