//! Access-scoped, filtered reads over observations, summaries and prompts.
//!
//! Every query goes through [`QueryBuilder`], whose constructor attaches the
//! caller's visibility predicate. A project filter is expanded through the alias
//! resolver so records written under a project's old names come back too, with
//! the canonical project winning ordering ties.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use tracing::debug;

use super::access::AccessContext;
use super::aliases::expand_project;
use super::filters::{is_direct_child, OrderBy, QueryBuilder, SearchOptions, SqlFragment};
use super::types::{parse_string_array, Observation, SessionSummary, UserPrompt};
use crate::config::QueryConfig;
use crate::error::{Result, StoreError};

const OBSERVATION_COLUMNS: &str = "o.id, o.memory_session_id, o.project, o.type, o.title, \
     o.subtitle, o.narrative, o.text, o.facts, o.concepts, o.files_read, o.files_modified, \
     o.prompt_number, o.discovery_tokens, o.agent, o.department, o.visibility, o.created_at, \
     o.created_at_epoch";

const SUMMARY_COLUMNS: &str = "s.id, s.memory_session_id, s.project, s.request, s.investigated, \
     s.learned, s.completed, s.next_steps, s.notes, s.files_read, s.files_edited, \
     s.prompt_number, s.agent, s.department, s.visibility, s.created_at, s.created_at_epoch";

const PROMPT_COLUMNS: &str = "p.id, p.content_session_id, p.project, p.prompt_number, \
     p.prompt_text, p.agent, p.department, p.visibility, p.created_at, p.created_at_epoch";

// ── Public types ──────────────────────────────────────────────────────────────

/// How [`find_by_file`] interprets its path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    pub project: Option<String>,
    /// Treat the path as a folder and match anything beneath it.
    pub folder: bool,
    /// With `folder`, keep only records touching files directly inside it.
    pub direct_children_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileMatches {
    pub observations: Vec<Observation>,
    pub summaries: Vec<SessionSummary>,
}

// ── Public API ────────────────────────────────────────────────────────────────

pub fn search_observations(
    conn: &Connection,
    ctx: &AccessContext,
    options: &SearchOptions,
    config: &QueryConfig,
) -> Result<Vec<Observation>> {
    let filters = &options.filters;
    let mut builder = QueryBuilder::new(ctx, "o");
    let canonical = apply_project(conn, &mut builder, filters.project.as_deref(), config)?;
    builder.types(&filters.types)?;
    if let Some(range) = &filters.date_range {
        builder.date_range(range)?;
    }
    builder.json_contains_any("concepts", &filters.concepts);
    builder.files_any(&["files_read", "files_modified"], &filters.files)?;

    let select = Select {
        columns: OBSERVATION_COLUMNS,
        table: "observations o",
        fts_table: Some("observations_fts"),
        builder,
        canonical,
    };
    select.run(
        conn,
        options.query.as_deref(),
        options.order_by,
        config.clamp_limit(options.limit),
        options.offset,
        row_to_observation,
    )
}

pub fn search_summaries(
    conn: &Connection,
    ctx: &AccessContext,
    options: &SearchOptions,
    config: &QueryConfig,
) -> Result<Vec<SessionSummary>> {
    let filters = &options.filters;
    if !filters.types.is_empty() {
        return Err(StoreError::InvalidFilter(
            "summaries have no type; remove the types filter".into(),
        ));
    }
    if !filters.concepts.is_empty() {
        return Err(StoreError::InvalidFilter(
            "summaries have no concepts; remove the concepts filter".into(),
        ));
    }

    let mut builder = QueryBuilder::new(ctx, "s");
    let canonical = apply_project(conn, &mut builder, filters.project.as_deref(), config)?;
    if let Some(range) = &filters.date_range {
        builder.date_range(range)?;
    }
    builder.files_any(&["files_read", "files_edited"], &filters.files)?;

    let select = Select {
        columns: SUMMARY_COLUMNS,
        table: "session_summaries s",
        fts_table: Some("session_summaries_fts"),
        builder,
        canonical,
    };
    select.run(
        conn,
        options.query.as_deref(),
        options.order_by,
        config.clamp_limit(options.limit),
        options.offset,
        row_to_summary,
    )
}

pub fn search_prompts(
    conn: &Connection,
    ctx: &AccessContext,
    options: &SearchOptions,
    config: &QueryConfig,
) -> Result<Vec<UserPrompt>> {
    let filters = &options.filters;
    if !filters.types.is_empty() || !filters.concepts.is_empty() || !filters.files.is_empty() {
        return Err(StoreError::InvalidFilter(
            "prompts support only project, date range and text filters".into(),
        ));
    }

    let mut builder = QueryBuilder::new(ctx, "p");
    let canonical = apply_project(conn, &mut builder, filters.project.as_deref(), config)?;
    if let Some(range) = &filters.date_range {
        builder.date_range(range)?;
    }

    let select = Select {
        columns: PROMPT_COLUMNS,
        table: "user_prompts p",
        fts_table: None,
        builder,
        canonical,
    };
    select.run(
        conn,
        options.query.as_deref(),
        options.order_by,
        config.clamp_limit(options.limit),
        options.offset,
        row_to_prompt,
    )
}

/// Hydrate observations by id, silently dropping ids the caller may not read.
pub fn get_observations_by_ids(
    conn: &Connection,
    ctx: &AccessContext,
    ids: &[i64],
) -> Result<Vec<Observation>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new(ctx, "o");
    builder.push(SqlFragment::new(
        format!("o.id IN ({})", vec!["?"; ids.len()].join(", ")),
        ids.iter().map(|id| Value::Integer(*id)).collect(),
    ));
    let (where_sql, params) = builder.into_parts();
    let sql = format!(
        "SELECT {OBSERVATION_COLUMNS} FROM observations o WHERE {where_sql} ORDER BY o.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), row_to_observation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Observations and summaries that read or changed `path`.
///
/// In folder mode with `direct_children_only`, rows are over-fetched by the
/// configured factor and filtered here, since "directly inside" is not
/// expressible against the JSON arrays in SQL.
pub fn find_by_file(
    conn: &Connection,
    ctx: &AccessContext,
    path: &str,
    query: &FileQuery,
    config: &QueryConfig,
) -> Result<FileMatches> {
    let limit = config.clamp_limit(query.limit);
    let direct = query.folder && query.direct_children_only;
    let fetch = if direct {
        limit.saturating_mul(config.folder_overfetch_factor.max(1))
    } else {
        limit
    };

    let mut obs_builder = QueryBuilder::new(ctx, "o");
    let obs_canonical =
        apply_project(conn, &mut obs_builder, query.project.as_deref(), config)?;
    let mut sum_builder = QueryBuilder::new(ctx, "s");
    let sum_canonical =
        apply_project(conn, &mut sum_builder, query.project.as_deref(), config)?;

    if query.folder {
        obs_builder.files_under(&["files_read", "files_modified"], path)?;
        sum_builder.files_under(&["files_read", "files_edited"], path)?;
    } else {
        let files = [path.to_string()];
        obs_builder.files_any(&["files_read", "files_modified"], &files)?;
        sum_builder.files_any(&["files_read", "files_edited"], &files)?;
    }

    let mut observations = Select {
        columns: OBSERVATION_COLUMNS,
        table: "observations o",
        fts_table: None,
        builder: obs_builder,
        canonical: obs_canonical,
    }
    .run(conn, None, OrderBy::DateDesc, fetch, 0, row_to_observation)?;

    let mut summaries = Select {
        columns: SUMMARY_COLUMNS,
        table: "session_summaries s",
        fts_table: None,
        builder: sum_builder,
        canonical: sum_canonical,
    }
    .run(conn, None, OrderBy::DateDesc, fetch, 0, row_to_summary)?;

    if direct {
        let fetched = (observations.len(), summaries.len());
        observations.retain(|o| {
            o.files_read
                .iter()
                .chain(&o.files_modified)
                .any(|f| is_direct_child(f, path))
        });
        summaries.retain(|s| {
            s.files_read
                .iter()
                .chain(&s.files_edited)
                .any(|f| is_direct_child(f, path))
        });
        debug!(
            folder = path,
            fetched_observations = fetched.0,
            fetched_summaries = fetched.1,
            kept_observations = observations.len(),
            kept_summaries = summaries.len(),
            "filtered folder matches to direct children"
        );
    }
    observations.truncate(limit);
    summaries.truncate(limit);

    Ok(FileMatches {
        observations,
        summaries,
    })
}

// ── Internals ─────────────────────────────────────────────────────────────────

/// Add the alias-expanded project filter. Returns the canonical name when the
/// expansion produced more than one project, for tie-breaking.
fn apply_project(
    conn: &Connection,
    builder: &mut QueryBuilder,
    project: Option<&str>,
    config: &QueryConfig,
) -> Result<Option<String>> {
    let Some(project) = project.filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let expanded = expand_project(conn, project, config.max_project_aliases)?;
    builder.project_in(&expanded.projects);
    if expanded.projects.len() > 1 {
        Ok(expanded.canonical().map(str::to_string))
    } else {
        Ok(None)
    }
}

struct Select {
    columns: &'static str,
    table: &'static str,
    fts_table: Option<&'static str>,
    builder: QueryBuilder,
    canonical: Option<String>,
}

impl Select {
    fn run<T>(
        mut self,
        conn: &Connection,
        text: Option<&str>,
        order_by: OrderBy,
        limit: usize,
        offset: usize,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let alias = self.builder.alias();
        let text = text.map(escape_fts_query).filter(|t| !t.is_empty());

        let mut join = String::new();
        let mut ranked = false;
        if let Some(text) = &text {
            match self.fts_table {
                Some(fts) => {
                    join = format!(" JOIN {fts} ON {fts}.rowid = {alias}.id");
                    self.builder.push(SqlFragment::new(
                        format!("{fts} MATCH ?"),
                        vec![Value::Text(text.clone())],
                    ));
                    ranked = true;
                }
                None => {
                    // no FTS index here: fall back to a literal substring match
                    let raw = text.replace('"', "");
                    self.builder.push(SqlFragment::new(
                        format!("{alias}.prompt_text LIKE ? ESCAPE '\\'"),
                        vec![Value::Text(format!("%{}%", escape_like(&raw)))],
                    ));
                }
            }
        }

        if order_by == OrderBy::Relevance && !ranked {
            debug!("relevance ordering without a text query; using date order");
        }

        let (where_sql, mut params) = self.builder.into_parts();
        let tie_break = match &self.canonical {
            Some(canonical) => {
                params.push(Value::Text(canonical.clone()));
                format!("CASE WHEN {alias}.project = ? THEN 0 ELSE 1 END, ")
            }
            None => String::new(),
        };
        let order = match (order_by, ranked) {
            (OrderBy::Relevance, true) => format!(
                "{}.rank, {tie_break}{alias}.id DESC",
                self.fts_table.unwrap_or_default()
            ),
            (OrderBy::DateAsc, _) => {
                format!("{alias}.created_at_epoch ASC, {tie_break}{alias}.id ASC")
            }
            _ => format!("{alias}.created_at_epoch DESC, {tie_break}{alias}.id DESC"),
        };

        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));
        let sql = format!(
            "SELECT {} FROM {}{join} WHERE {where_sql} ORDER BY {order} LIMIT ? OFFSET ?",
            self.columns, self.table
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), map)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Each whitespace-delimited word becomes a quoted term, so operators in the
/// input are matched literally (implicit AND).
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "")))
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        memory_session_id: row.get(1)?,
        project: row.get(2)?,
        obs_type: row.get(3)?,
        title: row.get(4)?,
        subtitle: row.get(5)?,
        narrative: row.get(6)?,
        text: row.get(7)?,
        facts: parse_string_array(row.get(8)?),
        concepts: parse_string_array(row.get(9)?),
        files_read: parse_string_array(row.get(10)?),
        files_modified: parse_string_array(row.get(11)?),
        prompt_number: row.get(12)?,
        discovery_tokens: row.get(13)?,
        agent: row.get(14)?,
        department: row.get(15)?,
        visibility: row.get(16)?,
        created_at: row.get(17)?,
        created_at_epoch: row.get(18)?,
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get(0)?,
        memory_session_id: row.get(1)?,
        project: row.get(2)?,
        request: row.get(3)?,
        investigated: row.get(4)?,
        learned: row.get(5)?,
        completed: row.get(6)?,
        next_steps: row.get(7)?,
        notes: row.get(8)?,
        files_read: parse_string_array(row.get(9)?),
        files_edited: parse_string_array(row.get(10)?),
        prompt_number: row.get(11)?,
        agent: row.get(12)?,
        department: row.get(13)?,
        visibility: row.get(14)?,
        created_at: row.get(15)?,
        created_at_epoch: row.get(16)?,
    })
}

fn row_to_prompt(row: &Row<'_>) -> rusqlite::Result<UserPrompt> {
    Ok(UserPrompt {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        project: row.get(2)?,
        prompt_number: row.get(3)?,
        prompt_text: row.get(4)?,
        agent: row.get(5)?,
        department: row.get(6)?,
        visibility: row.get(7)?,
        created_at: row.get(8)?,
        created_at_epoch: row.get(9)?,
    })
}
