//! Search filter types and the parameterized WHERE-clause builder.
//!
//! [`QueryBuilder::new`] attaches the visibility predicate before anything else,
//! so every statement built here is access-scoped. Filters are appended as
//! `AND`-ed clauses with positional `?` parameters collected alongside.

use rusqlite::types::Value;

use super::access::{visibility_predicate, AccessContext};
use super::types::ObservationType;
use crate::error::{Result, StoreError};

// ── SQL fragments ─────────────────────────────────────────────────────────────

/// A piece of SQL and the values bound to its `?` placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

// ── Filters and options ───────────────────────────────────────────────────────

/// Inclusive bounds on `created_at_epoch` (milliseconds). Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Canonical project; expanded through registered aliases.
    pub project: Option<String>,
    /// One type compiles to `=`, several to `IN`.
    pub types: Vec<String>,
    pub date_range: Option<DateRange>,
    /// Any-of membership in the record's concepts array.
    pub concepts: Vec<String>,
    /// Any-of match against the record's file arrays.
    pub files: Vec<String>,
}

impl SearchFilters {
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Self::default()
        }
    }

    /// Parse a comma-separated list the way the CLI and HTTP query strings send it.
    pub fn split_list(raw: Option<&str>) -> Vec<String> {
        raw.map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    #[default]
    DateDesc,
    DateAsc,
    /// FTS rank. Only meaningful together with a text query.
    Relevance,
}

impl std::str::FromStr for OrderBy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date_desc" => Ok(Self::DateDesc),
            "date_asc" => Ok(Self::DateAsc),
            "relevance" => Ok(Self::Relevance),
            other => Err(StoreError::InvalidFilter(format!("unknown order_by: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub filters: SearchFilters,
    /// `None` takes the configured default; values are clamped to the configured max.
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    /// Free text matched against the legacy FTS5 index.
    pub query: Option<String>,
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Accumulates `AND`-ed WHERE clauses for one aliased table.
#[derive(Debug)]
pub(crate) struct QueryBuilder {
    alias: &'static str,
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl QueryBuilder {
    pub(crate) fn new(ctx: &AccessContext, alias: &'static str) -> Self {
        let mut builder = Self {
            alias,
            clauses: Vec::new(),
            params: Vec::new(),
        };
        builder.push(visibility_predicate(ctx, alias));
        builder
    }

    pub(crate) fn alias(&self) -> &'static str {
        self.alias
    }

    pub(crate) fn push(&mut self, fragment: SqlFragment) {
        self.clauses.push(fragment.sql);
        self.params.extend(fragment.params);
    }

    pub(crate) fn project_in(&mut self, projects: &[String]) {
        if projects.is_empty() {
            return;
        }
        let sql = match projects.len() {
            1 => format!("{}.project = ?", self.alias),
            n => format!("{}.project IN ({})", self.alias, placeholders(n)),
        };
        let params = projects.iter().cloned().map(Value::Text).collect();
        self.push(SqlFragment::new(sql, params));
    }

    /// Restrict to the given observation types. Unknown type names are rejected.
    pub(crate) fn types(&mut self, types: &[String]) -> Result<()> {
        if types.is_empty() {
            return Ok(());
        }
        for t in types {
            t.parse::<ObservationType>()
                .map_err(StoreError::InvalidFilter)?;
        }
        let sql = match types.len() {
            1 => format!("{}.type = ?", self.alias),
            n => format!("{}.type IN ({})", self.alias, placeholders(n)),
        };
        let params = types.iter().cloned().map(Value::Text).collect();
        self.push(SqlFragment::new(sql, params));
        Ok(())
    }

    pub(crate) fn date_range(&mut self, range: &DateRange) -> Result<()> {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(StoreError::InvalidFilter(format!(
                    "date range start {start} is after end {end}"
                )));
            }
        }
        if let Some(start) = range.start {
            self.push(SqlFragment::new(
                format!("{}.created_at_epoch >= ?", self.alias),
                vec![Value::Integer(start)],
            ));
        }
        if let Some(end) = range.end {
            self.push(SqlFragment::new(
                format!("{}.created_at_epoch <= ?", self.alias),
                vec![Value::Integer(end)],
            ));
        }
        Ok(())
    }

    /// Any of `values` is an element of the JSON array in `column`.
    pub(crate) fn json_contains_any(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let sql = format!(
            "EXISTS (SELECT 1 FROM json_each({}) WHERE value IN ({}))",
            json_array_expr(self.alias, column),
            placeholders(values.len())
        );
        let params = values.iter().cloned().map(Value::Text).collect();
        self.push(SqlFragment::new(sql, params));
    }

    /// Any of `files` matches an element of any of the JSON arrays in `columns`.
    pub(crate) fn files_any(&mut self, columns: &[&str], files: &[String]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let mut alternatives = Vec::new();
        let mut params = Vec::new();
        for file in files {
            let path = normalize_path(file)?;
            for column in columns {
                let fragment = file_match(self.alias, column, &path);
                alternatives.push(fragment.sql);
                params.extend(fragment.params);
            }
        }
        self.push(SqlFragment::new(
            format!("({})", alternatives.join(" OR ")),
            params,
        ));
        Ok(())
    }

    /// Some element of the JSON arrays in `columns` lies anywhere under `folder`.
    pub(crate) fn files_under(&mut self, columns: &[&str], folder: &str) -> Result<()> {
        let folder = normalize_path(folder)?;
        let prefix = format!("{folder}/");
        let segment = format!("/{folder}/");
        let mut alternatives = Vec::new();
        let mut params = Vec::new();
        for column in columns {
            alternatives.push(format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE substr(value, 1, length(?)) = ? \
                 OR instr(value, ?) > 0)",
                json_array_expr(self.alias, column)
            ));
            params.push(Value::Text(prefix.clone()));
            params.push(Value::Text(prefix.clone()));
            params.push(Value::Text(segment.clone()));
        }
        self.push(SqlFragment::new(
            format!("({})", alternatives.join(" OR ")),
            params,
        ));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn where_sql(&self) -> String {
        self.clauses.join(" AND ")
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Value>) {
        (self.clauses.join(" AND "), self.params)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Treat columns holding NULL or legacy non-JSON text as empty arrays.
fn json_array_expr(alias: &str, column: &str) -> String {
    format!("CASE WHEN json_valid({alias}.{column}) THEN {alias}.{column} ELSE '[]' END")
}

/// Exact match, or one path is a suffix of the other starting at a `/`.
fn file_match(alias: &str, column: &str, path: &str) -> SqlFragment {
    let slashed = format!("/{path}");
    SqlFragment::new(
        format!(
            "EXISTS (SELECT 1 FROM json_each({}) WHERE value = ? \
             OR substr(value, -length(?)) = ? \
             OR substr(?, -length(value) - 1) = '/' || value)",
            json_array_expr(alias, column)
        ),
        vec![
            Value::Text(path.to_string()),
            Value::Text(slashed.clone()),
            Value::Text(slashed),
            Value::Text(path.to_string()),
        ],
    )
}

pub(crate) fn normalize_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidFilter(format!("empty file path: {raw:?}")));
    }
    Ok(trimmed.to_string())
}

/// Whether `file` sits immediately inside `folder` rather than in a subfolder of it.
///
/// `folder` may be relative to a prefix of `file` (`src/auth` against
/// `/repo/src/auth/login.rs`).
pub(crate) fn is_direct_child(file: &str, folder: &str) -> bool {
    let Ok(folder) = normalize_path(folder) else {
        return false;
    };
    let prefix = format!("{folder}/");
    let rest = match file.strip_prefix(&prefix) {
        Some(rest) => rest,
        None => match file.rfind(&format!("/{prefix}")) {
            Some(pos) => &file[pos + prefix.len() + 1..],
            None => return false,
        },
    };
    !rest.is_empty() && !rest.contains('/')
}
