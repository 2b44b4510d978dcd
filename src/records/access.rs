//! Visibility rules for content records.
//!
//! | Visibility   | Readable by                                  |
//! |--------------|----------------------------------------------|
//! | `public`     | everyone                                     |
//! | `project`    | everyone (placeholder for project membership) |
//! | `department` | agents in the record's department            |
//! | `private`    | the owning agent                             |
//!
//! The same table exists twice: [`visibility_predicate`] renders it as SQL for
//! queries, [`can_access`] evaluates it for a single record. Missing caller
//! context only ever narrows what is visible.

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use super::filters::SqlFragment;
use super::types::Visibility;
use crate::agents::Agent;
use crate::error::Result;

/// Who is asking. Both fields absent means an unauthenticated or legacy caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub agent_id: Option<String>,
    pub department: Option<String>,
}

impl AccessContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_agent(agent: &Agent) -> Self {
        Self {
            agent_id: Some(agent.id.clone()),
            department: Some(agent.department.clone()).filter(|d| !d.is_empty()),
        }
    }

    /// Build a context for `agent_id`, looking its department up in the agents table.
    ///
    /// An id with no agent row keeps its identity (so it still sees records it
    /// owns) but gets no department.
    pub fn resolve(conn: &Connection, agent_id: Option<&str>) -> Result<Self> {
        let Some(id) = agent_id else {
            return Ok(Self::anonymous());
        };
        let department: Option<String> = conn
            .query_row(
                "SELECT department FROM agents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if department.is_none() {
            tracing::debug!(agent = %id, "no department on record for requesting agent");
        }
        Ok(Self {
            agent_id: Some(id.to_string()),
            department: department.filter(|d| !d.is_empty()),
        })
    }

    pub fn is_anonymous(&self) -> bool {
        self.agent_id.is_none()
    }
}

/// SQL predicate restricting rows of table alias `alias` to what `ctx` may read.
///
/// `alias` must be a table alias chosen by the caller's own SQL, never input.
pub fn visibility_predicate(ctx: &AccessContext, alias: &str) -> SqlFragment {
    let open = format!(
        "{alias}.visibility IN ('{}', '{}')",
        Visibility::Public.as_str(),
        Visibility::Project.as_str()
    );

    let Some(agent_id) = &ctx.agent_id else {
        return SqlFragment::new(open, Vec::new());
    };

    let mut clauses = vec![open];
    let mut params = Vec::new();

    if let Some(department) = &ctx.department {
        clauses.push(format!(
            "({alias}.visibility = '{}' AND {alias}.department = ?)",
            Visibility::Department.as_str()
        ));
        params.push(Value::Text(department.clone()));
    }

    clauses.push(format!(
        "({alias}.visibility = '{}' AND {alias}.agent = ?)",
        Visibility::Private.as_str()
    ));
    params.push(Value::Text(agent_id.clone()));

    SqlFragment::new(format!("({})", clauses.join(" OR ")), params)
}

/// Evaluate the visibility table for one record.
pub fn can_access(
    ctx: &AccessContext,
    owner_agent: &str,
    owner_department: &str,
    visibility: Visibility,
) -> bool {
    match visibility {
        Visibility::Public | Visibility::Project => true,
        Visibility::Department => ctx
            .department
            .as_deref()
            .is_some_and(|d| ctx.agent_id.is_some() && d == owner_department),
        Visibility::Private => ctx.agent_id.as_deref() == Some(owner_agent),
    }
}
