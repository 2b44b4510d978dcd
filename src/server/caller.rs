//! Who a request is acting as.

use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::agents::{self, Agent};
use crate::config::AuthConfig;
use crate::error::StoreError;
use crate::records::{AccessContext, WriteMetadata};

/// The identity behind a request: an authenticated agent, or a legacy caller
/// that presented no key.
#[derive(Debug, Clone)]
pub enum Caller {
    Legacy,
    Agent(Agent),
}

impl Caller {
    pub fn access(&self) -> AccessContext {
        match self {
            Self::Legacy => AccessContext::anonymous(),
            Self::Agent(agent) => AccessContext::for_agent(agent),
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Legacy => None,
            Self::Agent(agent) => Some(&agent.id),
        }
    }

    /// Legacy callers keep the write access they had before agents existed.
    pub fn can_write(&self) -> bool {
        match self {
            Self::Legacy => true,
            Self::Agent(agent) => agent.has_permission("write"),
        }
    }

    pub fn write_metadata(&self, visibility: Option<String>) -> WriteMetadata {
        match self {
            Self::Legacy => WriteMetadata {
                visibility,
                ..WriteMetadata::default()
            },
            Self::Agent(agent) => WriteMetadata::for_agent(agent, visibility),
        }
    }
}

/// Resolve the identity the stdio server runs as, from `auth.api_key`.
///
/// A configured key that does not resolve is a startup error rather than a
/// silent downgrade to legacy.
pub fn resolve_configured_caller(conn: &Connection, config: &AuthConfig) -> Result<Caller> {
    let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        tracing::info!("no api key configured; serving as legacy caller");
        return Ok(Caller::Legacy);
    };
    match agents::find_by_key(conn, key.trim(), config) {
        Ok(Some(agent)) => {
            tracing::info!(agent = %agent.id, department = %agent.department, "authenticated stdio caller");
            Ok(Caller::Agent(agent))
        }
        Ok(None) => bail!("configured api key is unknown, revoked or expired"),
        Err(StoreError::Locked { agent_id, until }) => {
            bail!("agent {agent_id} is locked until {until} (epoch seconds)")
        }
        Err(e) => Err(e.into()),
    }
}
