//! CLI `agent` commands: register, rotate, revoke and inspect agents.

use anyhow::{bail, Result};
use clap::Subcommand;
use mnemo::agents::{self, audit};
use mnemo::config::MnemoConfig;

#[derive(Subcommand)]
pub enum AgentAction {
    /// Register an agent and print its API key (shown once)
    Register {
        /// Agent id, `name@host`
        id: String,
        #[arg(long)]
        department: Option<String>,
        /// Comma-separated permissions (default: read,write)
        #[arg(long)]
        permissions: Option<String>,
    },
    /// Issue a new key, invalidating the old one
    Rotate {
        id: String,
        /// Lifetime of the new key (default: auth.key_expiry_days)
        #[arg(long)]
        expiry_days: Option<u32>,
    },
    /// Revoke the agent's key
    Revoke { id: String },
    /// Show one agent
    Show { id: String },
    /// List all agents
    List,
    /// Show the credential audit log
    Audit {
        /// Only entries for this agent
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

pub fn run(config: &MnemoConfig, action: AgentAction) -> Result<()> {
    let mut conn = super::open(config)?;

    match action {
        AgentAction::Register {
            id,
            department,
            permissions,
        } => {
            let perms: Option<Vec<&str>> = permissions
                .as_deref()
                .map(|p| p.split(',').map(str::trim).collect());
            let reg = agents::register(
                &mut conn,
                &id,
                department.as_deref(),
                perms.as_deref(),
                &config.auth,
            )?;
            match reg.api_key {
                Some(key) => {
                    println!("Registered {} (department: {})", reg.agent.id, reg.agent.department);
                    println!("API key (store it now, it will not be shown again):");
                    println!("  {key}");
                }
                None => {
                    println!("{} is already registered; key unchanged.", reg.agent.id);
                    println!("Use `mnemo agent rotate {}` to issue a new key.", reg.agent.id);
                }
            }
        }
        AgentAction::Rotate { id, expiry_days } => {
            let rotated = agents::rotate(&mut conn, &id, expiry_days, &config.auth)?;
            println!("New API key for {} (the old key no longer works):", rotated.agent.id);
            println!("  {}", rotated.api_key);
        }
        AgentAction::Revoke { id } => {
            let agent = agents::revoke(&mut conn, &id)?;
            println!("Revoked key for {}", agent.id);
        }
        AgentAction::Show { id } => match agents::get_agent(&conn, &id)? {
            Some(agent) => super::print_json(&agent)?,
            None => bail!("agent not found: {id}"),
        },
        AgentAction::List => {
            let list = agents::list_agents(&conn)?;
            if list.is_empty() {
                println!("No agents registered.");
                return Ok(());
            }
            println!("{:<32} {:<12} {:<12} {:<9} KEY", "ID", "DEPARTMENT", "PERMISSIONS", "VERIFIED");
            for agent in list {
                println!(
                    "{:<32} {:<12} {:<12} {:<9} {}",
                    agent.id,
                    agent.department,
                    agent.permissions.join(","),
                    if agent.verified { "yes" } else { "no" },
                    agent.key_prefix.as_deref().unwrap_or("(revoked)"),
                );
            }
        }
        AgentAction::Audit { agent, limit } => {
            let entries = audit::list_audit_log(&conn, agent.as_deref(), limit)?;
            for entry in entries {
                println!(
                    "{}  {:<16} {:<28} {}",
                    entry.created_at,
                    entry.action,
                    entry.agent_id,
                    entry.details.map(|d| d.to_string()).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
