//! Multi-agent session memory for AI coding assistants.
//!
//! mnemo persists the observations, session summaries and prompts an assistant
//! produces while it works, scoped to projects and, when several agents share a
//! store, to the agent that wrote them. Every read passes through one
//! access-control layer, and projects keep answering for their old names after
//! they are renamed.
//!
//! | Visibility | Readable by |
//! |------------|-------------|
//! | **private** | the owning agent |
//! | **department** | agents in the owner's department |
//! | **project** | everyone (until project membership exists) |
//! | **public** | everyone |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with forward-only migrations and legacy FTS5 indexes
//! - **Credentials**: prefix-indexed API keys stored as SHA-256 hashes, with
//!   time-windowed lockout and an append-only audit log
//! - **Transport**: MCP over stdio, or a JSON HTTP API with bearer authentication
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`agents`]: Agent registry, API keys, lockout and audit trail
//! - [`records`]: Content records, visibility rules, project aliases and search
//! - [`server`]: MCP stdio server and HTTP API
//! - [`tools`]: MCP tool definitions

pub mod agents;
pub mod config;
pub mod db;
pub mod error;
pub mod records;
pub mod server;
pub mod tools;

pub use error::{Result, StoreError};
