//! Credential store: agent identities, API keys, lockout and the audit trail.

pub mod audit;
pub mod keys;
pub mod registry;
pub mod types;

pub use registry::{
    can_access, find_by_key, get_agent, has_permission, list_agents, register, revoke, rotate,
    verify,
};
pub use types::{Agent, Registration, RotatedKey};
