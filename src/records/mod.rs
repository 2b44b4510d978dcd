//! Content records: observations, session summaries and user prompts, with the
//! visibility rules, project aliasing and filtered search that scope every read.

pub mod access;
pub mod aliases;
pub mod filters;
pub mod project;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

pub use access::AccessContext;
pub use filters::{DateRange, OrderBy, SearchFilters, SearchOptions};
pub use search::{FileMatches, FileQuery};
pub use store::WriteMetadata;
pub use types::{Observation, ObservationType, SessionSummary, UserPrompt, Visibility};
