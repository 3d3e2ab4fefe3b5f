//! MCP tool modules.
//!
//! Tools are grouped by what they touch: the cached semantics snapshot,
//! queries against the Pulse service, and completions from the model.

pub mod generate;
pub mod query;
mod schema;
