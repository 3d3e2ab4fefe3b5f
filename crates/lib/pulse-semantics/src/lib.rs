//! Semantics model and renderers for Pulse.
//!
//! This crate defines the schema snapshot served by a Pulse application
//! (cubes, dimensions, parameters), the endpoint/table views derived from it,
//! and the text forms embedded into agent prompts.

pub mod models;
pub mod render;

pub use models::*;
pub use render::{RenderError, TABLE_SEPARATOR, to_yaml};
