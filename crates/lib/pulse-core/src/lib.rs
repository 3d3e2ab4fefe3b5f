//! Core services for pulse-mcp.
//!
//! This crate owns the HTTP client for a Pulse application (semantics fetch,
//! endpoint and raw SQL queries), the completion collaborator used to draft
//! SQL and plans, the versioned prompt set, and the toolkit that ties them to
//! one semantics snapshot.

pub mod client;
pub mod completion;
pub mod prompts;
pub mod toolkit;

pub use client::{
    ConfigurationError,
    Pagination,
    PulseClient,
    PulseConfig,
    PulseError,
    TransportError,
};
pub use completion::{CompletionError, CompletionModel, OllamaCompletion};
pub use prompts::{PromptSet, PromptVersion, Prompts};
pub use toolkit::{PulseToolkit, ToolkitError};
