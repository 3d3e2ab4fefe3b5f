//! Text renderings of semantics for embedding into prompts.
//!
//! Both renderings are deterministic: cubes keep their fetched order and
//! dimensions are keyed by a sorted map, so the same value always produces
//! the same bytes.

use std::error::Error;
use std::fmt;

use serde::Serialize;

use crate::models::{Cube, CubeKind, Semantics};

/// Separator written after every table block.
pub const TABLE_SEPARATOR: &str = "==============================";

#[derive(Debug)]
pub struct RenderError(serde_yaml::Error);

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to render semantics as yaml: {}", self.0)
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serde_yaml::Error> for RenderError {
    fn from(err: serde_yaml::Error) -> Self {
        Self(err)
    }
}

/// Serializes any semantics fragment as YAML.
///
/// # Errors
/// Returns `RenderError` if the value cannot be represented as YAML.
pub fn to_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, RenderError> {
    Ok(serde_yaml::to_string(value)?)
}

impl Semantics {
    /// YAML mapping of the whole snapshot (`cubes:` at the root).
    ///
    /// # Errors
    /// Returns `RenderError` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, RenderError> {
        to_yaml(self)
    }

    /// YAML sequence of the cubes only.
    ///
    /// # Errors
    /// Returns `RenderError` if serialization fails.
    pub fn cubes_yaml(&self) -> Result<String, RenderError> {
        to_yaml(&self.cubes)
    }

    /// Dense column listing of every raw-table cube. Endpoint cubes are
    /// skipped; an empty snapshot renders as the empty string.
    #[must_use]
    pub fn render_tables(&self) -> String {
        let mut out = String::new();
        for cube in &self.cubes {
            match cube.kind {
                CubeKind::Table => write_table(&mut out, cube),
                CubeKind::Endpoint { .. } => {}
            }
        }
        out
    }
}

fn write_table(out: &mut String, cube: &Cube) {
    out.push_str(&format!("Name: {}\n", cube.table_name()));
    out.push_str(&format!("Description: {}\n", cube.description));
    out.push_str("Columns:\n");
    for (key, dimension) in &cube.dimensions {
        let description = dimension.description.as_deref().unwrap_or_default();
        let line = format!("    {key} {}    {description}", dimension.sql_type);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(TABLE_SEPARATOR);
    out.push('\n');
}
