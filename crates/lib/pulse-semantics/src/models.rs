use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed column exposed by a cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub sql_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input accepted by a parameterized cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub param_type: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// How a cube is queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CubeKind {
    /// Backed by predefined SQL and invoked by name.
    Endpoint { sql: String },
    /// Backed by a raw table and queried with ad hoc SQL.
    Table,
}

/// Named, described unit of queryable data.
///
/// The wire form carries an optional `sql` field; it is folded into
/// [`CubeKind`] once during deserialization so consumers match on the kind
/// instead of probing for the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CubeRecord", into = "CubeRecord")]
pub struct Cube {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dimensions: BTreeMap<String, Dimension>,
    pub sql_table: Option<String>,
    pub extends: Option<Vec<String>>,
    pub params: Option<Vec<Parameter>>,
    pub kind: CubeKind,
}

impl Cube {
    #[must_use]
    pub const fn is_endpoint(&self) -> bool {
        matches!(self.kind, CubeKind::Endpoint { .. })
    }

    /// Predefined SQL for endpoint cubes.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match &self.kind {
            CubeKind::Endpoint { sql } => Some(sql.as_str()),
            CubeKind::Table => None,
        }
    }

    /// Table name used when writing SQL against this cube, falling back to
    /// the cube name when the service omits `sql_table`.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.sql_table.as_deref().unwrap_or(&self.name)
    }
}

/// Wire shape of a cube as served by `/apps/{id}/semantics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CubeRecord {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    dimensions: BTreeMap<String, DimensionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extends: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Vec<Parameter>>,
}

/// Dimension as nested under its name key; `name` may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DimensionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    sql_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl From<CubeRecord> for Cube {
    fn from(record: CubeRecord) -> Self {
        let CubeRecord {
            id,
            name,
            description,
            dimensions,
            sql_table,
            extends,
            sql,
            params,
        } = record;

        let kind = match sql {
            Some(sql) if !sql.trim().is_empty() => CubeKind::Endpoint { sql },
            _ => CubeKind::Table,
        };

        let dimensions = dimensions
            .into_iter()
            .map(|(key, dimension)| {
                let dimension = Dimension {
                    name: dimension.name.unwrap_or_else(|| key.clone()),
                    sql_type: dimension.sql_type,
                    description: dimension.description,
                };
                (key, dimension)
            })
            .collect();

        Self {
            id,
            name,
            description,
            dimensions,
            sql_table,
            extends,
            params,
            kind,
        }
    }
}

impl From<Cube> for CubeRecord {
    fn from(cube: Cube) -> Self {
        let sql = match cube.kind {
            CubeKind::Endpoint { sql } => Some(sql),
            CubeKind::Table => None,
        };
        let dimensions = cube
            .dimensions
            .into_iter()
            .map(|(key, dimension)| {
                let record = DimensionRecord {
                    name: Some(dimension.name),
                    sql_type: dimension.sql_type,
                    description: dimension.description,
                };
                (key, record)
            })
            .collect();

        Self {
            id: cube.id,
            name: cube.name,
            description: cube.description,
            dimensions,
            sql_table: cube.sql_table,
            extends: cube.extends,
            sql,
            params: cube.params,
        }
    }
}

/// Full schema snapshot for one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semantics {
    pub cubes: Vec<Cube>,
}

impl Semantics {
    #[must_use]
    pub const fn new(cubes: Vec<Cube>) -> Self {
        Self { cubes }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    /// Cubes backed by predefined SQL, in their original order.
    #[must_use]
    pub fn filter_endpoints(&self) -> Self {
        self.filter_kind(true)
    }

    /// Cubes backed by raw tables, in their original order.
    #[must_use]
    pub fn filter_tables(&self) -> Self {
        self.filter_kind(false)
    }

    /// Splits into `(endpoints, tables)`.
    #[must_use]
    pub fn partition(&self) -> (Self, Self) {
        let (endpoints, tables): (Vec<Cube>, Vec<Cube>) =
            self.cubes.iter().cloned().partition(Cube::is_endpoint);
        (Self::new(endpoints), Self::new(tables))
    }

    fn filter_kind(&self, endpoints: bool) -> Self {
        let cubes = self
            .cubes
            .iter()
            .filter(|cube| cube.is_endpoint() == endpoints)
            .cloned()
            .collect();
        Self::new(cubes)
    }
}

/// Request to invoke one predefined cube.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointQueryParams {
    pub endpoint_name: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl EndpointQueryParams {
    pub fn new(endpoint_name: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}
