//! Versioned prompt templates.
//!
//! Two template generations exist for the agent prefix and the SQL
//! generation prompt: an example-driven one that teaches by sample requests
//! and a schema-driven one that walks the model through the table listing.
//! Both are kept as named [`PromptVersion`]s; callers pick one explicitly and
//! pass the resulting [`Prompts`] into the toolkit.

use std::{error::Error, fmt, str::FromStr};

use handlebars::Handlebars;
use serde::Serialize;

use crate::toolkit::TOOL_QUERY_ENDPOINT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptVersion {
    ExampleDriven,
    #[default]
    SchemaDriven,
}

impl PromptVersion {
    pub const ALL: [Self; 2] = [Self::ExampleDriven, Self::SchemaDriven];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExampleDriven => "example-driven",
            Self::SchemaDriven => "schema-driven",
        }
    }
}

impl fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPromptVersion(pub String);

impl fmt::Display for UnknownPromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown prompt version `{}` (expected example-driven or schema-driven)",
            self.0
        )
    }
}

impl Error for UnknownPromptVersion {}

impl FromStr for PromptVersion {
    type Err = UnknownPromptVersion;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|version| version.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownPromptVersion(value.to_string()))
    }
}

/// Named templates rendered through [`Prompts::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// System guidance; placeholders `top_k`, `semantics`, and for the
    /// example-driven version `endpoint_example`, `raw_query_example`.
    Prefix,
    /// ReAct suffix; placeholders `input`, `agent_scratchpad`.
    Suffix,
    /// Assistant turn seeded after the user input in function-calling mode.
    FunctionsSuffix,
    /// SQL generation; placeholders `raw_tables`, `input`, and for the
    /// example-driven version `raw_query_example`, `format_response`.
    GenerateQuery,
    /// Query planning; placeholders `semantics`, `endpoint_example`,
    /// `raw_query_example`, `tools`, `format_response`, `question`.
    Plan,
}

impl PromptTemplate {
    pub const ALL: [Self; 5] = [
        Self::Prefix,
        Self::Suffix,
        Self::FunctionsSuffix,
        Self::GenerateQuery,
        Self::Plan,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::FunctionsSuffix => "functions_suffix",
            Self::GenerateQuery => "generate_query",
            Self::Plan => "plan",
        }
    }
}

/// Template texts plus the fixed fragments substituted into them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub version: PromptVersion,
    pub prefix: String,
    pub suffix: String,
    pub functions_suffix: String,
    pub generate_query: String,
    pub generate_query_response: String,
    pub plan: String,
    pub plan_output_format: String,
    pub endpoint_example: String,
    pub raw_query_example: String,
}

impl PromptSet {
    #[must_use]
    pub fn for_version(version: PromptVersion) -> Self {
        let (prefix, generate_query) = match version {
            PromptVersion::ExampleDriven => (EXAMPLE_PREFIX, EXAMPLE_GENERATE_QUERY),
            PromptVersion::SchemaDriven => (SCHEMA_PREFIX, SCHEMA_GENERATE_QUERY),
        };
        Self {
            version,
            prefix: prefix.to_string(),
            suffix: SUFFIX.to_string(),
            functions_suffix: FUNCTIONS_SUFFIX.to_string(),
            generate_query: generate_query.to_string(),
            generate_query_response: GENERATE_QUERY_RESPONSE.to_string(),
            plan: PLAN.to_string(),
            plan_output_format: PLAN_OUTPUT_FORMAT.to_string(),
            endpoint_example: endpoint_example(),
            raw_query_example: RAW_QUERY_EXAMPLE.to_string(),
        }
    }

    #[must_use]
    pub fn template(&self, template: PromptTemplate) -> &str {
        match template {
            PromptTemplate::Prefix => &self.prefix,
            PromptTemplate::Suffix => &self.suffix,
            PromptTemplate::FunctionsSuffix => &self.functions_suffix,
            PromptTemplate::GenerateQuery => &self.generate_query,
            PromptTemplate::Plan => &self.plan,
        }
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::for_version(PromptVersion::default())
    }
}

#[derive(Debug)]
pub enum PromptError {
    Template { name: &'static str, message: String },
    Render { name: &'static str, message: String },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template { name, message } => write!(f, "invalid `{name}` template: {message}"),
            Self::Render { name, message } => {
                write!(f, "failed to render `{name}` template: {message}")
            }
        }
    }
}

impl Error for PromptError {}

/// Compiled prompt set. Rendering is strict: a placeholder without a value
/// is an error rather than an empty string.
pub struct Prompts {
    set: PromptSet,
    registry: Handlebars<'static>,
}

impl fmt::Debug for Prompts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompts")
            .field("version", &self.set.version)
            .finish_non_exhaustive()
    }
}

impl Prompts {
    /// Compiles every template in `set`.
    ///
    /// # Errors
    /// Returns `PromptError::Template` if a template does not parse.
    pub fn new(set: PromptSet) -> Result<Self, PromptError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        for template in PromptTemplate::ALL {
            let name = template.as_str();
            registry
                .register_template_string(name, set.template(template))
                .map_err(|err| PromptError::Template {
                    name,
                    message: err.to_string(),
                })?;
        }
        Ok(Self { set, registry })
    }

    /// Compiles the built-in templates for `version`.
    ///
    /// # Errors
    /// Returns `PromptError::Template` if a built-in template does not parse.
    pub fn for_version(version: PromptVersion) -> Result<Self, PromptError> {
        Self::new(PromptSet::for_version(version))
    }

    #[must_use]
    pub const fn set(&self) -> &PromptSet {
        &self.set
    }

    #[must_use]
    pub const fn version(&self) -> PromptVersion {
        self.set.version
    }

    /// Renders `template` against `data`.
    ///
    /// # Errors
    /// Returns `PromptError::Render` if a placeholder has no value.
    pub fn render<T: Serialize>(
        &self,
        template: PromptTemplate,
        data: &T,
    ) -> Result<String, PromptError> {
        let name = template.as_str();
        self.registry
            .render(name, data)
            .map_err(|err| PromptError::Render {
                name,
                message: err.to_string(),
            })
    }
}

const SCHEMA_PREFIX: &str = r#"You are an agent designed to interact with an OLAP cube described using semantics.
Analyze the provided cube semantics and use them with the provided tools to answer the question.

Follow the steps below:

1. Understand the YAML cube structure:
  - The YAML structure describes every predefined endpoint.
  - Decide whether one of the endpoints can answer the question through `pulse_query_endpoint`.
  - Otherwise build a custom query and run it through `pulse_raw_query`.

2. Generate input for one of the two paths:
  A. Predefined endpoints
    - Call `pulse_query_endpoint` with `endpoint_name` set to the cube name, `params` holding the parameters the endpoint declares, and `page_size` set to {{top_k}}.
  B. Custom queries
    - Call `pulse_generate_query` with the user's request as `input`.
    - Always pass the SQL returned by `pulse_generate_query` to `pulse_raw_query` as `query`.

3. Decision making:
  - Prefer predefined endpoints for efficient data access.
  - If the response from `pulse_query_endpoint` does not answer the question, use `pulse_generate_query`.
  - If a tool responds with an `error` field, read it and adjust the next call.
  - Iterate until you have the right answer.

Given YAML structure:
{{semantics}}

Example request for `pulse_query_endpoint`:
```json
{
  "endpoint_name": "<name of the cube>",
  "params": {
    "param1": "value1",
    "param2": "value2"
  },
  "page_size": {{top_k}}
}
```

Example request for `pulse_raw_query`:
```json
{
  "query": "SELECT * FROM table_name WHERE condition LIMIT {{top_k}} OFFSET 0"
}
```
"#;

const EXAMPLE_PREFIX: &str = r"You are an agent answering analytics questions from data held in Pulse.

There are two kinds of cubes:
- Predefined SQL query cubes carry a `sql` property. They are exposed as endpoints and may take parameters.
{{endpoint_example}}
- Raw table cubes have no `sql` property. They are queried with SQL written for the question.
{{raw_query_example}}

The predefined endpoints available to you:
{{semantics}}

Prefer `pulse_query_endpoint` when one of these endpoints fits the question, requesting at most {{top_k}} rows.
Otherwise call `pulse_generate_query` with the question and run the SQL it returns with `pulse_raw_query`.
When a tool answers with an `error` field, use the message to decide the next step.
";

const SUFFIX: &str = r"Begin!
Question: {{input}}
Thought: I should look at the semantics provided to see how I can query. Then I should call 'pulse_query_endpoint' with parameters or pass a generated 'query' to 'pulse_raw_query'.
{{agent_scratchpad}}";

const FUNCTIONS_SUFFIX: &str = "I should look at the semantics provided to see how I can query. Then I should call 'pulse_query_endpoint' with parameters or pass a generated 'query' to 'pulse_raw_query'.";

const SCHEMA_GENERATE_QUERY: &str = r"TABLES STRUCTURE:

{{raw_tables}}

Your task is to generate a valid Clickhouse SQL query to retrieve data from the provided tables. Follow these steps carefully:

1. Understand the schema: examine the columns available in each table and their relationships, particularly the common columns that can be used for JOIN operations.
2. Analyze the question: determine the data requirements, the tables that need to be queried, and the columns needed to answer it.
3. Construct the query using Clickhouse SQL syntax:
    - Use JOIN to combine data from different tables.
    - Select only the columns relevant to the question. Aim to minimize the number of selected columns.
    - Only select columns that are explicitly listed under the table's schema.
    - Paginate with LIMIT and OFFSET. Assume a page size of 100 and an offset of 0.
    - Aggregate with GROUP BY and aggregate functions.
    - Filter with WHERE.
    - Sort with ORDER BY. When sorting by a column from another table, join that table first.
    - Do not include a trailing semicolon.
4. Generate the query: produce one well-structured, efficient Clickhouse SQL query that answers the question.

QUESTION: {{input}}
Response: SQL query as a string without any additional information.
";

const EXAMPLE_GENERATE_QUERY: &str = r"TABLES:

{{raw_tables}}

{{raw_query_example}}

Write one Clickhouse SQL query that answers the question below using only the tables and columns listed above.
Respond in the following format:
{{format_response}}

QUESTION: {{input}}
";

const GENERATE_QUERY_RESPONSE: &str = r#"```json
{
    "body": {
        "query": "your generated query"
    },
    "path": "execute",
    "description": "description of the query",
    "explanation": "explanation of the query"
}
```"#;

const PLAN: &str = r"UNDERSTAND SEMANTICS OF CUBE

Here are the semantics of the available data in YAML format, representing OLAP cubes:
{{semantics}}

There are two kinds of cubes:
- Predefined SQL query cubes: cubes with a `sql` property. They carry SQL optimized for a specific analytical task; reading it tells you how the data is fetched. They may need input parameters and support pagination and filtering.
{{endpoint_example}}
- Raw table cubes: cubes without a `sql` property. They represent raw database tables and are queried with custom SQL for the task at hand.
{{raw_query_example}}

Your goal is to understand the semantics of the cubes and break the question down into smaller tasks that fetch the data needed to answer it.
 - A task is one invocation of an available tool.
 - A successful planning response lists the tasks needed to answer the question.
 - An unsuccessful planning response sets success to false with a reason and no steps.

Available tools:
{{tools}}

Your planning response should be JSON with the properties below:
{{format_response}}

QUESTION: {{question}}
Response: response in JSON format as described above
";

const PLAN_OUTPUT_FORMAT: &str = r#"```json
{
  "success": true,
  "error_reason": "This query is not relevant to the provided data",
  "steps": [
    {
      "action": "tool name",
      "description": "description of the task",
      "explanation": "explanation of the task"
    }
  ]
}
```"#;

const TOP_TRANSACTIONS_SQL: &str = r"SELECT u.*, count(t.id) AS txn_count
FROM users u
JOIN transactions t ON t.user_id = u.id
WHERE u.region = {{region}}
GROUP BY u.id
ORDER BY txn_count DESC
LIMIT 20";

fn endpoint_example() -> String {
    format!(
        r#"For example, a cube named `top_users` has the following predefined SQL:
{TOP_TRANSACTIONS_SQL}
To get data from this cube, call `{TOOL_QUERY_ENDPOINT}` with:
{{
  "endpoint_name": "top_users",
  "params": {{
    "region": "USA"
  }},
  "page_size": 10,
  "offset": 0
}}
The response is a JSON object with the properties defined in the cube dimensions."#
    )
}

const RAW_QUERY_EXAMPLE: &str = r#"For example, with raw table cubes named users, customers and transactions, fetch data by writing SQL against those tables:
    SELECT id, region FROM users WHERE users.category = <value matching the dimension type> LIMIT 10 OFFSET 0

    - Replace <value matching the dimension type> with an actual value of the dimension's type.
    - Use Clickhouse SQL syntax.
    - Select only the columns you need.
    - Paginate with LIMIT and OFFSET.
    - Aggregate with GROUP BY and aggregate functions.
    - Filter with WHERE and sort with ORDER BY.
Draft the SQL with `pulse_generate_query`, then run it with `pulse_raw_query`:
{
    "query": "your query here"
}
The response is a JSON object with the properties defined in the cube dimensions."#;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::toolkit::{TOOL_GENERATE_QUERY, TOOL_RAW_QUERY};

    fn prefix_data() -> serde_json::Value {
        json!({
            "top_k": 100,
            "semantics": "cubes: []\n",
            "endpoint_example": "ENDPOINT EXAMPLE",
            "raw_query_example": "RAW EXAMPLE",
        })
    }

    #[test]
    fn every_version_compiles() {
        for version in PromptVersion::ALL {
            let prompts = Prompts::for_version(version).expect("built-in templates parse");
            assert_eq!(prompts.version(), version);
        }
    }

    #[test]
    fn versions_parse_from_names() {
        assert_eq!(
            "schema-driven".parse::<PromptVersion>(),
            Ok(PromptVersion::SchemaDriven)
        );
        assert_eq!(
            "Example-Driven".parse::<PromptVersion>(),
            Ok(PromptVersion::ExampleDriven)
        );
        assert!("v3".parse::<PromptVersion>().is_err());
    }

    #[test]
    fn prefix_versions_differ() {
        let schema = Prompts::for_version(PromptVersion::SchemaDriven).expect("templates parse");
        let example = Prompts::for_version(PromptVersion::ExampleDriven).expect("templates parse");

        let schema_text = schema
            .render(PromptTemplate::Prefix, &prefix_data())
            .expect("prefix renders");
        let example_text = example
            .render(PromptTemplate::Prefix, &prefix_data())
            .expect("prefix renders");

        assert!(schema_text.contains("\"page_size\": 100"));
        assert!(!schema_text.contains("ENDPOINT EXAMPLE"));
        assert!(example_text.contains("ENDPOINT EXAMPLE"));
        assert!(example_text.contains("at most 100 rows"));
    }

    #[test]
    fn rendering_does_not_escape_markup() {
        let prompts = Prompts::for_version(PromptVersion::SchemaDriven).expect("templates parse");
        let rendered = prompts
            .render(
                PromptTemplate::GenerateQuery,
                &json!({ "raw_tables": "Name: a<b>&c", "input": "count 'users'" }),
            )
            .expect("generate query renders");
        assert!(rendered.contains("Name: a<b>&c"));
        assert!(rendered.contains("QUESTION: count 'users'"));
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let prompts = Prompts::for_version(PromptVersion::SchemaDriven).expect("templates parse");
        let err = prompts
            .render(PromptTemplate::Suffix, &json!({ "input": "q" }))
            .expect_err("agent_scratchpad is required");
        assert!(matches!(err, PromptError::Render { name: "suffix", .. }));
    }

    #[test]
    fn endpoint_example_keeps_sql_placeholders_literal() {
        let set = PromptSet::default();
        assert!(set.endpoint_example.contains("u.region = {{region}}"));
        assert!(set.endpoint_example.contains("\"region\": \"USA\""));
    }

    #[test]
    fn templates_reference_known_tools() {
        let set = PromptSet::default();
        for tool in [TOOL_QUERY_ENDPOINT, TOOL_RAW_QUERY, TOOL_GENERATE_QUERY] {
            assert!(set.prefix.contains(tool), "prefix should mention {tool}");
        }
    }
}
