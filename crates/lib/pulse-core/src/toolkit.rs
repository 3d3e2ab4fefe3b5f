use std::{error::Error, fmt, sync::Arc};

use pulse_semantics::{RenderError, Semantics};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::{PulseClient, PulseError};
use crate::completion::{CompletionError, CompletionModel};
use crate::prompts::{PromptError, PromptTemplate, Prompts};

pub const TOOL_SEMANTICS: &str = "pulse_semantics";
pub const TOOL_QUERY_ENDPOINT: &str = "pulse_query_endpoint";
pub const TOOL_RAW_QUERY: &str = "pulse_raw_query";
pub const TOOL_GENERATE_QUERY: &str = "pulse_generate_query";
pub const TOOL_PLAN: &str = "pulse_plan";

/// Page size hint used when the caller does not pick one.
pub const DEFAULT_TOP_K: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

/// Tools the agent can call, in the order they are advertised.
pub const TOOL_CATALOG: [ToolDescriptor; 5] = [
    ToolDescriptor {
        name: TOOL_SEMANTICS,
        description: "Returns the semantics of every cube in the application as YAML.",
    },
    ToolDescriptor {
        name: TOOL_QUERY_ENDPOINT,
        description: "Runs a predefined endpoint cube by name with its parameters and pagination.",
    },
    ToolDescriptor {
        name: TOOL_RAW_QUERY,
        description: "Executes a Clickhouse SQL query against the raw table cubes.",
    },
    ToolDescriptor {
        name: TOOL_GENERATE_QUERY,
        description: "Drafts a Clickhouse SQL query for a natural-language request over the raw tables.",
    },
    ToolDescriptor {
        name: TOOL_PLAN,
        description: "Breaks a question down into a JSON plan of tool calls.",
    },
];

#[derive(Debug)]
pub enum ToolkitError {
    Fetch(PulseError),
    Render(RenderError),
    Prompt(PromptError),
    Completion(CompletionError),
}

impl ToolkitError {
    /// `{"error": ...}` value handed back to the agent.
    #[must_use]
    pub fn to_error_value(&self) -> Value {
        match self {
            Self::Fetch(err) => err.to_error_value(),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl fmt::Display for ToolkitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "{err}"),
            Self::Render(err) => write!(f, "{err}"),
            Self::Prompt(err) => write!(f, "{err}"),
            Self::Completion(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ToolkitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Render(err) => Some(err),
            Self::Prompt(err) => Some(err),
            Self::Completion(err) => Some(err),
        }
    }
}

impl From<PulseError> for ToolkitError {
    fn from(err: PulseError) -> Self {
        Self::Fetch(err)
    }
}

impl From<RenderError> for ToolkitError {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

impl From<PromptError> for ToolkitError {
    fn from(err: PromptError) -> Self {
        Self::Prompt(err)
    }
}

impl From<CompletionError> for ToolkitError {
    fn from(err: CompletionError) -> Self {
        Self::Completion(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything an agent session needs: the client, the completion model, the
/// prompt set, and the semantics snapshot split into its two views.
///
/// The snapshot is taken once and shared read-only.
#[derive(Clone)]
pub struct PulseToolkit {
    client: PulseClient,
    model: Arc<dyn CompletionModel>,
    prompts: Arc<Prompts>,
    semantics: Arc<Semantics>,
    endpoints: Arc<Semantics>,
    tables: Arc<Semantics>,
    raw_tables: Arc<str>,
}

impl fmt::Debug for PulseToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseToolkit")
            .field("client", &self.client)
            .field("prompt_version", &self.prompts.version())
            .field("endpoints", &self.endpoints.cubes.len())
            .field("tables", &self.tables.cubes.len())
            .finish_non_exhaustive()
    }
}

impl PulseToolkit {
    /// Fetches the semantics snapshot and builds the toolkit around it.
    ///
    /// # Errors
    /// Returns `PulseError` if the snapshot cannot be fetched or parsed.
    pub async fn connect(
        client: PulseClient,
        model: Arc<dyn CompletionModel>,
        prompts: Arc<Prompts>,
    ) -> Result<Self, PulseError> {
        let semantics = client.fetch_semantics().await?;
        Ok(Self::with_semantics(client, model, prompts, semantics))
    }

    /// Builds the toolkit around a snapshot the caller already holds.
    #[must_use]
    pub fn with_semantics(
        client: PulseClient,
        model: Arc<dyn CompletionModel>,
        prompts: Arc<Prompts>,
        semantics: Semantics,
    ) -> Self {
        let (endpoints, tables) = semantics.partition();
        let raw_tables = tables.render_tables();
        info!(
            endpoints = endpoints.cubes.len(),
            tables = tables.cubes.len(),
            prompt_version = %prompts.version(),
            "pulse toolkit ready"
        );
        Self {
            client,
            model,
            prompts,
            semantics: Arc::new(semantics),
            endpoints: Arc::new(endpoints),
            tables: Arc::new(tables),
            raw_tables: Arc::from(raw_tables),
        }
    }

    #[must_use]
    pub const fn client(&self) -> &PulseClient {
        &self.client
    }

    #[must_use]
    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    #[must_use]
    pub fn semantics(&self) -> &Semantics {
        &self.semantics
    }

    #[must_use]
    pub fn endpoints(&self) -> &Semantics {
        &self.endpoints
    }

    #[must_use]
    pub fn tables(&self) -> &Semantics {
        &self.tables
    }

    /// Dense column listing handed to the SQL generation prompt.
    #[must_use]
    pub fn raw_tables(&self) -> &str {
        &self.raw_tables
    }

    /// YAML of the full cached snapshot.
    ///
    /// # Errors
    /// Returns `RenderError` if serialization fails.
    pub fn semantics_yaml(&self) -> Result<String, RenderError> {
        self.semantics.to_yaml()
    }

    /// YAML of the endpoint cubes.
    ///
    /// # Errors
    /// Returns `RenderError` if serialization fails.
    pub fn fetch_endpoints(&self) -> Result<String, RenderError> {
        self.endpoints.to_yaml()
    }

    /// YAML of the raw table cubes.
    ///
    /// # Errors
    /// Returns `RenderError` if serialization fails.
    pub fn fetch_tables(&self) -> Result<String, RenderError> {
        self.tables.to_yaml()
    }

    /// Bulleted `name: description` listing of [`TOOL_CATALOG`].
    #[must_use]
    pub fn tool_descriptions() -> String {
        TOOL_CATALOG
            .iter()
            .map(|tool| format!("- {}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// System guidance embedding the endpoint view.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the endpoint view or the template fails to render.
    pub fn agent_instructions(&self, top_k: u64) -> Result<String, ToolkitError> {
        let set = self.prompts.set();
        let data = json!({
            "top_k": top_k,
            "semantics": self.fetch_endpoints()?,
            "endpoint_example": set.endpoint_example,
            "raw_query_example": set.raw_query_example,
        });
        Ok(self.prompts.render(PromptTemplate::Prefix, &data)?)
    }

    /// Function-calling conversation seed: system guidance, the user input,
    /// then the assistant's opening thought.
    ///
    /// # Errors
    /// Returns `ToolkitError` if a template fails to render.
    pub fn agent_messages(&self, input: &str, top_k: u64) -> Result<Vec<AgentMessage>, ToolkitError> {
        let opening = self
            .prompts
            .render(PromptTemplate::FunctionsSuffix, &json!({}))?;
        Ok(vec![
            AgentMessage::new(Role::System, self.agent_instructions(top_k)?),
            AgentMessage::new(Role::User, input),
            AgentMessage::new(Role::Assistant, opening),
        ])
    }

    /// ReAct-style suffix carrying the question and the scratchpad so far.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the template fails to render.
    pub fn react_suffix(&self, input: &str, scratchpad: &str) -> Result<String, ToolkitError> {
        let data = json!({ "input": input, "agent_scratchpad": scratchpad });
        Ok(self.prompts.render(PromptTemplate::Suffix, &data)?)
    }

    /// Prompt asking the model for SQL over the raw tables.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the template fails to render.
    pub fn generate_query_prompt(&self, input: &str) -> Result<String, ToolkitError> {
        let set = self.prompts.set();
        let data = json!({
            "raw_tables": &*self.raw_tables,
            "input": input,
            "raw_query_example": set.raw_query_example,
            "format_response": set.generate_query_response,
        });
        Ok(self.prompts.render(PromptTemplate::GenerateQuery, &data)?)
    }

    /// Asks the model to draft SQL for `input`. The completion is returned
    /// as-is; it is neither parsed nor validated.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the prompt fails to render or the model call fails.
    pub async fn generate_query(&self, input: &str) -> Result<String, ToolkitError> {
        let prompt = self.generate_query_prompt(input)?;
        debug!(prompt_len = prompt.len(), "generating pulse query");
        Ok(self.model.complete(&prompt).await?)
    }

    /// Prompt asking the model to plan the tool calls for `question`.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the snapshot or the template fails to render.
    pub fn plan_prompt(&self, question: &str) -> Result<String, ToolkitError> {
        let set = self.prompts.set();
        let data = json!({
            "semantics": self.semantics_yaml()?,
            "endpoint_example": set.endpoint_example,
            "raw_query_example": set.raw_query_example,
            "tools": Self::tool_descriptions(),
            "format_response": set.plan_output_format,
            "question": question,
        });
        Ok(self.prompts.render(PromptTemplate::Plan, &data)?)
    }

    /// Asks the model for a plan. The completion is returned as-is.
    ///
    /// # Errors
    /// Returns `ToolkitError` if the prompt fails to render or the model call fails.
    pub async fn plan_query(&self, question: &str) -> Result<String, ToolkitError> {
        let prompt = self.plan_prompt(question)?;
        debug!(prompt_len = prompt.len(), "planning pulse query");
        Ok(self.model.complete(&prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use pulse_semantics::{Cube, CubeKind, Dimension};

    use super::*;
    use crate::client::PulseConfig;
    use crate::completion::CompletionFuture;
    use crate::prompts::PromptVersion;

    #[derive(Default)]
    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    impl CompletionModel for EchoModel {
        fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
            Box::pin(async move {
                self.prompts
                    .lock()
                    .expect("prompt log lock")
                    .push(prompt.to_string());
                Ok("SELECT 1".to_string())
            })
        }
    }

    fn cube(name: &str, sql: Option<&str>) -> Cube {
        Cube {
            id: name.to_string(),
            name: name.to_string(),
            description: format!("{name} cube"),
            dimensions: BTreeMap::from([(
                "id".to_string(),
                Dimension {
                    name: "id".to_string(),
                    sql_type: "int".to_string(),
                    description: None,
                },
            )]),
            sql_table: Some(name.to_string()),
            extends: None,
            params: None,
            kind: sql.map_or(CubeKind::Table, |sql| CubeKind::Endpoint {
                sql: sql.to_string(),
            }),
        }
    }

    fn toolkit(model: Arc<EchoModel>) -> PulseToolkit {
        let client = PulseClient::new(PulseConfig::new("1", "secret")).expect("client builds");
        let prompts = Prompts::for_version(PromptVersion::SchemaDriven).expect("templates parse");
        PulseToolkit::with_semantics(
            client,
            model,
            Arc::new(prompts),
            Semantics::new(vec![
                cube("top_users", Some("SELECT * FROM users")),
                cube("transactions", None),
            ]),
        )
    }

    #[test]
    fn instructions_embed_only_endpoints() {
        let toolkit = toolkit(Arc::new(EchoModel::default()));
        let instructions = toolkit.agent_instructions(25).expect("instructions render");
        assert!(instructions.contains("name: top_users"));
        assert!(!instructions.contains("name: transactions"));
        assert!(instructions.contains("\"page_size\": 25"));
    }

    #[test]
    fn messages_follow_system_user_assistant_order() {
        let toolkit = toolkit(Arc::new(EchoModel::default()));
        let messages = toolkit
            .agent_messages("who spends most?", DEFAULT_TOP_K)
            .expect("messages render");
        let roles: Vec<_> = messages.iter().map(|message| message.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        assert_eq!(messages[1].content, "who spends most?");
    }

    #[test]
    fn react_suffix_carries_scratchpad() {
        let toolkit = toolkit(Arc::new(EchoModel::default()));
        let suffix = toolkit
            .react_suffix("top regions", "Thought: check endpoints")
            .expect("suffix renders");
        assert!(suffix.contains("Question: top regions"));
        assert!(suffix.ends_with("Thought: check endpoints"));
    }

    #[tokio::test]
    async fn generate_query_sends_table_view_to_model() {
        let model = Arc::new(EchoModel::default());
        let toolkit = toolkit(Arc::clone(&model));

        let sql = toolkit
            .generate_query("count transactions")
            .await
            .expect("completion succeeds");
        assert_eq!(sql, "SELECT 1");

        let prompts = model.prompts.lock().expect("prompt log lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Name: transactions"));
        assert!(!prompts[0].contains("Name: top_users"));
        assert!(prompts[0].contains("QUESTION: count transactions"));
    }

    #[tokio::test]
    async fn plan_prompt_lists_every_tool() {
        let model = Arc::new(EchoModel::default());
        let toolkit = toolkit(Arc::clone(&model));
        toolkit.plan_query("top users in USA").await.expect("plan completes");

        let prompts = model.prompts.lock().expect("prompt log lock");
        for tool in TOOL_CATALOG {
            assert!(prompts[0].contains(tool.name), "plan should list {}", tool.name);
        }
        assert!(prompts[0].contains("QUESTION: top users in USA"));
    }

    #[test]
    fn completion_errors_become_error_values() {
        let err = ToolkitError::from(CompletionError::Transport("connection refused".to_string()));
        assert_eq!(
            err.to_error_value(),
            json!({ "error": "completion request failed: connection refused" })
        );
    }
}
