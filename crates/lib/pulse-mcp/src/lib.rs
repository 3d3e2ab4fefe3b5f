//! MCP server implementation for the Pulse agent toolkit.
//!
//! This crate wires a [`PulseToolkit`] into rmcp tool handlers: the cached
//! semantics, endpoint and raw SQL queries, SQL generation, and planning.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use pulse_core::toolkit::{DEFAULT_TOP_K, PulseToolkit};
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use tracing::warn;

pub use tools::generate::{GenerateQueryParams, PlanQueryParams};
pub use tools::query::{QueryEndpointParams, RawQueryParams};

const FALLBACK_INSTRUCTIONS: &str = r#"pulse-mcp answers analytics questions against a Pulse application.

Workflow:
1. Call `pulse_semantics` to read the cubes. Cubes with a `sql` property are predefined endpoints.
2. Prefer `pulse_query_endpoint` when an endpoint fits the question.
3. Otherwise call `pulse_generate_query` with the question and run the SQL it returns with `pulse_raw_query`.
4. `pulse_plan` breaks a question down into tool calls when the path is unclear.

Notes:
- Query failures come back as {"error": ...}; read the message and adjust the next call.
- `health` returns `ok`."#;

/// MCP server wrapper around a toolkit and the tool routers.
#[derive(Clone)]
pub struct PulseMcp {
    tool_router: ToolRouter<Self>,
    toolkit: Arc<PulseToolkit>,
    top_k: u64,
}

impl PulseMcp {
    /// Creates a new server using a toolkit by value.
    #[must_use]
    pub fn new(toolkit: PulseToolkit) -> Self {
        Self::with_toolkit(Arc::new(toolkit))
    }

    /// Creates a new server using a shared toolkit handle.
    #[must_use]
    pub fn with_toolkit(toolkit: Arc<PulseToolkit>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_schema()
            + Self::tool_router_query()
            + Self::tool_router_generate();
        Self {
            tool_router,
            toolkit,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Page size hint written into the server instructions.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: u64) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn toolkit(&self) -> &PulseToolkit {
        &self.toolkit
    }

    /// Names of every registered tool.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }

    fn instructions(&self) -> String {
        self.toolkit
            .agent_instructions(self.top_k)
            .unwrap_or_else(|err| {
                warn!(error = %err, "falling back to static server instructions");
                FALLBACK_INSTRUCTIONS.to_string()
            })
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl PulseMcp {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl ServerHandler for PulseMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(self.instructions()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use pulse_core::client::{PulseClient, PulseConfig};
    use pulse_core::completion::{CompletionError, CompletionFuture, CompletionModel};
    use pulse_core::prompts::{PromptVersion, Prompts};
    use pulse_core::toolkit::TOOL_CATALOG;
    use pulse_semantics::{Cube, CubeKind, Semantics};
    use rmcp::handler::server::wrapper::Parameters;
    use serde_json::{Value, json};

    use super::*;

    struct FixedModel(Result<&'static str, &'static str>);

    impl CompletionModel for FixedModel {
        fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
            let result = self
                .0
                .map(str::to_string)
                .map_err(|message| CompletionError::Transport(message.to_string()));
            Box::pin(async move { result })
        }
    }

    fn cube(name: &str, sql: Option<&str>) -> Cube {
        Cube {
            id: name.to_string(),
            name: name.to_string(),
            description: format!("{name} cube"),
            dimensions: BTreeMap::new(),
            sql_table: None,
            extends: None,
            params: None,
            kind: sql.map_or(CubeKind::Table, |sql| CubeKind::Endpoint {
                sql: sql.to_string(),
            }),
        }
    }

    fn server(base_url: &str, model: FixedModel) -> PulseMcp {
        let client = PulseClient::new(PulseConfig::new("1", "secret").with_base_url(base_url))
            .expect("client builds");
        let prompts = Prompts::for_version(PromptVersion::SchemaDriven).expect("templates parse");
        let toolkit = PulseToolkit::with_semantics(
            client,
            Arc::new(model),
            Arc::new(prompts),
            Semantics::new(vec![cube("top_users", Some("SELECT 1")), cube("users", None)]),
        );
        PulseMcp::new(toolkit)
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake pulse listener");
        let addr = listener.local_addr().expect("listener should have an address");
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("fake pulse server stopped");
        });
        format!("http://{addr}")
    }

    fn result_json(result: &CallToolResult) -> Value {
        serde_json::to_value(result).expect("tool result serializes")
    }

    fn first_text(result: &CallToolResult) -> String {
        result_json(result)["content"][0]["text"]
            .as_str()
            .expect("first content item should be text")
            .to_string()
    }

    fn is_error(result: &CallToolResult) -> bool {
        result_json(result)["isError"].as_bool().unwrap_or(false)
    }

    #[test]
    fn registers_every_catalog_tool() {
        let server = server("http://127.0.0.1:9", FixedModel(Ok("SELECT 1")));
        let names = server.tool_names();
        for tool in TOOL_CATALOG {
            assert!(names.iter().any(|name| name == tool.name), "missing tool {}", tool.name);
        }
        assert!(names.iter().any(|name| name == "health"));
    }

    #[test]
    fn fallback_instructions_name_every_tool() {
        for tool in TOOL_CATALOG {
            assert!(FALLBACK_INSTRUCTIONS.contains(tool.name), "fallback should mention {}", tool.name);
        }
        assert!(FALLBACK_INSTRUCTIONS.contains(r#"{"error": ...}"#));
    }

    #[test]
    fn error_results_are_flagged_and_carry_the_value() {
        let result = helpers::error_result(json!({ "error": "render failed" }))
            .expect("error value serializes");
        assert!(is_error(&result));
        let error: Value = serde_json::from_str(&first_text(&result)).expect("error is json");
        assert_eq!(error, json!({ "error": "render failed" }));
    }

    #[test]
    fn instructions_embed_endpoint_view() {
        let info = server("http://127.0.0.1:9", FixedModel(Ok("SELECT 1")))
            .with_top_k(7)
            .get_info();
        let instructions = info.instructions.expect("instructions are set");
        assert!(instructions.contains("name: top_users"));
        assert!(!instructions.contains("name: users\n"));
        assert!(instructions.contains("\"page_size\": 7"));
    }

    #[tokio::test]
    async fn semantics_tool_returns_cached_yaml() {
        let server = server("http://127.0.0.1:9", FixedModel(Ok("SELECT 1")));
        let result = server.pulse_semantics().await.expect("tool succeeds");
        let text = first_text(&result);
        assert!(text.starts_with("cubes:"));
        assert!(text.contains("name: users"));
    }

    #[tokio::test]
    async fn endpoint_failure_is_reported_as_error_value() {
        let router = Router::new().route(
            "/apps/:app/:endpoint",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "endpoint failed") }),
        );
        let base_url = spawn(router).await;
        let server = server(&base_url, FixedModel(Ok("SELECT 1")));

        let result = server
            .pulse_query_endpoint(Parameters(QueryEndpointParams {
                endpoint_name: "top_users".to_string(),
                params: BTreeMap::from([("region".to_string(), json!("USA"))]),
                page_size: None,
                offset: None,
            }))
            .await
            .expect("tool call does not raise");

        assert!(is_error(&result));
        let error: Value = serde_json::from_str(&first_text(&result)).expect("error is json");
        assert_eq!(error, json!({ "error": "endpoint failed" }));
    }

    #[tokio::test]
    async fn raw_query_tool_returns_rows() {
        let router = Router::new().route(
            "/apps/:app/execute",
            post(|| async { r#"{"rows": [[1]]}"# }),
        );
        let base_url = spawn(router).await;
        let server = server(&base_url, FixedModel(Ok("SELECT 1")));

        let result = server
            .pulse_raw_query(Parameters(RawQueryParams {
                query: "SELECT 1".to_string(),
            }))
            .await
            .expect("tool call does not raise");

        assert!(!is_error(&result));
        let rows: Value = serde_json::from_str(&first_text(&result)).expect("rows are json");
        assert_eq!(rows, json!({ "rows": [[1]] }));
    }

    #[tokio::test]
    async fn generate_tool_returns_raw_completion() {
        let server = server("http://127.0.0.1:9", FixedModel(Ok("SELECT count() FROM users")));
        let result = server
            .pulse_generate_query(Parameters(GenerateQueryParams {
                input: "how many users?".to_string(),
            }))
            .await
            .expect("tool call does not raise");
        assert_eq!(first_text(&result), "SELECT count() FROM users");
    }

    #[tokio::test]
    async fn completion_failure_is_reported_as_error_value() {
        let server = server("http://127.0.0.1:9", FixedModel(Err("model offline")));
        let result = server
            .pulse_plan(Parameters(PlanQueryParams {
                query: "top users".to_string(),
            }))
            .await
            .expect("tool call does not raise");

        assert!(is_error(&result));
        let error: Value = serde_json::from_str(&first_text(&result)).expect("error is json");
        assert!(
            error["error"]
                .as_str()
                .is_some_and(|message| message.contains("model offline"))
        );
    }
}
