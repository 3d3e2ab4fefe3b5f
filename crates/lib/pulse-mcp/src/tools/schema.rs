use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    tool,
    tool_router,
};
use serde_json::json;
use tracing::warn;

use crate::PulseMcp;
use crate::helpers;

#[tool_router(router = tool_router_schema, vis = "pub")]
impl PulseMcp {
    #[tool(description = "Returns the semantics of every cube in the application as YAML. Cubes with a `sql` property are predefined endpoints; the rest are raw tables.")]
    pub(crate) async fn pulse_semantics(&self) -> Result<CallToolResult, ErrorData> {
        match self.toolkit().semantics_yaml() {
            Ok(yaml) => Ok(CallToolResult::success(vec![Content::text(yaml)])),
            Err(err) => {
                warn!(error = %err, "semantics tool call failed");
                helpers::error_result(json!({ "error": err.to_string() }))
            }
        }
    }
}
