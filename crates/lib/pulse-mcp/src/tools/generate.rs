use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::PulseMcp;
use crate::helpers;

/// Parameters for drafting SQL from a natural-language request.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GenerateQueryParams {
    /// The user's request, in their own words.
    pub input: String,
}

/// Parameters for planning the tool calls that answer a question.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PlanQueryParams {
    pub query: String,
}

#[tool_router(router = tool_router_generate, vis = "pub")]
impl PulseMcp {
    #[tool(description = "Drafts a Clickhouse SQL query over the raw table cubes for a natural-language request. Returns the model's answer unchanged; run the SQL with pulse_raw_query.")]
    pub(crate) async fn pulse_generate_query(
        &self,
        Parameters(params): Parameters<GenerateQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.toolkit().generate_query(&params.input).await {
            Ok(sql) => Ok(CallToolResult::success(vec![Content::text(sql)])),
            Err(err) => {
                warn!(error = %err, "query generation failed");
                helpers::error_result(err.to_error_value())
            }
        }
    }

    #[tool(description = "Breaks a question down into a JSON plan of tool calls using the cube semantics. The plan is not validated.")]
    pub(crate) async fn pulse_plan(
        &self,
        Parameters(params): Parameters<PlanQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.toolkit().plan_query(&params.query).await {
            Ok(plan) => Ok(CallToolResult::success(vec![Content::text(plan)])),
            Err(err) => {
                warn!(error = %err, "query planning failed");
                helpers::error_result(err.to_error_value())
            }
        }
    }
}
