use std::collections::BTreeMap;

use pulse_core::client::Pagination;
use pulse_semantics::EndpointQueryParams;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::PulseMcp;
use crate::helpers;

/// Parameters for running a predefined endpoint cube.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueryEndpointParams {
    /// Name of the endpoint cube.
    pub endpoint_name: String,
    /// Values for the parameters the endpoint declares.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Rows per page.
    pub page_size: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
}

impl QueryEndpointParams {
    fn into_request(self) -> (EndpointQueryParams, Pagination) {
        let request = EndpointQueryParams {
            endpoint_name: self.endpoint_name,
            params: self.params,
        };
        (request, Pagination::new(self.page_size, self.offset))
    }
}

/// Parameters for executing SQL against the raw tables.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RawQueryParams {
    /// Clickhouse SQL, submitted verbatim.
    pub query: String,
}

#[tool_router(router = tool_router_query, vis = "pub")]
impl PulseMcp {
    #[tool(description = "Runs a predefined endpoint cube by name. Pass the endpoint's declared parameters in `params`; `page_size` and `offset` control pagination. Failures come back as {\"error\": ...}.")]
    pub(crate) async fn pulse_query_endpoint(
        &self,
        Parameters(params): Parameters<QueryEndpointParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let (request, page) = params.into_request();
        match self.toolkit().client().try_query_endpoint(&request, page).await {
            Ok(value) => Ok(CallToolResult::success(vec![Content::json(value)?])),
            Err(err) => {
                warn!(endpoint = %request.endpoint_name, error = %err, "endpoint tool call failed");
                helpers::error_result(err.to_error_value())
            }
        }
    }

    #[tool(description = "Executes a Clickhouse SQL query against the raw table cubes. Draft the SQL with pulse_generate_query first. Failures come back as {\"error\": ...}.")]
    pub(crate) async fn pulse_raw_query(
        &self,
        Parameters(params): Parameters<RawQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.toolkit().client().try_raw_query(&params.query).await {
            Ok(value) => Ok(CallToolResult::success(vec![Content::json(value)?])),
            Err(err) => {
                warn!(error = %err, "raw query tool call failed");
                helpers::error_result(err.to_error_value())
            }
        }
    }
}
