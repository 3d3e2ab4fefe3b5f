use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content};
use serde_json::Value;

/// Tool result flagged as failed, carrying an `{"error": ...}` value.
pub(crate) fn error_result(value: Value) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::error(vec![Content::json(value)?]))
}
