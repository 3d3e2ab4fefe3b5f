use pulse_semantics::EndpointQueryParams;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{PulseClient, PulseError};

/// Pagination controls for endpoint queries. Unset fields fall back to the
/// client configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: Option<u64>,
    pub offset: Option<u64>,
}

impl Pagination {
    #[must_use]
    pub const fn new(page_size: Option<u64>, offset: Option<u64>) -> Self {
        Self { page_size, offset }
    }
}

impl PulseClient {
    /// Invokes a predefined endpoint cube by name.
    ///
    /// The name is not checked against the semantics; the service decides.
    ///
    /// # Errors
    /// Returns `PulseError` on transport failure, non-2xx status, or a
    /// non-JSON body.
    pub async fn try_query_endpoint(
        &self,
        request: &EndpointQueryParams,
        page: Pagination,
    ) -> Result<Value, PulseError> {
        let mut url = self.app_url(&request.endpoint_name)?;
        let offset = page.offset.unwrap_or(self.default_offset);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("paginate", "true")
                .append_pair("offset", &offset.to_string());
            if let Some(page_size) = page.page_size.or(self.page_size) {
                query.append_pair("page_size", &page_size.to_string());
            }
        }

        debug!(endpoint = %request.endpoint_name, offset, "querying pulse endpoint");
        self.send_json(self.http.post(url).json(&request.params)).await
    }

    /// Like [`Self::try_query_endpoint`], but failures come back as an
    /// `{"error": ...}` value so the agent can keep going.
    pub async fn query_endpoint(&self, request: &EndpointQueryParams, page: Pagination) -> Value {
        self.try_query_endpoint(request, page)
            .await
            .unwrap_or_else(|err| {
                warn!(endpoint = %request.endpoint_name, error = %err, "pulse endpoint query failed");
                err.to_error_value()
            })
    }

    /// Submits SQL verbatim to the application's execute endpoint.
    ///
    /// # Errors
    /// Returns `PulseError` on transport failure, non-2xx status, or a
    /// non-JSON body.
    pub async fn try_raw_query(&self, sql: &str) -> Result<Value, PulseError> {
        let url = self.app_url("execute")?;
        debug!(sql_len = sql.len(), "executing raw pulse query");
        self.send_json(self.http.post(url).json(&json!({ "query": sql })))
            .await
    }

    /// Like [`Self::try_raw_query`], degrading failures to an error value.
    pub async fn raw_query(&self, sql: &str) -> Value {
        self.try_raw_query(sql).await.unwrap_or_else(|err| {
            warn!(error = %err, "raw pulse query failed");
            err.to_error_value()
        })
    }
}
