use pulse_semantics::Semantics;
use tracing::{debug, info};

use super::{PulseClient, PulseError};

impl PulseClient {
    /// Fetches the semantics snapshot for the configured application.
    ///
    /// # Errors
    /// Returns `PulseError::Transport` on connection failure or a non-2xx
    /// status, and `PulseError::Parse` if the body is not a valid snapshot.
    pub async fn fetch_semantics(&self) -> Result<Semantics, PulseError> {
        let url = self.app_url("semantics")?;
        debug!(%url, "fetching pulse semantics");
        let semantics: Semantics = self.send_json(self.http.get(url)).await?;
        let endpoint_count = semantics.cubes.iter().filter(|cube| cube.is_endpoint()).count();
        info!(
            application_id = %self.application_id,
            cubes = semantics.cubes.len(),
            endpoints = endpoint_count,
            "fetched pulse semantics"
        );
        Ok(semantics)
    }
}
