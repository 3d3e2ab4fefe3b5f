use std::{env, error::Error, fmt, time::Duration};

use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

pub mod query;
pub mod semantics;

pub use query::Pagination;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const ENV_API_KEY: &str = "PULSE_API_KEY";
pub const ENV_APPLICATION_ID: &str = "PULSE_APP_ID";
pub const ENV_BASE_URL: &str = "PULSE_BASE_URL";

/// Offset applied to endpoint queries that do not specify one.
pub const DEFAULT_OFFSET: u64 = 0;

/// Setup failures detected before any request is sent.
#[derive(Debug)]
pub enum ConfigurationError {
    MissingApiKey,
    InvalidApiKey,
    MissingApplicationId,
    InvalidBaseUrl(String),
    Client(reqwest::Error),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "missing Pulse API key (set {ENV_API_KEY})"),
            Self::InvalidApiKey => write!(f, "Pulse API key is not a valid header value"),
            Self::MissingApplicationId => {
                write!(f, "missing Pulse application id (set {ENV_APPLICATION_ID})")
            }
            Self::InvalidBaseUrl(url) => write!(f, "invalid Pulse base url: {url}"),
            Self::Client(err) => write!(f, "failed to build http client: {err}"),
        }
    }
}

impl Error for ConfigurationError {}

/// Failed round trip: the connection broke or the service answered non-2xx.
///
/// `status` and `body` are only present when the service responded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub message: String,
}

impl TransportError {
    fn from_reqwest(err: &reqwest::Error) -> Self {
        Self {
            status: err.status().map(|status| status.as_u16()),
            body: None,
            message: err.to_string(),
        }
    }

    /// Text reported back to the agent: the raw body when one exists.
    #[must_use]
    pub fn detail(&self) -> &str {
        self.body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or(&self.message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.body.as_deref()) {
            (Some(status), Some(body)) if !body.is_empty() => {
                write!(f, "{} (status {status}): {body}", self.message)
            }
            (Some(status), _) => write!(f, "{} (status {status})", self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl Error for TransportError {}

#[derive(Debug)]
pub enum PulseError {
    Configuration(ConfigurationError),
    Transport(TransportError),
    Parse(serde_json::Error),
}

impl PulseError {
    /// Structured `{"error": ...}` value handed to the agent in place of a result.
    #[must_use]
    pub fn to_error_value(&self) -> Value {
        let message = match self {
            Self::Transport(err) => err.detail().to_string(),
            Self::Configuration(err) => err.to_string(),
            Self::Parse(err) => format!("unexpected response body: {err}"),
        };
        json!({ "error": message })
    }
}

impl fmt::Display for PulseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "unexpected response body: {err}"),
        }
    }
}

impl Error for PulseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for PulseError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<TransportError> for PulseError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Connection settings for a Pulse application.
#[derive(Clone)]
pub struct PulseConfig {
    pub base_url: String,
    pub application_id: Option<String>,
    pub api_key: Option<String>,
    pub default_offset: u64,
    pub page_size: Option<u64>,
    pub request_timeout: Option<Duration>,
}

impl PulseConfig {
    pub fn new(application_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            application_id: Some(application_id.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Reads `PULSE_APP_ID`, `PULSE_API_KEY` and `PULSE_BASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_fallback()
    }

    /// Fills unset credentials from the environment; explicit values win.
    #[must_use]
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback_from(&|name| env::var(name).ok())
    }

    /// Blank lookups count as unset.
    #[must_use]
    fn with_fallback_from(mut self, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if self.application_id.is_none() {
            self.application_id = non_blank(ENV_APPLICATION_ID);
        }
        if self.api_key.is_none() {
            self.api_key = non_blank(ENV_API_KEY);
        }
        if self.base_url == DEFAULT_BASE_URL
            && let Some(base_url) = non_blank(ENV_BASE_URL)
        {
            self.base_url = base_url;
        }
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn with_default_offset(mut self, default_offset: u64) -> Self {
        self.default_offset = default_offset;
        self
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            application_id: None,
            api_key: None,
            default_offset: DEFAULT_OFFSET,
            page_size: None,
            request_timeout: None,
        }
    }
}

impl fmt::Debug for PulseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseConfig")
            .field("base_url", &self.base_url)
            .field("application_id", &self.application_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("default_offset", &self.default_offset)
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// HTTP client bound to one Pulse application.
#[derive(Clone)]
pub struct PulseClient {
    http: reqwest::Client,
    base_url: Url,
    application_id: String,
    api_key: String,
    default_offset: u64,
    page_size: Option<u64>,
}

impl fmt::Debug for PulseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseClient")
            .field("base_url", &self.base_url.as_str())
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

impl PulseClient {
    /// Validates the configuration and builds the client.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the credential or application id is
    /// missing, or the base url is unusable.
    pub fn new(config: PulseConfig) -> Result<Self, ConfigurationError> {
        let PulseConfig {
            base_url,
            application_id,
            api_key,
            default_offset,
            page_size,
            request_timeout,
        } = config;

        let api_key = api_key
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigurationError::MissingApiKey)?;
        let application_id = application_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigurationError::MissingApplicationId)?;
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(ConfigurationError::InvalidApiKey);
        }

        let parsed = Url::parse(&base_url)
            .map_err(|_| ConfigurationError::InvalidBaseUrl(base_url.clone()))?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigurationError::InvalidBaseUrl(base_url));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ConfigurationError::Client)?;

        Ok(Self {
            http,
            base_url: parsed,
            application_id,
            api_key,
            default_offset,
            page_size,
        })
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/apps/{application_id}/{segment}` with the segment percent-encoded.
    fn app_url(&self, segment: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError {
                status: None,
                body: None,
                message: format!("invalid Pulse base url: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(["apps", self.application_id.as_str(), segment]);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Sends the request and decodes a 2xx JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, PulseError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| TransportError::from_reqwest(&err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::from_reqwest(&err))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "pulse request rejected");
            return Err(PulseError::Transport(TransportError {
                status: Some(status.as_u16()),
                body: Some(body),
                message: format!("pulse request failed with {status}"),
            }));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup_from(
        vars: &[(&'static str, &'static str)],
    ) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<&str, &str> = vars.iter().copied().collect();
        move |name| vars.get(name).map(|value| (*value).to_string())
    }

    #[test]
    fn fallback_fills_only_unset_fields() {
        let lookup = lookup_from(&[
            (ENV_APPLICATION_ID, "from-env"),
            (ENV_API_KEY, "env-key"),
            (ENV_BASE_URL, "http://env.local"),
        ]);

        let filled = PulseConfig::default().with_fallback_from(&lookup);
        assert_eq!(filled.application_id.as_deref(), Some("from-env"));
        assert_eq!(filled.api_key.as_deref(), Some("env-key"));
        assert_eq!(filled.base_url, "http://env.local");

        let explicit = PulseConfig::new("42", "explicit-key")
            .with_base_url("http://explicit.local")
            .with_fallback_from(&lookup);
        assert_eq!(explicit.application_id.as_deref(), Some("42"));
        assert_eq!(explicit.api_key.as_deref(), Some("explicit-key"));
        assert_eq!(explicit.base_url, "http://explicit.local");
    }

    #[test]
    fn blank_fallback_values_stay_unset() {
        let lookup = lookup_from(&[
            (ENV_APPLICATION_ID, ""),
            (ENV_API_KEY, "   "),
            (ENV_BASE_URL, " "),
        ]);

        let config = PulseConfig::default().with_fallback_from(&lookup);
        assert_eq!(config.application_id, None);
        assert_eq!(config.api_key, None);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(matches!(
            PulseClient::new(config),
            Err(ConfigurationError::MissingApiKey)
        ));
    }

    #[test]
    fn missing_api_key_fails_fast() {
        let config = PulseConfig {
            application_id: Some("1".to_string()),
            ..PulseConfig::default()
        };
        let err = PulseClient::new(config).expect_err("api key is required");
        assert!(matches!(err, ConfigurationError::MissingApiKey));
    }

    #[test]
    fn blank_application_id_fails_fast() {
        let err = PulseClient::new(PulseConfig::new("  ", "secret"))
            .expect_err("application id is required");
        assert!(matches!(err, ConfigurationError::MissingApplicationId));
    }

    #[test]
    fn rejects_unusable_base_url() {
        let config = PulseConfig::new("1", "secret").with_base_url("mailto:pulse@example.com");
        let err = PulseClient::new(config).expect_err("base url must be hierarchical");
        assert!(matches!(err, ConfigurationError::InvalidBaseUrl(_)));
    }

    #[test]
    fn builds_app_urls_under_base_path() {
        let config = PulseConfig::new("42", "secret").with_base_url("http://pulse.local/api/");
        let client = PulseClient::new(config).expect("client should build");

        let url = client.app_url("top users").expect("url should build");
        assert_eq!(url.as_str(), "http://pulse.local/api/apps/42/top%20users");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let rendered = format!("{:?}", PulseConfig::new("1", "super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn transport_detail_prefers_body() {
        let err = TransportError {
            status: Some(500),
            body: Some("endpoint failed".to_string()),
            message: "pulse request failed".to_string(),
        };
        assert_eq!(err.detail(), "endpoint failed");

        let err = TransportError {
            status: None,
            body: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            PulseError::Transport(err).to_error_value(),
            json!({ "error": "connection refused" })
        );
    }
}
