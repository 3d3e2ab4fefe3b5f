use clap::{Parser, builder::BoolishValueParser};
use pulse_core::client::{DEFAULT_BASE_URL, DEFAULT_OFFSET, PulseConfig};
use pulse_core::completion::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use pulse_core::prompts::PromptVersion;
use pulse_core::toolkit::DEFAULT_TOP_K;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4030";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROMPT_VERSION: &str = "schema-driven";

#[derive(Parser, Debug)]
#[command(name = "pulse-mcpd", version, about = "Pulse MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "PULSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long = "app-id", env = "PULSE_APP_ID")]
    application_id: Option<String>,

    #[arg(long, env = "PULSE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "PULSE_PAGE_SIZE")]
    page_size: Option<u64>,

    #[arg(long, env = "PULSE_DEFAULT_OFFSET", default_value_t = DEFAULT_OFFSET)]
    default_offset: u64,

    #[arg(
        long,
        env = "PULSE_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    request_timeout_secs: u64,

    #[arg(long, env = "PULSE_PROMPT_VERSION", default_value = DEFAULT_PROMPT_VERSION)]
    prompt_version: String,

    #[arg(long, env = "PULSE_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: u64,

    #[arg(long, env = "PULSE_LLM_URL", default_value = DEFAULT_OLLAMA_URL)]
    llm_url: String,

    #[arg(long, env = "PULSE_LLM_MODEL", default_value = DEFAULT_OLLAMA_MODEL)]
    llm_model: String,

    #[arg(
        long = "stdio",
        env = "PULSE_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(long, env = "PULSE_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Debug, Clone)]
pub struct PulseMcpConfig {
    pub pulse: PulseConfig,
    pub prompt_version: PromptVersion,
    pub top_k: u64,
    pub llm_url: String,
    pub llm_model: String,
    pub enable_stdio: bool,
    pub mcp_http_addr: SocketAddr,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl PulseMcpConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl TryFrom<CliArgs> for PulseMcpConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let api_key = non_blank(args.api_key).ok_or(ConfigError::MissingSetting("PULSE_API_KEY"))?;
        let application_id =
            non_blank(args.application_id).ok_or(ConfigError::MissingSetting("PULSE_APP_ID"))?;

        let prompt_version = args
            .prompt_version
            .parse::<PromptVersion>()
            .map_err(|_| ConfigError::InvalidSetting {
                name: "PULSE_PROMPT_VERSION",
                value: args.prompt_version.clone(),
            })?;

        if args.page_size == Some(0) {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_PAGE_SIZE",
                value: "0".to_string(),
            });
        }
        if args.top_k == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_TOP_K",
                value: "0".to_string(),
            });
        }
        if args.llm_model.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_LLM_MODEL",
                value: args.llm_model,
            });
        }

        let request_timeout = if args.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.request_timeout_secs))
        };

        Ok(Self {
            pulse: PulseConfig {
                base_url: args.base_url,
                application_id: Some(application_id),
                api_key: Some(api_key),
                default_offset: args.default_offset,
                page_size: args.page_size,
                request_timeout,
            },
            prompt_version,
            top_k: args.top_k,
            llm_url: args.llm_url,
            llm_model: args.llm_model,
            enable_stdio: args.enable_stdio,
            mcp_http_addr: args.mcp_http_addr,
        })
    }
}
