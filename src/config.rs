use serde::Deserialize;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_API_KEY_ENV: &str = "PERPLEXITY_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub static_dir: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_methods")]
    pub allow_methods: Vec<String>,
    #[serde(default = "default_cors_headers")]
    pub allow_headers: Vec<String>,
    #[serde(default = "default_cors_expose_headers")]
    pub expose_headers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub to_stdout: bool,
    #[serde(default)]
    pub file: Option<LogFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogFileConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing environment variable `{0}`")]
    MissingEnvVar(String),
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            service_name: default_service_name(),
            static_dir: None,
            max_body_bytes: default_max_body_bytes(),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            observability: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            api_key_env: default_api_key_env(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            trust_forwarded_headers: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            allow_methods: default_cors_methods(),
            allow_headers: default_cors_headers(),
            expose_headers: default_cors_expose_headers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            to_stdout: true,
            file: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(yaml)?;
        let mut config: Self = serde_yaml::from_str(&interpolated)?;
        config.upstream.resolve_api_key();
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(port) = env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("invalid PORT value `{port}`")))?;
            config.listen = format!("0.0.0.0:{port}");
        }
        config.upstream.resolve_api_key();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "`listen` must be a socket address, got `{}`",
                self.listen
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "`max_body_bytes` must be > 0".to_string(),
            ));
        }

        if let Some(dir) = &self.static_dir
            && dir.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "`static_dir` must not be empty when set".to_string(),
            ));
        }

        let upstream = &self.upstream;
        if !(upstream.base_url.starts_with("http://") || upstream.base_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "`upstream.base_url` must be an http(s) URL, got `{}`",
                upstream.base_url
            )));
        }

        if !upstream.chat_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "`upstream.chat_path` must start with `/`".to_string(),
            ));
        }

        if upstream.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "`upstream.connect_timeout_ms` must be > 0".to_string(),
            ));
        }

        if upstream.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "`upstream.request_timeout_ms` must be > 0".to_string(),
            ));
        }

        let rate_limit = &self.rate_limit;
        if rate_limit.max_requests == 0 {
            return Err(ConfigError::Validation(
                "`rate_limit.max_requests` must be > 0".to_string(),
            ));
        }

        if rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation(
                "`rate_limit.window_ms` must be > 0".to_string(),
            ));
        }

        if rate_limit.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "`rate_limit.sweep_interval_ms` must be > 0".to_string(),
            ));
        }

        if self
            .cors
            .allow_origins
            .iter()
            .any(|origin| origin.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "`cors.allow_origins` must not contain empty values".to_string(),
            ));
        }

        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.observability
            .as_ref()
            .map(|observability| observability.logging.clone())
            .unwrap_or_default()
    }
}

impl UpstreamConfig {
    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }

    fn resolve_api_key(&mut self) {
        let literal = self
            .api_key
            .take()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self.api_key = literal.or_else(|| {
            env::var(self.api_key_env.trim())
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
        });
    }
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(rel_start) = input[cursor..].find("${") {
        let start = cursor + rel_start;
        out.push_str(&input[cursor..start]);

        let key_start = start + 2;
        let rel_end = input[key_start..].find('}').ok_or_else(|| {
            ConfigError::Validation("unterminated `${...}` expression".to_string())
        })?;
        let end = key_start + rel_end;
        let key = &input[key_start..end];

        if key.is_empty() {
            return Err(ConfigError::Validation(
                "empty environment variable name in `${}`".to_string(),
            ));
        }

        let value = env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
        out.push_str(&value);
        cursor = end + 1;
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_service_name() -> String {
    "PT. Teknologi Maju Indonesia API Proxy".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_chat_path() -> String {
    "/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "PTTeknologiMaju-Proxy/1.0".to_string()
}

fn default_max_requests() -> u32 {
    30
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_cors_methods() -> Vec<String> {
    vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()]
}

fn default_cors_headers() -> Vec<String> {
    vec!["content-type".to_string(), "authorization".to_string()]
}

fn default_cors_expose_headers() -> Vec<String> {
    vec!["x-request-id".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "chat-gw".to_string()
}

fn default_log_max_files() -> usize {
    7
}
