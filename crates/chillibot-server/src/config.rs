//! Server configuration

use crate::cli::Cli;
use crate::security::{validate_model_url, UrlValidationConfig};
use chillibot_vision::{ModelConfig, ModelSource, UrlGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Top-level bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// HTTP listener and public URL
    #[serde(default)]
    pub server: ServerConfig,

    /// LINE Messaging API credentials and endpoints
    #[serde(default)]
    pub line: LineConfig,

    /// Vision model provisioning
    #[serde(default)]
    pub model: ModelConfig,

    /// Model source URL checks
    #[serde(default)]
    pub model_source: ModelSourcePolicy,

    /// Canned text replies
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Directory inbound images are staged in while they are classified
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl BotConfig {
    /// Load configuration from file and CLI/env overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI and environment overrides
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(secret) = &cli.channel_secret {
            self.line.channel_secret = secret.clone();
        }
        if let Some(token) = &cli.access_token {
            self.line.access_token = token.clone();
        }
        if let Some(url) = &cli.model_url {
            self.model.source = ModelSource::Url { url: url.clone() };
        }
        if let Some(path) = &cli.model_path {
            self.model.local_path = PathBuf::from(path);
        }
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.line.channel_secret.is_empty() {
            anyhow::bail!("LINE channel secret is not set (line.channel_secret or CHILLIBOT_CHANNEL_SECRET)");
        }
        if self.line.access_token.is_empty() {
            anyhow::bail!("LINE access token is not set (line.access_token or CHILLIBOT_ACCESS_TOKEN)");
        }
        if let ModelSource::Url { url } = &self.model.source {
            validate_model_url(url, &self.model_source.validation())
                .map_err(|e| anyhow::anyhow!("Invalid model source URL: {}", e))?;
        }
        if let Some(base) = &self.server.public_base_url {
            let parsed = url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("Invalid public_base_url: {}", e))?;
            if parsed.scheme() != "https" {
                anyhow::bail!("public_base_url must use https, LINE rejects other image URLs");
            }
        }
        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest webhook body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Public HTTPS origin of this server; enables image replies
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            public_base_url: None,
            static_dir: default_static_dir(),
        }
    }
}

/// LINE Messaging API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Channel secret for webhook signatures
    #[serde(default)]
    pub channel_secret: String,

    /// Channel access token for the Messaging API
    #[serde(default)]
    pub access_token: String,

    /// Messaging API origin
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Content API origin
    #[serde(default = "default_data_api_base")]
    pub data_api_base: String,

    /// Request timeout for LINE API calls
    #[serde(default = "default_line_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: String::new(),
            access_token: String::new(),
            api_base: default_api_base(),
            data_api_base: default_data_api_base(),
            timeout_secs: default_line_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("data_api_base", &self.data_api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which model source URLs are acceptable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSourcePolicy {
    /// Allow plain HTTP and local/private hosts (development only)
    #[serde(default)]
    pub allow_insecure: bool,

    /// Restrict downloads to these domains
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
}

impl ModelSourcePolicy {
    /// URL validation rules for this policy
    pub fn validation(&self) -> UrlValidationConfig {
        let base = if self.allow_insecure {
            UrlValidationConfig::development()
        } else {
            UrlValidationConfig::default()
        };
        UrlValidationConfig {
            allowed_domains: self.allowed_domains.clone(),
            ..base
        }
    }

    /// Download guard applying these rules to every URL the provisioner
    /// contacts, redirects and confirmation pages included
    pub fn url_guard(&self) -> UrlGuard {
        let validation = self.validation();
        Arc::new(move |url: &Url| -> chillibot_core::Result<()> {
            validate_model_url(url.as_str(), &validation)
                .map(|_| ())
                .map_err(|e| chillibot_core::Error::provision(format!("Refusing to fetch {}: {}", url, e)))
        })
    }
}

/// Text reply configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Prefix for echoed messages
    #[serde(default = "default_echo_prefix")]
    pub echo_prefix: String,

    /// Exact (case-insensitive) message -> reply
    #[serde(default = "default_replies")]
    pub replies: BTreeMap<String, String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            echo_prefix: default_echo_prefix(),
            replies: default_replies(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("chillibot")
}

fn default_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_data_api_base() -> String {
    "https://api-data.line.me".to_string()
}

fn default_line_timeout_secs() -> u64 {
    30
}

fn default_echo_prefix() -> String {
    "You said: ".to_string()
}

fn default_replies() -> BTreeMap<String, String> {
    [
        ("hello", "Hi there! Send me a photo of a chilli leaf or fruit and I'll check it for disease."),
        ("hi", "Hi there! Send me a photo of a chilli leaf or fruit and I'll check it for disease."),
        ("how are you", "I'm just a bot, but I'm doing great! Thanks for asking."),
        ("help", "Take a clear, close-up photo of one chilli leaf or fruit in daylight and send it here. I'll tell you what disease it may have and what to do."),
        ("bye", "Goodbye! Have a great day!"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
