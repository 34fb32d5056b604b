use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8069;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub webhooks: WebhookConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser origins allowed to call the API. Empty disables CORS entirely.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `gateway.db` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookConfig {
    /// Shared HMAC-SHA256 secret for `X-OpenClaw-Signature`.
    #[serde(default)]
    pub secret: Option<String>,

    /// Accept unsigned callbacks when no secret is configured.
    #[serde(default)]
    pub allow_unsigned: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_API_PORT
}
fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            stdout: true,
        }
    }
}

/// Root data directory: `~/.openclaw-gateway`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openclaw-gateway")
}

pub fn default_config_path() -> PathBuf {
    match std::env::var("OPENCLAW_GATEWAY_CONFIG") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => data_dir().join("gateway.toml"),
    }
}

impl GatewayConfig {
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let path = config_path.as_ref();
        let mut config = if path.exists() {
            let content =
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
            Self::parse(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!("No config at {:?}, using defaults.", path);
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("OPENCLAW_WEBHOOK_SECRET")
            && !secret.is_empty()
        {
            self.webhooks.secret = Some(secret);
        }
        if let Ok(db) = std::env::var("OPENCLAW_DATABASE")
            && !db.is_empty()
        {
            self.database.path = Some(PathBuf::from(db));
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join("gateway.db"))
    }

    /// The configured secret, ignoring blank values.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhooks
            .secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_locked_down() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, DEFAULT_API_PORT);
        assert!(cfg.webhook_secret().is_none());
        assert!(!cfg.webhooks.allow_unsigned);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.stdout);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 9000
cors_origins = ["https://n8n.example.com"]

[database]
path = "/var/lib/openclaw/gateway.db"

[webhooks]
secret = "s3cret"

[logging]
level = "debug"
stdout = false
"#;
        let cfg = GatewayConfig::parse(toml_str).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.cors_origins.len(), 1);
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/var/lib/openclaw/gateway.db")
        );
        assert_eq!(cfg.webhook_secret(), Some("s3cret"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(!cfg.logging.stdout);
    }

    #[test]
    fn blank_secret_counts_as_unset() {
        let cfg = GatewayConfig::parse("[webhooks]\nsecret = \"  \"\n").unwrap();
        assert!(cfg.webhook_secret().is_none());
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig::load(dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(cfg.server.host, DEFAULT_API_HOST);
    }

    #[tokio::test]
    async fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();
        let err = GatewayConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
