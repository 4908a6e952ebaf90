//! Configuration loading for the hazrep backend.
//!
//! A config file is optional: every section has working defaults so the
//! service boots bare. The format is inferred from the file extension
//! (`.toml`, `.yaml`/`.yml`, `.json`), each behind its own cargo feature.
//! A handful of environment variables override file values for containerized
//! deployments.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Raw, all-optional view of a config file.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub queue: Option<QueueSection>,
    #[serde(default)]
    pub workflow: Option<WorkflowSection>,
    #[serde(default)]
    pub generation: Option<GenerationSection>,
    #[serde(default)]
    pub secrets: Option<SecretsSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct QueueSection {
    #[serde(default)]
    pub visibility_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_receive_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowSection {
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationSection {
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub message_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SecretsSection {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub secret_ref: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub workflow: WorkflowConfig,
    pub generation: GenerationConfig,
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub visibility_timeout_secs: u64,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub auth_url: String,
    pub message_url: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecretsConfig {
    pub file: Option<String>,
    pub secret_ref: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8088,
            },
            logging: LoggingConfig {
                level: "info".into(),
                json: false,
            },
            database: DatabaseConfig {
                url: "sqlite://hazrep.db".into(),
                max_connections: 10,
                min_connections: 1,
            },
            queue: QueueConfig {
                visibility_timeout_secs: 30,
                max_receive_count: 5,
            },
            workflow: WorkflowConfig { max_retries: 3 },
            generation: GenerationConfig {
                auth_url: "http://localhost:9090/auth".into(),
                message_url: "http://localhost:9090/messages".into(),
                callback_url: None,
            },
            secrets: SecretsConfig {
                file: None,
                secret_ref: "hazrep/tenants".into(),
            },
        }
    }
}

/// Load a RawConfigFile from a path. The format is inferred from the
/// extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

/// Parse configuration from a string with optional format hint
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        other => Err(ConfigError::Parse(format!(
            "unsupported config format: {other:?}"
        ))),
    }
}

/// Load configuration: explicit path, else `HAZREP_CONFIG_PATH`, else pure
/// defaults. Environment overrides and validation are applied either way.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let raw = match path {
        Some(p) => Some(load_raw_from_file(p)?),
        None => match env::var("HAZREP_CONFIG_PATH") {
            Ok(p) if !p.is_empty() => Some(load_raw_from_file(p)?),
            _ => None,
        },
    };

    let mut config = resolve(raw.unwrap_or_default());
    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn resolve(raw: RawConfigFile) -> Config {
    let mut config = Config::default();

    if let Some(server) = raw.server {
        if let Some(host) = server.host {
            config.server.host = host;
        }
        if let Some(port) = server.port {
            config.server.port = port;
        }
    }
    if let Some(logging) = raw.logging {
        if let Some(level) = logging.level {
            config.logging.level = level;
        }
        if let Some(json) = logging.json {
            config.logging.json = json;
        }
    }
    if let Some(database) = raw.database {
        if let Some(url) = database.url {
            config.database.url = url;
        }
        if let Some(max) = database.max_connections {
            config.database.max_connections = max;
        }
        if let Some(min) = database.min_connections {
            config.database.min_connections = min;
        }
    }
    if let Some(queue) = raw.queue {
        if let Some(timeout) = queue.visibility_timeout_secs {
            config.queue.visibility_timeout_secs = timeout;
        }
        if let Some(cap) = queue.max_receive_count {
            config.queue.max_receive_count = cap;
        }
    }
    if let Some(workflow) = raw.workflow {
        if let Some(max_retries) = workflow.max_retries {
            config.workflow.max_retries = max_retries;
        }
    }
    if let Some(generation) = raw.generation {
        if let Some(auth_url) = generation.auth_url {
            config.generation.auth_url = auth_url;
        }
        if let Some(message_url) = generation.message_url {
            config.generation.message_url = message_url;
        }
        if generation.callback_url.is_some() {
            config.generation.callback_url = generation.callback_url;
        }
    }
    if let Some(secrets) = raw.secrets {
        if secrets.file.is_some() {
            config.secrets.file = secrets.file;
        }
        if let Some(secret_ref) = secrets.secret_ref {
            config.secrets.secret_ref = secret_ref;
        }
    }

    config
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = env::var("HAZREP_DATABASE_URL") {
        if !url.is_empty() {
            config.database.url = url;
        }
    }
    if let Ok(file) = env::var("HAZREP_SECRETS_FILE") {
        if !file.is_empty() {
            config.secrets.file = Some(file);
        }
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be non-zero".into()));
    }
    if config.database.url.trim().is_empty() {
        return Err(ConfigError::Validation("database.url cannot be empty".into()));
    }
    if config.workflow.max_retries == 0 {
        return Err(ConfigError::Validation(
            "workflow.max_retries must be at least 1".into(),
        ));
    }
    if config.queue.visibility_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "queue.visibility_timeout_secs must be at least 1".into(),
        ));
    }
    if config.queue.max_receive_count == 0 {
        return Err(ConfigError::Validation(
            "queue.max_receive_count must be at least 1".into(),
        ));
    }

    validate_url("generation.auth_url", &config.generation.auth_url)?;
    validate_url("generation.message_url", &config.generation.message_url)?;
    if let Some(callback_url) = &config.generation.callback_url {
        validate_url("generation.callback_url", callback_url)?;
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{field} is not a valid URL: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.workflow.max_retries, 3);
        assert_eq!(config.queue.visibility_timeout_secs, 30);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn loads_partial_toml_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hazrep.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9900

[workflow]
max_retries = 4

[generation]
auth_url = "https://gen.example.com/auth"
message_url = "https://gen.example.com/messages"
callback_url = "https://hazrep.example.com/webhook"
"#,
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.server.port, 9900);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.workflow.max_retries, 4);
        assert_eq!(
            config.generation.callback_url.as_deref(),
            Some("https://hazrep.example.com/webhook")
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn loads_json_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hazrep.json");
        std::fs::write(
            &path,
            r#"{"queue": {"visibility_timeout_secs": 5, "max_receive_count": 2}}"#,
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.queue.visibility_timeout_secs, 5);
        assert_eq!(config.queue.max_receive_count, 2);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn loads_yaml_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hazrep.yaml");
        std::fs::write(&path, "secrets:\n  file: /etc/hazrep/secrets.json\n").expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.secrets.file.as_deref(), Some("/etc/hazrep/secrets.json"));
        assert_eq!(config.secrets.secret_ref, "hazrep/tenants");
    }

    #[test]
    fn rejects_zero_retry_bound() {
        let mut config = Config::default();
        config.workflow.max_retries = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_invalid_generation_url() {
        let mut config = Config::default();
        config.generation.auth_url = "not a url".into();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unsupported_extension_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hazrep.ini");
        std::fs::write(&path, "whatever").expect("write");
        assert!(matches!(
            load_raw_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
