//! Configuration system for weir.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment -> CLI overrides. The file is read from
//! `~/.config/weir/config.toml`, then `./weir.toml`, then an explicit
//! `--config` path. Environment variables use the `WEIR_` prefix with `__`
//! as the section separator (`WEIR_SERVER__PORT=9090`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeirConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every API request.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// SQLite settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("weir.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Also write daily-rotated JSON logs here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// KServe serving runtime access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesConfig {
    pub enabled: bool,
    pub in_cluster: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    pub default_namespace: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            in_cluster: false,
            kubeconfig: None,
            default_namespace: "model-serving".to_string(),
        }
    }
}

/// Envoy AI Gateway access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub in_cluster: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    /// Namespace for virtual-model routes and unqualified backends.
    pub default_namespace: String,
    /// Gateway the routes attach to.
    pub gateway_name: String,
    pub gateway_namespace: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            in_cluster: false,
            kubeconfig: None,
            default_namespace: "model-serving".to_string(),
            gateway_name: "ai-gateway".to_string(),
            gateway_namespace: "envoy-gateway-system".to_string(),
        }
    }
}

/// Load configuration with layered merging.
///
/// Later layers win: defaults, user config, `./weir.toml`, `explicit`,
/// `WEIR_*` environment variables, then `overrides`.
pub fn load_config(
    explicit: Option<&Path>,
    overrides: Option<&WeirConfig>,
) -> Result<WeirConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(WeirConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "weir", "weir") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    let local = Path::new("weir.toml");
    if local.exists() {
        figment = figment.merge(Toml::file(local));
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("WEIR_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
