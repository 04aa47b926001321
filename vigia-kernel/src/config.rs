use crate::error::ConfigError;
use crate::forecast::ForecastConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub const CONFIG_ENV: &str = "VIGIA_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "vigia.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub api: ApiConf,
    pub store: StoreConfig,
    pub schedule: ScheduleConf,
    pub alerts: AlertsConf,
    pub graph: GraphConf,
    pub ports: PortsConf,
    pub forecast: ForecastConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConf {
    pub timeout_secs: u64,
}

impl Default for ApiConf {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Intervalles en minutes, un par job
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConf {
    pub alerts_minutes: u64,
    pub graphs_minutes: u64,
    pub port_failures_minutes: u64,
    pub consumption_minutes: u64,
    pub device_names_minutes: u64,
    /// Délai accordé aux jobs en cours à l'arrêt
    pub shutdown_grace_secs: u64,
}

impl Default for ScheduleConf {
    fn default() -> Self {
        Self {
            alerts_minutes: 180,
            graphs_minutes: 60,
            port_failures_minutes: 60,
            consumption_minutes: 60,
            device_names_minutes: 60,
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertsConf {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for AlertsConf {
    fn default() -> Self {
        Self { page_size: 100, max_pages: 50 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GraphConf {
    /// Relatif à API_URL, ou URL absolue (graph.php vit hors du préfixe API)
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl Default for GraphConf {
    fn default() -> Self {
        let params = [("type", "multi-port_bits_separate"), ("legend", "no"), ("format", "json")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            endpoint: "graph.php".into(),
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PortsConf {
    /// `port_descr_type` des ports "internet"
    pub internet_descr_type: String,
    pub failure_top_n: usize,
}

impl Default for PortsConf {
    fn default() -> Self {
        Self {
            internet_descr_type: "inet".into(),
            failure_top_n: 10,
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.schedule;
        for (name, minutes) in [
            ("schedule.alerts_minutes", s.alerts_minutes),
            ("schedule.graphs_minutes", s.graphs_minutes),
            ("schedule.port_failures_minutes", s.port_failures_minutes),
            ("schedule.consumption_minutes", s.consumption_minutes),
            ("schedule.device_names_minutes", s.device_names_minutes),
        ] {
            if minutes == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.forecast.horizon == 0 {
            return Err(ConfigError::Invalid("forecast.horizon must be > 0".into()));
        }
        if self.forecast.max_series_len == 0 {
            return Err(ConfigError::Invalid("forecast.max_series_len must be > 0".into()));
        }
        if self.alerts.page_size == 0 {
            return Err(ConfigError::Invalid("alerts.page_size must be > 0".into()));
        }
        if self.api.timeout_secs == 0 || self.store.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }
}

/// Charge `$VIGIA_CONFIG` ou `vigia.yaml`. Fichier absent → défauts;
/// YAML ou valeurs invalides → erreur.
pub async fn load_config() -> Result<KernelConfig, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> Result<KernelConfig, ConfigError> {
    let config = if Path::new(path).exists() {
        let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        if txt.trim().is_empty() {
            KernelConfig::default()
        } else {
            serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?
        }
    } else {
        tracing::warn!(%path, "no config file, using defaults");
        KernelConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Identifiants du service de supervision, obligatoires
#[derive(Clone)]
pub struct ApiCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl ApiCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };
        Ok(Self {
            url: require("API_URL")?,
            username: require("API_USERNAME")?,
            password: require("API_PASSWORD")?,
        })
    }
}
