use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default = "default_shutdown_grace", with = "duration_str")]
    pub shutdown_grace: Duration,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_start_delay", with = "duration_str")]
    pub start_delay: Duration,
    #[serde(default = "default_stop_delay", with = "duration_str")]
    pub stop_delay: Duration,
    #[serde(default = "default_restart_delay", with = "duration_str")]
    pub restart_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            production: false,
            public_dir: default_public_dir(),
            body_limit_bytes: default_body_limit_bytes(),
            shutdown_grace: default_shutdown_grace(),
            control: ControlConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            start_delay: default_start_delay(),
            stop_delay: default_stop_delay(),
            restart_delay: default_restart_delay(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Values supplied on the command line or through the environment. They win
/// over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub production: bool,
    pub app_env: Option<String>,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        let env_is_production = overrides
            .app_env
            .as_deref()
            .is_some_and(|env| env.trim().eq_ignore_ascii_case("production"));
        if overrides.production || env_is_production {
            self.production = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "port must be in range 1..65535".to_string(),
            ));
        }
        if self.public_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "public_dir must not be empty".to_string(),
            ));
        }
        if self.body_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "body_limit_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("./public")
}

const fn default_body_limit_bytes() -> usize {
    100 * 1024
}

const fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

const fn default_start_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_stop_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_restart_delay() -> Duration {
    Duration::from_secs(2)
}

/// Durations are written the humantime way: `1s`, `250ms`, `2m 30s`.
mod duration_str {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}
