use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the config file path (useful when the
/// daemon itself runs in a container with a mounted config).
pub const CONFIG_PATH_ENV: &str = "MIXCTL_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub icecast: IcecastConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The docker compose stack under control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_engine_container")]
    pub engine_container: String,
    #[serde(default = "default_scheduler_container")]
    pub scheduler_container: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    /// Flat KEY=VALUE file consumed by docker compose, and the only durable
    /// state this dashboard touches.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Image repository of the engine, used when purging a cached tag.
    #[serde(default = "default_engine_image")]
    pub engine_image: String,
    /// Env-file key that pins the engine image tag.
    #[serde(default = "default_image_tag_key")]
    pub image_tag_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcecastConfig {
    #[serde(default = "default_icecast_scheme")]
    pub scheme: String,
    #[serde(default = "default_icecast_host")]
    pub host: String,
    #[serde(default = "default_icecast_port")]
    pub port: u16,
    #[serde(default = "default_icecast_status_path")]
    pub status_path: String,
    #[serde(default = "default_icecast_mount")]
    pub mount: String,
    /// Public-facing stream URL for the dashboard's player link. When empty,
    /// derived from scheme/host/port/mount.
    #[serde(default)]
    pub public_url: String,
}

impl IcecastConfig {
    /// Mount with a guaranteed leading slash.
    pub fn mount_path(&self) -> String {
        if self.mount.starts_with('/') {
            self.mount.clone()
        } else {
            format!("/{}", self.mount)
        }
    }

    pub fn status_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.status_path
        )
    }

    pub fn stream_url(&self) -> String {
        let public = self.public_url.trim();
        if !public.is_empty() {
            return public.trim_end_matches('/').to_string();
        }
        format!(
            "{}://{}:{}{}",
            self.scheme,
            self.host,
            self.port,
            self.mount_path()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_tail_default")]
    pub tail_default: u32,
    #[serde(default = "default_tail_max")]
    pub tail_max: u32,
}

impl LogsConfig {
    /// Effective tail length for a request (`0` means "use the default").
    pub fn clamp_tail(&self, requested: u32) -> u32 {
        let tail = if requested == 0 {
            self.tail_default
        } else {
            requested
        };
        tail.clamp(1, self.tail_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_limit: usize,
    #[serde(default = "default_recent_window_secs")]
    pub recent_window_secs: i64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            engine_container: default_engine_container(),
            scheduler_container: default_scheduler_container(),
            compose_file: default_compose_file(),
            env_file: default_env_file(),
            engine_image: default_engine_image(),
            image_tag_key: default_image_tag_key(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_url: default_scheduler_base_url(),
        }
    }
}

impl Default for IcecastConfig {
    fn default() -> Self {
        Self {
            scheme: default_icecast_scheme(),
            host: default_icecast_host(),
            port: default_icecast_port(),
            status_path: default_icecast_status_path(),
            mount: default_icecast_mount(),
            public_url: String::new(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            tail_default: default_tail_default(),
            tail_max: default_tail_max(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            upcoming_limit: default_upcoming_limit(),
            recent_window_secs: default_recent_window_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_engine_container() -> String {
    "mix-engine".to_string()
}

fn default_scheduler_container() -> String {
    "mix-scheduler".to_string()
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("/stack/docker-compose.yml")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("/stack/.env")
}

fn default_engine_image() -> String {
    "mix-engine".to_string()
}

fn default_image_tag_key() -> String {
    "ENGINE_IMAGE_TAG".to_string()
}

fn default_scheduler_base_url() -> String {
    "http://mix-scheduler:8001".to_string()
}

fn default_icecast_scheme() -> String {
    "http".to_string()
}

fn default_icecast_host() -> String {
    "icecast".to_string()
}

fn default_icecast_port() -> u16 {
    8000
}

fn default_icecast_status_path() -> String {
    "/status-json.xsl".to_string()
}

fn default_icecast_mount() -> String {
    "/stream.mp3".to_string()
}

fn default_tail_default() -> u32 {
    400
}

fn default_tail_max() -> u32 {
    2000
}

fn default_upcoming_limit() -> usize {
    10
}

fn default_recent_window_secs() -> i64 {
    12
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mixctl")
            .join("config.toml")
    }
}
