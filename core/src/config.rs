use std::{env, fs, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::document::DEFAULT_DOCUMENT_TITLE;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    #[serde(default)]
    pub room_service: RoomServiceConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub documents: DocumentConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomServiceConfig {
    #[serde(default = "default_room_service_url")]
    pub base_url: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_url")]
    pub base_url: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_title")]
    pub default_title: String,
}

/// Presence sessions that stop publishing are dropped after `ttl_secs`.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            room_service: RoomServiceConfig::default(),
            identity: IdentityConfig::default(),
            http: HttpClientConfig::default(),
            notifications: NotificationConfig::default(),
            documents: DocumentConfig::default(),
            presence: PresenceConfig::default(),
        }
    }
}

impl Default for RoomServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_room_service_url(),
            secret_key: String::new(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: default_identity_url(),
            secret_key: String::new(),
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl NotificationConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            default_title: default_document_title(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_presence_ttl_secs(),
        }
    }
}

impl PresenceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    const CONFIG_ENV: &'static str = "LESSONROOM_CONFIG_FILE";
    const BIND_ADDRESS_ENV: &'static str = "LESSONROOM_BIND_ADDRESS";
    const ROOM_SERVICE_URL_ENV: &'static str = "LESSONROOM_ROOM_SERVICE_URL";
    const ROOM_SERVICE_SECRET_ENV: &'static str = "LESSONROOM_ROOM_SERVICE_SECRET";
    const IDENTITY_URL_ENV: &'static str = "LESSONROOM_IDENTITY_URL";
    const IDENTITY_SECRET_ENV: &'static str = "LESSONROOM_IDENTITY_SECRET";
    const HTTP_TIMEOUT_ENV: &'static str = "LESSONROOM_HTTP_TIMEOUT_SECS";
    const NOTIFY_MAX_ATTEMPTS_ENV: &'static str = "LESSONROOM_NOTIFY_MAX_ATTEMPTS";
    const NOTIFY_BACKOFF_ENV: &'static str = "LESSONROOM_NOTIFY_BACKOFF_MS";
    const PRESENCE_TTL_ENV: &'static str = "LESSONROOM_PRESENCE_TTL_SECS";

    /// Load configuration from defaults layered with optional config files and
    /// environment variables.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    pub fn load_with(config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::resolve_config_path(config_path)? {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            config = toml::from_str(&contents)
                .with_context(|| format!("invalid config file: {}", path.display()))?;
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_parse::<SocketAddr>(Self::BIND_ADDRESS_ENV)? {
            self.bind_address = addr;
        }
        if let Ok(url) = env::var(Self::ROOM_SERVICE_URL_ENV) {
            self.room_service.base_url = url;
        }
        if let Ok(secret) = env::var(Self::ROOM_SERVICE_SECRET_ENV) {
            self.room_service.secret_key = secret;
        }
        if let Ok(url) = env::var(Self::IDENTITY_URL_ENV) {
            self.identity.base_url = url;
        }
        if let Ok(secret) = env::var(Self::IDENTITY_SECRET_ENV) {
            self.identity.secret_key = secret;
        }
        if let Some(timeout) = env_parse::<u64>(Self::HTTP_TIMEOUT_ENV)? {
            self.http.timeout_secs = timeout;
        }
        if let Some(attempts) = env_parse::<u32>(Self::NOTIFY_MAX_ATTEMPTS_ENV)? {
            self.notifications.max_attempts = attempts;
        }
        if let Some(backoff) = env_parse::<u64>(Self::NOTIFY_BACKOFF_ENV)? {
            self.notifications.retry_backoff_ms = backoff;
        }
        if let Some(ttl) = env_parse::<u64>(Self::PRESENCE_TTL_ENV)? {
            self.presence.ttl_secs = ttl;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.notifications.max_attempts == 0 {
            return Err(anyhow!("notifications.max_attempts must be at least 1"));
        }
        if self.http.timeout_secs == 0 {
            return Err(anyhow!("http.timeout_secs must be at least 1"));
        }
        if self.documents.default_title.trim().is_empty() {
            return Err(anyhow!("documents.default_title must not be empty"));
        }
        if self.presence.ttl_secs == 0 {
            return Err(anyhow!("presence.ttl_secs must be at least 1"));
        }
        Ok(())
    }

    fn resolve_config_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            return Self::validate_path(path);
        }

        if let Ok(path) = env::var(Self::CONFIG_ENV) {
            return Self::validate_path(PathBuf::from(path));
        }

        let mut candidates = vec![PathBuf::from("lessonroom.toml")];
        if let Some(dir) = Self::default_config_dir() {
            candidates.push(dir.join("config.toml"));
        }

        Ok(candidates.into_iter().find(|candidate| candidate.exists()))
    }

    fn validate_path(path: PathBuf) -> Result<Option<PathBuf>> {
        if path.exists() {
            Ok(Some(path))
        } else {
            Err(anyhow!(
                "configuration file does not exist: {}",
                path.display()
            ))
        }
    }

    fn default_config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".lessonroom"))
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {name}")),
        Err(_) => Ok(None),
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8082))
}

fn default_room_service_url() -> String {
    "https://api.liveblocks.io/v2".to_owned()
}

fn default_identity_url() -> String {
    "https://api.clerk.com/v1".to_owned()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_presence_ttl_secs() -> u64 {
    60
}

fn default_document_title() -> String {
    DEFAULT_DOCUMENT_TITLE.to_owned()
}

fn home_dir() -> Option<PathBuf> {
    if let Some(path) = env::var_os("HOME") {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = env::var_os("USERPROFILE") {
        return Some(PathBuf::from(path));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address.port(), 8082);
        assert_eq!(config.documents.default_title, "Untitled");
        assert_eq!(config.notifications.max_attempts, 3);
        assert_eq!(config.presence.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lessonroom.toml");
        let mut file = fs::File::create(&path).expect("create config");
        writeln!(
            file,
            r#"
bind_address = "0.0.0.0:9000"

[room_service]
base_url = "http://rooms.local/v2"

[notifications]
max_attempts = 5

[presence]
ttl_secs = 15
"#
        )
        .expect("write config");

        let config = AppConfig::load_with(Some(path)).expect("load config");
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.room_service.base_url, "http://rooms.local/v2");
        assert_eq!(config.notifications.max_attempts, 5);
        assert_eq!(config.notifications.retry_backoff_ms, 200);
        assert_eq!(config.identity.base_url, "https://api.clerk.com/v1");
        assert_eq!(config.presence.ttl_secs, 15);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::load_with(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let mut config = AppConfig::default();
        config.notifications.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_presence_ttl_is_rejected() {
        let mut config = AppConfig::default();
        config.presence.ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("presence.ttl_secs"));
    }
}
