//! Persistence configuration with precedence and validation
use crate::errors::{AofError, RecoveryHint, Result};
use crate::log_file::LogFile;
use ghostcache_utils::xdg::XdgPaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LOG_FILE: &str = "ghostDBPersistence.log";
pub const DEFAULT_TEMP_FILE: &str = "temp_ghostDBPersistence.log";
pub const DEFAULT_MAX_LOG_SIZE: u64 = 64 * 1024 * 1024; // 64MB
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// What replay does with a record it cannot parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayPolicy {
    /// Stop recovery and fail startup
    #[default]
    Abort,
    /// Log the record, skip it and keep replaying
    Skip,
}

impl FromStr for ReplayPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "strict" => Ok(Self::Abort),
            "skip" | "skip-corrupt" | "lossy" => Ok(Self::Skip),
            other => Err(format!("unknown replay policy '{other}'")),
        }
    }
}

/// Configuration owned by a persistence manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory holding the log and its temp file
    pub log_dir: PathBuf,
    /// File name of the active log
    pub log_file_name: String,
    /// File name used while a compaction is being written
    pub temp_file_name: String,
    /// Log size in bytes above which the next flush compacts first
    pub max_log_size: u64,
    /// Period of the background flusher
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Handling of unparseable records during replay
    pub replay_policy: ReplayPolicy,
    /// fsync every append
    pub sync_writes: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        // Use XDG config directory which respects XDG_CONFIG_HOME
        Self {
            log_dir: XdgPaths::config_dir(),
            log_file_name: DEFAULT_LOG_FILE.to_string(),
            temp_file_name: DEFAULT_TEMP_FILE.to_string(),
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            replay_policy: ReplayPolicy::Abort,
            sync_writes: true,
        }
    }
}

impl PersistenceConfig {
    /// Defaults with the log kept in `log_dir`
    pub fn in_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    pub fn builder() -> PersistenceConfigBuilder {
        PersistenceConfigBuilder::new()
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.log_dir.join(&self.temp_file_name)
    }

    pub fn lock_path(&self) -> PathBuf {
        LogFile::new(self.log_path()).lock_path()
    }

    /// Reject configurations the flusher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(AofError::configuration("flush interval must be non-zero"));
        }
        if self.max_log_size == 0 {
            return Err(AofError::configuration("max log size must be non-zero"));
        }
        if self.log_file_name.is_empty() || self.temp_file_name.is_empty() {
            return Err(AofError::configuration("log file names must not be empty"));
        }
        if self.log_file_name == self.temp_file_name {
            return Err(AofError::configuration(format!(
                "temp file name must differ from log file name '{}'",
                self.log_file_name
            )));
        }
        Ok(())
    }
}

/// Builder for persistence configurations
pub struct PersistenceConfigBuilder {
    config: PersistenceConfig,
}

impl PersistenceConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PersistenceConfig::default(),
        }
    }

    /// Set the log directory
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = log_dir.into();
        self
    }

    /// Set the log and temp file names
    pub fn with_file_names(mut self, log: impl Into<String>, temp: impl Into<String>) -> Self {
        self.config.log_file_name = log.into();
        self.config.temp_file_name = temp.into();
        self
    }

    /// Set the compaction threshold
    pub fn with_max_log_size(mut self, max_log_size: u64) -> Self {
        self.config.max_log_size = max_log_size;
        self
    }

    /// Set the flush period
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the replay policy
    pub fn with_replay_policy(mut self, policy: ReplayPolicy) -> Self {
        self.config.replay_policy = policy;
        self
    }

    /// Enable or disable fsync on append
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PersistenceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PersistenceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration loader that handles precedence:
/// defaults, then the config file, then environment variables
pub struct PersistenceConfigLoader;

impl PersistenceConfigLoader {
    pub const ENV_DIR: &'static str = "GHOSTCACHE_AOF_DIR";
    pub const ENV_MAX_SIZE: &'static str = "GHOSTCACHE_AOF_MAX_SIZE";
    pub const ENV_FLUSH_INTERVAL_MS: &'static str = "GHOSTCACHE_AOF_FLUSH_INTERVAL_MS";
    pub const ENV_REPLAY_POLICY: &'static str = "GHOSTCACHE_AOF_REPLAY_POLICY";
    pub const ENV_SYNC: &'static str = "GHOSTCACHE_AOF_SYNC";

    /// Load configuration with full precedence handling
    pub fn load() -> Result<PersistenceConfig> {
        Self::load_from(&Self::config_file_path())
    }

    /// Same as [`load`](Self::load) with an explicit config file
    pub fn load_from(config_file: &std::path::Path) -> Result<PersistenceConfig> {
        let mut config = PersistenceConfig::default();

        if let Some(file_config) = Self::load_from_config_file(config_file)? {
            config = file_config;
        }

        Self::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> PathBuf {
        XdgPaths::config_dir().join("persistence.json")
    }

    /// Load the `"persistence"` object from a JSON config file
    fn load_from_config_file(path: &std::path::Path) -> Result<Option<PersistenceConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AofError::io(path, "read config file", e))?;

        let file_config: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| AofError::Configuration {
                message: format!("invalid config file '{}': {e}", path.display()),
                recovery_hint: RecoveryHint::Manual {
                    instructions: "Check config file syntax".to_string(),
                },
            })?;

        let Some(section) = file_config.get("persistence") else {
            return Ok(None);
        };

        serde_json::from_value(section.clone())
            .map(Some)
            .map_err(|e| AofError::Configuration {
                message: format!("invalid persistence section in '{}': {e}", path.display()),
                recovery_hint: RecoveryHint::UpdateConfiguration,
            })
    }

    /// Override with environment variables
    fn apply_env(config: &mut PersistenceConfig) -> Result<()> {
        if let Ok(dir) = std::env::var(Self::ENV_DIR) {
            config.log_dir = PathBuf::from(dir);
        }

        if let Ok(raw) = std::env::var(Self::ENV_MAX_SIZE) {
            config.max_log_size = raw.parse::<u64>().map_err(|e| {
                AofError::configuration(format!("{}='{raw}': {e}", Self::ENV_MAX_SIZE))
            })?;
        }

        if let Ok(raw) = std::env::var(Self::ENV_FLUSH_INTERVAL_MS) {
            let millis = raw.parse::<u64>().map_err(|e| {
                AofError::configuration(format!("{}='{raw}': {e}", Self::ENV_FLUSH_INTERVAL_MS))
            })?;
            config.flush_interval = Duration::from_millis(millis);
        }

        if let Ok(raw) = std::env::var(Self::ENV_REPLAY_POLICY) {
            config.replay_policy = raw.parse().map_err(AofError::configuration)?;
        }

        if let Ok(raw) = std::env::var(Self::ENV_SYNC) {
            config.sync_writes = matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [
            PersistenceConfigLoader::ENV_DIR,
            PersistenceConfigLoader::ENV_MAX_SIZE,
            PersistenceConfigLoader::ENV_FLUSH_INTERVAL_MS,
            PersistenceConfigLoader::ENV_REPLAY_POLICY,
            PersistenceConfigLoader::ENV_SYNC,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_paths() {
        let config = PersistenceConfig::in_dir("/data");
        assert_eq!(config.log_path(), PathBuf::from("/data/ghostDBPersistence.log"));
        assert_eq!(
            config.temp_path(),
            PathBuf::from("/data/temp_ghostDBPersistence.log")
        );
        assert_eq!(
            config.lock_path(),
            PathBuf::from("/data/ghostDBPersistence.log.lock")
        );
    }

    #[test]
    fn test_builder_validates() {
        let err = PersistenceConfig::builder()
            .with_flush_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, AofError::Configuration { .. }));

        let err = PersistenceConfig::builder()
            .with_file_names("same.log", "same.log")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must differ"));

        let config = PersistenceConfig::builder()
            .with_log_dir("/tmp/aof")
            .with_max_log_size(1024)
            .with_replay_policy(ReplayPolicy::Skip)
            .build()
            .unwrap();
        assert_eq!(config.max_log_size, 1024);
        assert_eq!(config.replay_policy, ReplayPolicy::Skip);
    }

    #[test]
    fn test_replay_policy_parsing() {
        assert_eq!("Abort".parse::<ReplayPolicy>(), Ok(ReplayPolicy::Abort));
        assert_eq!("skip-corrupt".parse::<ReplayPolicy>(), Ok(ReplayPolicy::Skip));
        assert!("ignore".parse::<ReplayPolicy>().is_err());
    }

    #[test]
    #[serial]
    fn test_loader_precedence() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("persistence.json");
        std::fs::write(
            &config_file,
            r#"{"persistence": {"log_dir": "/from/file", "max_log_size": 2048, "flush_interval": 250}}"#,
        )
        .unwrap();

        let config = PersistenceConfigLoader::load_from(&config_file).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/from/file"));
        assert_eq!(config.max_log_size, 2048);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.log_file_name, DEFAULT_LOG_FILE);

        std::env::set_var(PersistenceConfigLoader::ENV_MAX_SIZE, "4096");
        std::env::set_var(PersistenceConfigLoader::ENV_REPLAY_POLICY, "skip");
        std::env::set_var(PersistenceConfigLoader::ENV_SYNC, "false");
        let config = PersistenceConfigLoader::load_from(&config_file).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/from/file"));
        assert_eq!(config.max_log_size, 4096);
        assert_eq!(config.replay_policy, ReplayPolicy::Skip);
        assert!(!config.sync_writes);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_loader_rejects_bad_env() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(PersistenceConfigLoader::ENV_FLUSH_INTERVAL_MS, "often");
        let result = PersistenceConfigLoader::load_from(&temp_dir.path().join("missing.json"));
        clear_env();
        assert!(matches!(result, Err(AofError::Configuration { .. })));
    }
}
