//! Global eventtracker configuration.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::coordinator::CachePolicy;
use crate::error::{TrackerError, TrackerResult};
use crate::remote::{DEFAULT_ROOT, RootPath};

static DEFAULT_DATA_DIR: &str = "~/.local/share/eventtracker";

const DEFAULT_CACHE_WORKERS: usize = 4;

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_CACHE_WORKERS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Collection path inside the document tree
    #[serde(default = "default_root")]
    pub root: String,

    /// Deny reads and writes without a signed-in session
    #[serde(default = "default_true")]
    pub require_auth: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            root: default_root(),
            require_auth: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub policy: CachePolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            workers: DEFAULT_CACHE_WORKERS,
            policy: CachePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Global configuration at ~/.config/eventtracker/config.toml
///
/// Any key can be overridden from the environment, e.g.
/// `EVENTTRACKER__CACHE__WORKERS=8` or `EVENTTRACKER__SMS__PHONE_NUMBER=...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub sms: SmsSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            data_dir: default_data_dir(),
            remote: RemoteSettings::default(),
            cache: CacheSettings::default(),
            sms: SmsSettings::default(),
        }
    }
}

impl TrackerConfig {
    pub fn config_path() -> TrackerResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TrackerError::Config("Could not determine config directory".into()))?
            .join("eventtracker");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the global config, writing a commented default file on first run.
    pub fn load() -> TrackerResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from an explicit file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> TrackerResult<Self> {
        let config: TrackerConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("EVENTTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TrackerError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| TrackerError::Config(e.to_string()))?;

        if config.cache.workers == 0 {
            return Err(TrackerError::Config(
                "cache.workers must be at least 1".into(),
            ));
        }

        Ok(config)
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> TrackerResult<()> {
        let contents = format!(
            "\
# eventtracker configuration

# Where events, accounts and the local cache are stored:
# data_dir = \"{}\"

[remote]
# Collection that holds event documents:
# root = \"{}\"
# Require a signed-in session to read or write events:
# require_auth = true

[cache]
# Blocking workers (and SQLite connections) serving the local cache:
# workers = {}
# \"detached\" leaves the cache alone, \"mirror\" copies every remote snapshot into it:
# policy = \"detached\"

[sms]
# Recipient of the upcoming-events digest:
# phone_number = \"+15555550100\"
",
            DEFAULT_DATA_DIR, DEFAULT_ROOT, DEFAULT_CACHE_WORKERS
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| TrackerError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn root_path(&self) -> TrackerResult<RootPath> {
        RootPath::parse(&self.remote.root)
            .map_err(|e| TrackerError::Config(format!("Invalid remote.root {e}")))
    }

    pub fn remote_file(&self) -> PathBuf {
        self.data_path().join("remote.json")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.data_path().join("event.db")
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.data_path().join("accounts.json")
    }

    pub fn session_file(&self) -> PathBuf {
        self.data_path().join("session.json")
    }

    pub fn permissions_file(&self) -> PathBuf {
        self.data_path().join("permissions.toml")
    }

    pub fn sms_outbox_file(&self) -> PathBuf {
        self.data_path().join("sms-outbox.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.remote.root, "EventTracker");
        assert!(config.remote.require_auth);
        assert_eq!(config.cache.workers, 4);
        assert_eq!(config.cache.policy, CachePolicy::Detached);
        assert_eq!(config.sms.phone_number, None);
    }

    #[test]
    fn default_file_is_all_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eventtracker").join("config.toml");
        TrackerConfig::create_default_config(&path).unwrap();

        let config = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.cache.workers, DEFAULT_CACHE_WORKERS);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/et-data"

[remote]
root = "teams/blue/EventTracker"
require_auth = false

[cache]
workers = 2
policy = "mirror"

[sms]
phone_number = "+15555550100"
"#,
        )
        .unwrap();

        let config = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(config.data_path(), PathBuf::from("/tmp/et-data"));
        assert_eq!(config.cache_file(), PathBuf::from("/tmp/et-data/event.db"));
        assert_eq!(
            config.root_path().unwrap().segments(),
            ["teams", "blue", "EventTracker"]
        );
        assert!(!config.remote.require_auth);
        assert_eq!(config.cache.policy, CachePolicy::Mirror);
        assert_eq!(config.sms.phone_number.as_deref(), Some("+15555550100"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nworkers = 0\n").unwrap();
        assert!(matches!(
            TrackerConfig::load_from(&path),
            Err(TrackerError::Config(_))
        ));
    }

    #[test]
    fn invalid_root_is_a_config_error() {
        let config = TrackerConfig {
            remote: RemoteSettings {
                root: "Event.Tracker".into(),
                require_auth: true,
            },
            ..TrackerConfig::default()
        };
        assert!(matches!(config.root_path(), Err(TrackerError::Config(_))));
    }
}
