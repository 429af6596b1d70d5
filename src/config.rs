use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key the supervisor's record is stored under.
pub const CONFIG_KEY: &str = "auto_continue_config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config file {0} does not hold a JSON object")]
    NotAnObject(PathBuf),
}

/// Durable supervisor settings.
///
/// `max_actions` always holds the last finite ceiling the user picked; the
/// ceiling actually enforced comes from [`Config::effective_ceiling`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub max_actions: u32,
    pub auto_send_enabled: bool,
    pub auto_send_delay_secs: u64,
    pub continuous_mode_enabled: bool,
    pub continuous_ceiling: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            max_actions: 1,
            auto_send_enabled: true,
            auto_send_delay_secs: 10,
            continuous_mode_enabled: false,
            continuous_ceiling: 100,
        }
    }
}

impl Config {
    pub fn effective_ceiling(&self) -> u32 {
        if self.continuous_mode_enabled {
            self.continuous_ceiling
        } else {
            self.max_actions
        }
    }

    /// Bring a freshly decoded record back inside the schema's invariants.
    pub fn reconcile(&mut self) {
        let defaults = Config::default();
        if self.max_actions == 0 {
            self.continuous_mode_enabled = true;
            self.max_actions = defaults.max_actions;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.continuous_ceiling == 0 {
            self.continuous_ceiling = defaults.continuous_ceiling;
        }
    }

    /// Menu command: `0` selects continuous mode, anything else a finite ceiling.
    pub fn set_max_actions(&mut self, value: u32) {
        if value == 0 {
            self.continuous_mode_enabled = true;
        } else {
            self.continuous_mode_enabled = false;
            self.max_actions = value;
        }
    }

    pub fn toggle_continuous_mode(&mut self) -> bool {
        self.continuous_mode_enabled = !self.continuous_mode_enabled;
        self.continuous_mode_enabled
    }

    /// Merge a stored record over the defaults and reconcile it.
    pub fn from_stored(stored: Value) -> Result<Self, ConfigError> {
        let Value::Object(stored) = stored else {
            return Err(ConfigError::Json(serde::de::Error::custom(
                "stored config is not an object",
            )));
        };
        let mut merged = match serde_json::to_value(Config::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // one field at a time, so a bad value only costs that field
        for (key, value) in stored {
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value);
            match serde_json::from_value::<Config>(Value::Object(candidate.clone())) {
                Ok(_) => merged = candidate,
                Err(e) => warn!(field = %key, "stored value ignored: {e}"),
            }
        }
        let mut config: Config = serde_json::from_value(Value::Object(merged))?;
        config.reconcile();
        Ok(config)
    }

    /// Load from the store, falling back to defaults when the store is
    /// unavailable or the record is unreadable.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let stored = match store.get(CONFIG_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("no stored config, using defaults");
                return Config::default();
            }
            Err(e) => {
                warn!("config store unavailable, using defaults: {e}");
                return Config::default();
            }
        };
        match Config::from_stored(stored) {
            Ok(config) => {
                debug!(?config, "config loaded");
                config
            }
            Err(e) => {
                warn!("stored config unreadable, using defaults: {e}");
                Config::default()
            }
        }
    }

    /// Best effort: a failed write leaves the in-memory value authoritative.
    pub fn save(&self, store: &mut dyn ConfigStore) {
        let value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(e) => {
                warn!("could not encode config: {e}");
                return;
            }
        };
        match store.set(CONFIG_KEY, value) {
            Ok(()) => debug!(config = ?self, "config saved"),
            Err(e) => warn!("config not persisted: {e}"),
        }
    }
}

/// Flat key-value persistence.
pub trait ConfigStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// A single JSON object on disk holding every key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/autocontinue/config.json`, or the working directory when
    /// the platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("autocontinue"))
            .unwrap_or_default()
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_all(&self) -> Result<Map<String, Value>, ConfigError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let file = std::fs::File::open(&self.path).map_err(|e| self.io_error(e))?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader)? {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::NotAnObject(self.path.clone())),
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut all = match self.read_all() {
            Ok(all) => all,
            Err(e @ (ConfigError::Json(_) | ConfigError::NotAnObject(_))) => {
                warn!(path = %self.path.display(), "overwriting unreadable config file: {e}");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        all.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        serde_json::to_writer_pretty(file, &Value::Object(all))?;
        Ok(())
    }
}
