//! Layered configuration: CLI overrides → environment → TOML file → defaults.
//!
//! Every component reads its settings through this resolver; nothing else
//! touches `std::env` or the config file. The resolver is built once in
//! `main` and immutable afterwards. Environment variables are read at call
//! time, so resolution stays pure with respect to the backing sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Config file path tried when `--config` is not given. Allowed to be
/// absent; an explicitly passed path is not.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Built-in defaults, the lowest-precedence source. Keys without an entry
/// here (`username`, `password`, `log_file`, `download`, `archive`) are a
/// hard error when absent from every other source.
const DEFAULTS: &[(&str, &str)] = &[
    ("imap_server", "localhost"),
    ("imap_port", "993"),
    ("parser_strategy", "plain_text"),
    ("inbox_folder", "INBOX"),
    ("archive_folder", "Archive"),
    ("error_dir", "failed_emails"),
    ("list", "false"),
    ("process_all", "false"),
    ("verbose", "false"),
];

/// Shape of the config file: one `[imap]` table of scalar values.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    imap: HashMap<String, toml::Value>,
}

/// Read-only merge view over the four ranked sources.
#[derive(Debug)]
pub struct Configuration {
    overrides: HashMap<String, String>,
    env_prefix: String,
    file: HashMap<String, String>,
}

impl Configuration {
    /// Build from in-memory sources. The file table is whatever was under
    /// `[imap]`, already flattened to strings.
    pub fn new(
        overrides: HashMap<String, String>,
        env_prefix: impl Into<String>,
        file: HashMap<String, String>,
    ) -> Self {
        Self {
            overrides,
            env_prefix: env_prefix.into(),
            file,
        }
    }

    /// Build from CLI overrides plus an optional config file.
    ///
    /// `Some(path)` must name a readable TOML file; `None` falls back to
    /// [`DEFAULT_CONFIG_PATH`], silently skipped when absent.
    pub fn load(
        overrides: HashMap<String, String>,
        env_prefix: impl Into<String>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => read_config_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    read_config_file(path)?
                } else {
                    HashMap::new()
                }
            }
        };
        Ok(Self::new(overrides, env_prefix, file))
    }

    /// Resolve a key against the ranked sources; `None` when no source
    /// defines it.
    pub fn get_optional(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        let env_key = format!("{}{}", self.env_prefix, key).to_uppercase();
        if let Ok(value) = std::env::var(&env_key) {
            return Some(value);
        }
        if let Some(value) = self.file.get(key) {
            return Some(value.clone());
        }
        DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get_optional(key).is_some()
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        self.get_optional(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        let value = self.get(key)?;
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                expected: "an integer",
            })
    }

    /// `{true,1,yes}` / `{false,0,no}`, case-insensitive.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let value = self.get(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
                expected: "one of true/1/yes or false/0/no",
            }),
        }
    }
}

fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: PathBuf::from(path),
        source,
    })?;
    let parsed: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::FileParse {
        path: PathBuf::from(path),
        source,
    })?;
    Ok(parsed
        .imap
        .into_iter()
        .map(|(key, value)| (key, value_to_string(&value)))
        .collect())
}

/// Flatten a TOML scalar to the string form the typed accessors expect.
/// `toml::Value::to_string` would quote strings.
fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
