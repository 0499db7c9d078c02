use crate::core::{Result, StoreError};
use crate::storage::JsonFileStorage;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_PATH: &str = "data/users.json";
pub const DEFAULT_DATA_DIR: &str = "data";

pub const DATA_PATH_ENV: &str = "DOCSTORE_DATA_PATH";
pub const DATA_DIR_ENV: &str = "DOCSTORE_DATA_DIR";
pub const QUEUE_CAPACITY_ENV: &str = "DOCSTORE_QUEUE_CAPACITY";
pub const PRETTY_ENV: &str = "DOCSTORE_PRETTY";
pub const HOST_ENV: &str = "APP_HOST";
pub const PORT_ENV: &str = "APP_PORT";

/// Store configuration
///
/// Built in code with the builder methods, or read from the environment
/// with [`StoreConfig::from_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Backing JSON file
    pub path: PathBuf,

    /// Collection name used in logs and stats
    pub collection: String,

    /// Bound on queued writes; `None` is unbounded
    pub queue_capacity: Option<usize>,

    /// Indented JSON output
    pub pretty: bool,
}

impl StoreConfig {
    /// Configuration for `path`, named after the file stem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let collection = collection_name(&path);
        Self {
            path,
            collection,
            queue_capacity: None,
            pretty: true,
        }
    }

    /// Set the collection name
    pub fn collection(mut self, name: &str) -> Self {
        self.collection = name.to_string();
        self
    }

    /// Bound the write queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity).filter(|c| *c > 0);
        self
    }

    /// Toggle indented output
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Reads `DOCSTORE_DATA_PATH`, `DOCSTORE_QUEUE_CAPACITY` and
    /// `DOCSTORE_PRETTY` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(DATA_PATH_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());

        let mut config = Self::new(path);
        if let Some(capacity) = queue_capacity_from(&lookup)? {
            config = config.queue_capacity(capacity);
        }
        if let Some(raw) = lookup(PRETTY_ENV) {
            config = config.pretty(parse_bool(PRETTY_ENV, &raw)?);
        }
        Ok(config)
    }

    /// File storage described by this configuration.
    pub fn storage(&self) -> JsonFileStorage {
        JsonFileStorage::new(&self.path).pretty(self.pretty)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// HTTP server configuration for the bundled binary.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding `users.json` and `posts.json`
    pub data_dir: PathBuf,
    pub queue_capacity: Option<usize>,
    pub pretty: bool,
}

impl ServerConfig {
    /// Reads `APP_HOST`, `APP_PORT`, `DOCSTORE_DATA_DIR`,
    /// `DOCSTORE_QUEUE_CAPACITY` and `DOCSTORE_PRETTY`.
    ///
    /// The server keeps one file per collection under the data directory, so
    /// `DOCSTORE_DATA_PATH` is rejected here instead of being ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DATA_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            return Err(StoreError::InvalidConfig(format!(
                "{} ('{}') names a single file; the server reads {} instead",
                DATA_PATH_ENV, path, DATA_DIR_ENV
            )));
        }

        let host = lookup(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                StoreError::InvalidConfig(format!("{} must be a valid u16, got '{}'", PORT_ENV, raw))
            })?,
            None => 8080,
        };
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        Ok(Self {
            host,
            port,
            data_dir: PathBuf::from(data_dir),
            queue_capacity: queue_capacity_from(&lookup)?.filter(|c| *c > 0),
            pretty: match lookup(PRETTY_ENV) {
                Some(raw) => parse_bool(PRETTY_ENV, &raw)?,
                None => true,
            },
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Store configuration for `<data_dir>/<collection>.json`.
    pub fn store(&self, collection: &str) -> StoreConfig {
        let config = StoreConfig::new(self.data_dir.join(format!("{}.json", collection)))
            .collection(collection)
            .pretty(self.pretty);
        match self.queue_capacity {
            Some(capacity) => config.queue_capacity(capacity),
            None => config,
        }
    }
}

fn collection_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("documents")
        .to_string()
}

fn queue_capacity_from<F>(lookup: &F) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(QUEUE_CAPACITY_ENV)
        .map(|raw| {
            raw.trim().parse::<usize>().map_err(|_| {
                StoreError::InvalidConfig(format!(
                    "{} must be a non-negative integer, got '{}'",
                    QUEUE_CAPACITY_ENV, raw
                ))
            })
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}
