use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigLoadError;
use crate::models::Config;

pub const CONFIG_PATH_ENV: &str = "SOAR_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "SOAR_CONFIG_JSON";

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["soar.toml", "soar.json"];

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Directory searched for `soar.toml` / `soar.json`. The working
    /// directory when unset.
    pub search_dir: Option<PathBuf>,
    pub skip_env_file: bool,
}

/// Resolves configuration in this order: an explicit path,
/// `$SOAR_CONFIG_PATH` (TOML or JSON), `$SOAR_CONFIG_JSON` (inline JSON),
/// `soar.toml` / `soar.json` in the search directory, then defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.options.search_dir = Some(dir.into());
        self
    }

    /// Leave `.env` files alone.
    pub fn without_env_file(mut self) -> Self {
        self.options.skip_env_file = true;
        self
    }

    /// Loads `.env` and resolves against the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = if self.options.skip_env_file {
            false
        } else {
            self.load_env_file()?
        };
        let mut load = self.load_with_env(|key| env::var(key).ok())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same resolution as [`ConfigLoader::load`], reading variables through
    /// `lookup` and never touching `.env`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let (config, source) = if let Some(path) = &self.options.config_path {
            (load_from_file(path)?, ConfigSource::Explicit(path.clone()))
        } else if let Some(path) = var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            (load_from_file(&path)?, ConfigSource::EnvPath(path))
        } else if let Some(raw) = var(CONFIG_JSON_ENV) {
            (parse_json(&raw, CONFIG_JSON_ENV)?, ConfigSource::EnvInline)
        } else if let Some(path) = self.find_default_file() {
            (load_from_file(&path)?, ConfigSource::File(path))
        } else {
            (Config::default(), ConfigSource::Default)
        };

        config.validate()?;
        info!(
            ?source,
            backend = config.executor.backend(),
            runners = config.runners.len(),
            "configuration loaded"
        );
        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded: false,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let base = self
            .options
            .search_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|name| base.join(name))
            .find(|path| path.exists())
    }
}

/// Reads `path`, picking the format from the extension. Unknown extensions
/// try TOML first, then JSON.
pub fn load_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::MissingConfig {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();
    debug!(path = %origin, "reading configuration file");

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") => parse_toml(&contents, &origin),
        _ => parse_from_str(&contents, &origin),
    }
}

pub fn parse_from_str(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

pub fn parse_toml(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    toml::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}

pub fn parse_json(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    serde_json::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        message: err.to_string(),
    })
}
