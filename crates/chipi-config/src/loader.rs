use std::path::{Path, PathBuf};

use chipi_common::{Error, Result};
use tracing::{info, warn};

use crate::model::AppConfig;

/// Environment variables checked for the model API key, in priority order.
const API_KEY_VARS: &[&str] = &["OPENROUTER_API_KEY", "CHIPI_API_KEY", "API_KEY"];

/// Locations probed for a `.env` file before the config directory.
const ENV_FILE_CANDIDATES: &[&str] = &[
    "/storage/emulated/0/chipi-web-app/.env",
    "/sdcard/chipi-web-app/.env",
];

/// Mobile storage locations probed for the SQLite file before the config directory.
const MOBILE_DB_CANDIDATES: &[&str] = &[
    "/storage/emulated/0/chipi-web-app/data/chipi.db",
    "/sdcard/chipi-web-app/data/chipi.db",
];

const RELATIVE_DB_PATH: &str = "data/chipi.db";

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".chipi"));
        let xdg_config = dirs::config_dir().map(|c| c.join("chipi"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                if xdg.exists() {
                    xdg
                } else if home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".chipi"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns true if a config file (YAML or TOML) exists on disk.
    pub fn config_file_exists(&self) -> bool {
        self.config_dir.join("config.yml").exists() || self.config_dir.join("config.toml").exists()
    }

    /// Load the config file (if any) and apply process environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    fn load_file(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Load the first `.env` file found into the process environment.
    /// Returns the path that was loaded, if any.
    pub fn load_env_file(&self) -> Option<PathBuf> {
        let candidates = ENV_FILE_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain([self.config_dir.join(".env"), PathBuf::from(".env")]);

        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match dotenvy::from_path(&path) {
                Ok(()) => {
                    info!("environment loaded from {}", path.display());
                    return Some(path);
                }
                Err(e) => warn!("failed to load {}: {e}", path.display()),
            }
        }

        warn!("no .env file found, using defaults");
        None
    }

    /// Pick the SQLite file: explicit path, then `data_dir`, then the first
    /// candidate whose parent directory exists, then a relative path.
    pub fn resolve_database_path(&self, config: &AppConfig) -> PathBuf {
        if let Some(path) = &config.database.path {
            return path.clone();
        }
        if let Some(dir) = &config.data_dir {
            return dir.join("chipi.db");
        }

        let candidates: Vec<PathBuf> = MOBILE_DB_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain([self.config_dir.join("data").join("chipi.db")])
            .collect();
        probe_database_path(&candidates)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.config_dir.join("data")];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

fn probe_database_path(candidates: &[PathBuf]) -> PathBuf {
    candidates
        .iter()
        .find(|path| path.parent().is_some_and(Path::exists))
        .cloned()
        .unwrap_or_else(|| PathBuf::from(RELATIVE_DB_PATH))
}

/// Overlay environment values onto a loaded config. `lookup` abstracts the
/// process environment so callers can inject values.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = API_KEY_VARS.iter().find_map(|name| non_empty(*name)) {
        config.llm.api_key = Some(key);
    }
    if let Some(path) = non_empty("DATABASE_URI") {
        config.database.path = Some(PathBuf::from(path));
    }
    if let Some(secret) = non_empty("SECRET_KEY") {
        config.gateway.secret_key = Some(secret);
    }
    if let Some(name) = non_empty("APP_NAME") {
        config.app.name = name;
    }
    if let Some(version) = non_empty("APP_VERSION") {
        config.app.version = version;
    }
}
