use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::config::themes::ThemeRegistry;
use crate::model::ITEMS_COLLECTION;

pub mod themes;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "PantryTui";
const APP_NAME: &str = "pantry";

pub const CONFIG_ENV: &str = "PANTRY_CONFIG";
pub const DATA_ENV: &str = "PANTRY_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
    pub session_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data
            .clone()
            .unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        // an explicit data dir keeps the session next to the data it belongs to
        let state_dir = if override_data.is_some() {
            data_root.join("state")
        } else {
            project_dirs
                .state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| data_root.join("state"))
        };

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Lays out every derived path below the given roots.
    pub fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_dir: PathBuf,
        state_dir: PathBuf,
    ) -> Self {
        Self {
            database_path: data_dir.join("pantry.db"),
            blob_dir: data_dir.join("blobs"),
            log_dir: state_dir.join("logs"),
            session_file: state_dir.join("session.json"),
            config_dir,
            config_file,
            data_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.blob_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: ThemeName,
    /// Document collection holding pantry items
    pub collection: String,
    pub tick_rate_ms: u64,
    pub expiry: ExpiryOptions,
    pub backend: BackendOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            collection: ITEMS_COLLECTION.to_string(),
            tick_rate_ms: 250,
            expiry: ExpiryOptions::default(),
            backend: BackendOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.backend
            .resolve(paths)
            .context("resolving backend paths")?;
        if !ThemeRegistry::default().contains(&self.theme) {
            tracing::warn!(?self.theme, "unknown theme in config, falling back to Dark");
            self.theme = ThemeName::Dark;
        }
        if self.collection.trim().is_empty() {
            tracing::warn!("empty collection name in config, using '{ITEMS_COLLECTION}'");
            self.collection = ITEMS_COLLECTION.to_string();
        }
        Ok(())
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(16))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryOptions {
    /// Items expiring within this many days are flagged as "soon"
    pub soon_within_days: u32,
}

impl Default for ExpiryOptions {
    fn default() -> Self {
        Self {
            soon_within_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub blob_dir: PathBuf,
    #[serde(skip)]
    pub session_file: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            blob_dir: PathBuf::new(),
            session_file: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl BackendOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.blob_dir.as_os_str().is_empty() {
            self.blob_dir = paths.blob_dir.clone();
        }
        if self.session_file.as_os_str().is_empty() {
            self.session_file = paths.session_file.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, std::hash::Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeName {
    Dark,
    Light,
    HighContrast,
}

impl Default for ThemeName {
    fn default() -> Self {
        ThemeName::Dark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_in(temp: &TempDir) -> ConfigLoader {
        let base = temp.path();
        ConfigLoader {
            paths: ConfigPaths::rooted(
                base.join("config"),
                base.join("config").join("config.toml"),
                base.join("data"),
                base.join("state"),
            ),
        }
    }

    #[test]
    fn first_run_writes_defaults_and_resolves_paths() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = loader_in(&temp);
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.collection, ITEMS_COLLECTION);
        assert_eq!(cfg.expiry.soon_within_days, 7);
        assert_eq!(cfg.backend.database_path, temp.path().join("data").join("pantry.db"));
        assert_eq!(
            cfg.backend.session_file,
            temp.path().join("state").join("session.json")
        );
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = loader_in(&temp);
        loader.paths().ensure_directories()?;
        fs::write(
            &loader.paths().config_file,
            "theme = \"light\"\n\n[expiry]\nsoon_within_days = 3\n",
        )?;
        let cfg = loader.load()?;
        assert_eq!(cfg.theme, ThemeName::Light);
        assert_eq!(cfg.expiry.soon_within_days, 3);
        assert_eq!(cfg.tick_rate_ms, 250);
        assert_eq!(cfg.backend.wal_autocheckpoint, 1000);
        Ok(())
    }
}
