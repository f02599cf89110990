use anyhow::Result;
use std::path::{Path, PathBuf};
use crate::config::Config;

/// Get the container base path from environment variable, defaulting to "/app"
pub fn container_base_path() -> PathBuf {
    std::env::var("TEEWATCH_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("teewatch");

        Ok(Self::with_base(base_dir))
    }

    pub fn from_docker_env() -> Self {
        Self::with_base(container_base_path())
    }

    /// Config at the base level, data and logs in subdirectories
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn default_store_file(&self) -> PathBuf {
        self.data_dir.join("golf_tee_times.csv")
    }

    /// Store location, honouring `store.path` from the config
    pub fn store_file(&self, config: &Config) -> PathBuf {
        config
            .store
            .path
            .clone()
            .unwrap_or_else(|| self.default_store_file())
    }

    /// Chromium profile used by the listing fetcher
    pub fn browser_dir(&self) -> PathBuf {
        self.data_dir.join("browser")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.log_dir.join("teewatch.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(self.browser_dir())?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        // The container image creates the base directory, so its presence means we run in Docker
        let base = container_base_path();
        if base.exists() {
            return Self::from_docker_env();
        }

        Self::new().unwrap_or_else(|_| Self::from_docker_env())
    }
}
