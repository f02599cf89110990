use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

/// Poll loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of consecutive play dates polled, starting today
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Pause between successful cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Pause after a cycle-level failure
    #[serde(default = "default_penalty_secs")]
    pub penalty_secs: u64,
    /// Upper bound for fetching a single play date
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

/// Teescanner listing page settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_tab")]
    pub tab: String,
    /// How long to wait for the first listing block to appear
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,
    /// Scrolling stops after this long and whatever has loaded is extracted
    #[serde(default = "default_scroll_budget_secs")]
    pub scroll_budget_secs: u64,
    /// Pause after each play date before the next page load
    #[serde(default = "default_date_pause_ms")]
    pub date_pause_ms: u64,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// CSV file holding the deduplicated history (defaults to the data directory)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Courses subscribed when the daemon starts (not persisted across restarts)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub courses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_window_days() -> u32 {
    8 // Today plus the following 7 days
}

fn default_interval_secs() -> u64 {
    300
}

fn default_penalty_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    90
}

fn default_max_concurrent_fetches() -> usize {
    3
}

fn default_base_url() -> String {
    "https://www.teescanner.com/booking/list".to_string()
}

fn default_tab() -> String {
    "golfcourse".to_string()
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_scroll_pause_ms() -> u64 {
    2000
}

fn default_max_scrolls() -> u32 {
    100
}

fn default_scroll_budget_secs() -> u64 {
    60
}

fn default_date_pause_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        window_days: default_window_days(),
        interval_secs: default_interval_secs(),
        penalty_secs: default_penalty_secs(),
        fetch_timeout_secs: default_fetch_timeout_secs(),
        max_concurrent_fetches: default_max_concurrent_fetches(),
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        default_scheduler_config()
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn penalty_interval(&self) -> Duration {
        Duration::from_secs(self.penalty_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            tab: default_tab(),
            wait_timeout_secs: default_wait_timeout_secs(),
            scroll_pause_ms: default_scroll_pause_ms(),
            max_scrolls: default_max_scrolls(),
            scroll_budget_secs: default_scroll_budget_secs(),
            date_pause_ms: default_date_pause_ms(),
            headless: true,
            chrome_path: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sched = &self.scheduler;
        if sched.window_days == 0 {
            return Err(anyhow::anyhow!("scheduler.window_days must be at least 1"));
        }
        if sched.interval_secs == 0 {
            return Err(anyhow::anyhow!("scheduler.interval_secs must be positive"));
        }
        if sched.penalty_secs == 0 {
            return Err(anyhow::anyhow!("scheduler.penalty_secs must be positive"));
        }
        if sched.fetch_timeout_secs == 0 {
            return Err(anyhow::anyhow!("scheduler.fetch_timeout_secs must be positive"));
        }
        if sched.max_concurrent_fetches == 0 {
            return Err(anyhow::anyhow!("scheduler.max_concurrent_fetches must be at least 1"));
        }

        if self.source.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("source.base_url cannot be empty"));
        }
        if self.source.wait_timeout_secs == 0 {
            return Err(anyhow::anyhow!("source.wait_timeout_secs must be positive"));
        }
        // A page load must finish inside the scheduler's fetch timeout
        let page_budget = self.source.wait_timeout_secs + self.source.scroll_budget_secs;
        if page_budget >= sched.fetch_timeout_secs {
            return Err(anyhow::anyhow!(
                "source.wait_timeout_secs + source.scroll_budget_secs ({}s) must be below scheduler.fetch_timeout_secs ({}s)",
                page_budget,
                sched.fetch_timeout_secs
            ));
        }

        if self.server.enabled {
            self.bind_addr()?;
        }

        if self.alerts.channel_capacity == 0 {
            return Err(anyhow::anyhow!("alerts.channel_capacity must be at least 1"));
        }

        if self.watch.courses.iter().any(|c| c.trim().is_empty()) {
            return Err(anyhow::anyhow!("watch.courses cannot contain empty course names"));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid server.bind address '{}': {}", self.server.bind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.scheduler.interval_secs = 120;
        config.watch.courses = vec!["Sky72 하늘코스".to_string()];
        config.store.path = Some(PathBuf::from("/tmp/tee.csv"));

        config.save_to_file(file.path()).unwrap();

        let loaded = Config::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.scheduler.interval_secs, 120);
        assert_eq!(loaded.scheduler.window_days, 8);
        assert_eq!(loaded.watch.courses, vec!["Sky72 하늘코스".to_string()]);
        assert_eq!(loaded.store.path, Some(PathBuf::from("/tmp/tee.csv")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[scheduler]\ninterval_secs = 30\n").unwrap();
        assert_eq!(config.scheduler.interval_secs, 30);
        assert_eq!(config.scheduler.penalty_secs, 60);
        assert_eq!(config.scheduler.max_concurrent_fetches, 3);
        assert_eq!(config.source.tab, "golfcourse");
        assert!(config.server.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_page_budget_must_fit_fetch_timeout() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.source.scroll_budget_secs = 80;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("scheduler.fetch_timeout_secs"), "{}", err);

        config.scheduler.fetch_timeout_secs = 120;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.scheduler.window_days, 8);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.scheduler.window_days = 0;
        assert!(config.validate().is_err());
        config.scheduler.window_days = 8;

        config.server.bind = "not-an-address".to_string();
        assert!(config.validate().is_err());

        config.server.enabled = false;
        assert!(config.validate().is_ok());

        config.watch.courses = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }
}
