pub mod config;
pub mod paths;

pub use config::{AlertConfig, Config, SchedulerConfig, ServerConfig, SourceConfig, StoreConfig, WatchConfig, default_scheduler_config};
pub use paths::{PathManager, container_base_path};
