use crate::output::{Output, OutputFormat};
use crate::ConfigCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;
use teewatch_config::{Config, PathManager};

pub fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show_config(output),
        ConfigCommands::Init { force } => init_config(force, output),
    }
}

/// Load the config file if present, otherwise defaults. The result is validated.
pub fn load_config(output: &Output) -> Result<Config> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();

    if !config_file.exists() {
        output.println(format!(
            "No configuration at {}, using defaults (create one with 'teewatch config init')",
            config_file.display()
        ));
    }

    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

fn init_config(force: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();

    if config_file.exists() && !force {
        output.warn(format!("Configuration already exists at {}", config_file.display()));
        output.println("Use --force to overwrite it with defaults.");
        return Ok(());
    }

    path_manager
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;
    Config::default()
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to write {}: {}", config_file.display(), e))?;

    output.success(format!("Wrote default configuration to {}", config_file.display()));
    Ok(())
}

fn show_config(output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config_file = path_manager.config_file();
    let config = load_config(output)?;

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }

            println!("\n{}", "Configuration".bright_cyan().bold());
            println!("{} {}\n", "File:".dimmed(), config_file.display());

            let mut table = Table::new();
            table.set_header(vec![
                Cell::new("Setting").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").add_attribute(comfy_table::Attribute::Bold),
            ]);

            let scheduler = &config.scheduler;
            let rows: Vec<(&str, String)> = vec![
                ("scheduler.window_days", scheduler.window_days.to_string()),
                ("scheduler.interval_secs", scheduler.interval_secs.to_string()),
                ("scheduler.penalty_secs", scheduler.penalty_secs.to_string()),
                ("scheduler.fetch_timeout_secs", scheduler.fetch_timeout_secs.to_string()),
                ("scheduler.max_concurrent_fetches", scheduler.max_concurrent_fetches.to_string()),
                ("source.base_url", config.source.base_url.clone()),
                ("source.headless", config.source.headless.to_string()),
                ("source.wait_timeout_secs", config.source.wait_timeout_secs.to_string()),
                ("source.scroll_budget_secs", config.source.scroll_budget_secs.to_string()),
                (
                    "source.chrome_path",
                    config
                        .source
                        .chrome_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(auto)".to_string()),
                ),
                ("store.path", path_manager.store_file(&config).display().to_string()),
                ("server.enabled", config.server.enabled.to_string()),
                ("server.bind", config.server.bind.clone()),
                (
                    "watch.courses",
                    if config.watch.courses.is_empty() {
                        "(none)".to_string()
                    } else {
                        config.watch.courses.join(", ")
                    },
                ),
                ("alerts.channel_capacity", config.alerts.channel_capacity.to_string()),
            ];
            for (key, value) in rows {
                table.add_row(vec![Cell::new(key).fg(comfy_table::Color::Cyan), Cell::new(value)]);
            }

            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
            println!("{}", table);
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let value = serde_json::to_value(&config)?;
            output.json(&serde_json::json!({
                "config_file": config_file.display().to_string(),
                "store_file": path_manager.store_file(&config).display().to_string(),
                "config": value,
            }));
        }
    }

    Ok(())
}
