use crate::output::Output;
use color_eyre::Result;
use std::fs;
use std::path::Path;
use teewatch_config::{Config, PathManager};

pub fn run_clear(store: bool, browser: bool, all: bool, output: &Output) -> Result<()> {
    clear_data(&PathManager::default(), store, browser, all, output)
}

fn clear_data(path_manager: &PathManager, store: bool, browser: bool, all: bool, output: &Output) -> Result<()> {
    if !(store || browser || all) {
        output.warn("No clear option specified. Use --store, --browser, or --all");
        output.println("\nExample: teewatch clear --store");
        return Ok(());
    }

    // A broken config must not fall back to the default store path
    let config_file = path_manager.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;

    if store || all {
        remove_path(&path_manager.store_file(&config), "tee-time store", output)?;
    }

    if browser || all {
        remove_path(&path_manager.browser_dir(), "browser profile", output)?;
        remove_path(&path_manager.data_dir().join("chromium_downloads"), "downloaded Chromium", output)?;
    }

    if all {
        output.success("All stored data cleared");
    }
    Ok(())
}

fn remove_path(path: &Path, what: &str, output: &Output) -> Result<()> {
    if !path.exists() {
        output.info(format!("No {} found to clear", what));
        return Ok(());
    }

    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| color_eyre::eyre::eyre!("Failed to remove {} at {}: {}", what, path.display(), e))?;

    output.success(format!("Cleared {}: {}", what, path.display()));
    Ok(())
}
