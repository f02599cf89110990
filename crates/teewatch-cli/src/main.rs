use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, poll, run, show};
use std::path::PathBuf;
use teewatch_config::PathManager;

mod commands;
mod logging;
mod output;
mod server;

#[derive(Parser)]
#[command(name = "teewatch")]
#[command(about = "teewatch - Watch golf tee-time availability and get told when slots go")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously, serve the latest data over HTTP and log alerts
    #[command(long_about = "Run the monitor in the foreground. Every interval the next days of tee times are fetched, merged into the store and checked against watched courses. The latest snapshot is served over HTTP unless --no-server is given. Stop with Ctrl-C.")]
    Run {
        /// Seconds between successful polls
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,

        /// Number of play dates to poll, starting today
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,

        /// Address for the HTTP publisher (e.g. 127.0.0.1:5000)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Do not start the HTTP publisher
        #[arg(long, action = ArgAction::SetTrue)]
        no_server: bool,

        /// Watch a course for this session (repeatable)
        #[arg(long, value_name = "COURSE")]
        watch: Vec<String>,

        /// Also write JSON logs to a daily-rotated file.
        /// Without a value the file goes to the log directory: --log-file=/var/log/teewatch.log
        #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
        log_file: Option<String>,
    },
    /// Run a single poll cycle and merge it into the store
    Poll {
        /// Number of play dates to poll, starting today
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,

        /// Merge in memory only, leaving the store file untouched
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Print the stored tee times
    Show {
        /// Only this play date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,

        /// Only courses whose name contains this text
        #[arg(long, value_name = "NAME")]
        course: Option<String>,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommands>,
    },
    /// Delete stored data
    #[command(long_about = "Delete the tee-time store and/or the browser profile. Use --store, --browser, or --all.")]
    Clear {
        /// Delete the tee-time store file
        #[arg(long, action = ArgAction::SetTrue)]
        store: bool,

        /// Delete the browser profile and downloaded Chromium
        #[arg(long, action = ArgAction::SetTrue)]
        browser: bool,

        /// Delete everything
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["store", "browser"])]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { log_file: Some(path), .. } if path.is_empty() => Some(PathManager::default().daemon_log_file()),
        Commands::Run { log_file: Some(path), .. } => Some(PathBuf::from(path)),
        _ => None,
    };
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Run {
            interval,
            days,
            bind,
            no_server,
            watch,
            log_file: _,
        } => {
            let config = config::load_config(&output)?;
            let options = run::RunOptions {
                interval,
                days,
                bind,
                no_server,
                watch,
            };
            run::run_monitor(config, options, &output).await
        }
        Commands::Poll { days, dry_run } => {
            let config = config::load_config(&output)?;
            poll::run_poll(config, days, dry_run, &output).await
        }
        Commands::Show { date, course } => {
            let config = config::load_config(&output)?;
            show::run_show(&config, date, course.as_deref(), &output)
        }
        Commands::Config { cmd } => config::run_config(cmd.unwrap_or(ConfigCommands::Show), &output),
        Commands::Clear { store, browser, all } => clear::run_clear(store, browser, all, &output),
    }
}
