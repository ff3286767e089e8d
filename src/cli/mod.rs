pub mod daemon_path;
pub mod output;
pub mod process;
pub mod range;
pub mod summary;
pub mod timeline;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use output::{dashboard::DashboardExporter, stats::StatsCollector};
use process::{daemon_executables, kill_previous_servers, restart_server};
use range::RangeArgs;
use summary::process_stats_command;
use timeline::{process_timeline_command, TimelineCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{Config, ENV_UPDATE_REPO},
    daemon::{start_daemon, storage::db::Database},
    llm::{client::OpenAiProvider, LlmProvider},
    update::UpdateChecker,
    utils::{
        dir::{application_path, database_path, reports_path},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Dayflow", version, long_about = None)]
#[command(about = "Records your screen and turns it into a timeline of your day", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Print logs to the console")]
    log: bool,
    #[arg(long = "log-filter", global = true, help = "Level of logs. Defaults to RUST_LOG or info")]
    log_filter: Option<LevelFilter>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Display the activity cards of a range of days")]
    Timeline {
        #[command(flatten)]
        command: TimelineCommand,
    },
    #[command(about = "Display productivity statistics of a range of days")]
    Stats {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Export an HTML dashboard of a range of days")]
    Report {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long, short, help = "Directory of the report. Defaults to <dir>/reports")]
        output: Option<PathBuf>,
    },
    #[command(about = "Send a test request to the configured model")]
    Check {},
    #[command(about = "Check whether a newer release is available")]
    Update {
        #[arg(long, help = "GitHub repository in owner/name form")]
        repo: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = application_path(args.dir)?;

    enable_logging(CLI_PREFIX, &app_dir, args.log_filter, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(&app_dir),
        Commands::Stop {} => {
            let killed = kill_previous_servers(&daemon_executables()?)?;
            println!("Stopped {killed} processes");
            Ok(())
        }
        Commands::Serve {} => start_daemon(app_dir).await,
        Commands::Timeline { command } => process_timeline_command(&app_dir, command).await,
        Commands::Stats { range } => {
            let (start, end) = range.resolve()?;
            process_stats_command(&app_dir, start, end).await
        }
        Commands::Report { range, output } => {
            let (start, end) = range.resolve()?;
            let output = output.unwrap_or_else(|| reports_path(&app_dir));
            let stats = StatsCollector::new(Database::open(database_path(&app_dir))?);
            let path = DashboardExporter::new(stats)
                .export(start, end, &output)
                .await?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Check {} => check_connection(&app_dir).await,
        Commands::Update { repo } => check_update(&app_dir, repo).await,
    }
}

async fn check_connection(app_dir: &Path) -> Result<()> {
    let config = Config::load(app_dir)?;
    let provider = OpenAiProvider::new(config.api, config.analysis)?;
    let reply = provider.test_connection().await?;
    println!("{reply}");
    Ok(())
}

async fn check_update(app_dir: &Path, repo: Option<String>) -> Result<()> {
    let config = Config::load(app_dir)?;
    let repository = repo.or(config.update.repository).ok_or_else(|| {
        anyhow!("No repository to check, pass --repo or set {ENV_UPDATE_REPO}")
    })?;
    let info = UpdateChecker::new(repository)?
        .check(env!("CARGO_PKG_VERSION"))
        .await?;

    if !info.has_update() {
        println!("Dayflow {} is up to date", info.current_version);
        return Ok(());
    }
    println!(
        "Dayflow {} is available, current version is {}",
        info.latest_version, info.current_version
    );
    match info.asset {
        Some(asset) => println!("{} ({} bytes)", asset.browser_download_url, asset.size),
        None => println!("Download it from {}", info.release_page),
    }
    if !info.release_notes.is_empty() {
        println!("\n{}", info.release_notes);
    }
    Ok(())
}
