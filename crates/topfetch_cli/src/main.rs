//! topfetch CLI - save your complete Spotify top tracks and artists as JSON.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::{Term, style};
use tracing_subscriber::EnvFilter;

use topfetch::fetch::TimeRange;

use crate::commands::fetch::FetchOptions;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "topfetch")]
#[command(version)]
#[command(about = "Fetch your complete Spotify top tracks and artists")]
#[command(
    long_about = "topfetch authorizes against your Spotify account, keeps the credential \
fresh across runs, and saves every one of your top tracks and artists for a time range \
as JSON. Pages are fetched concurrently; a failed page is reported instead of aborting \
the run."
)]
#[command(after_long_help = r#"EXAMPLES
    Fetch the last ~6 months into the current directory:
        $ topfetch fetch

    Fetch the last ~4 weeks, keeping market lists, into ./data:
        $ topfetch fetch --time-range short --keep-markets --output-dir data

    Re-authorize from scratch:
        $ topfetch login

    Generate shell completions:
        $ topfetch completions bash > ~/.local/share/bash-completion/completions/topfetch

CONFIGURATION
    topfetch reads configuration from:
      1. ~/.config/topfetch/config.toml (or $XDG_CONFIG_HOME/topfetch/config.toml)
      2. ./topfetch.toml
      3. Environment variables (TOPFETCH_* prefix, e.g., TOPFETCH_FETCH__CONCURRENCY)
      4. .env file in current directory

    The app's redirect URI must be set to http://127.0.0.1:8888/callback
    in the Spotify developer dashboard.

ENVIRONMENT VARIABLES
    SPOTIFY_CLIENT_ID         Application client id
    SPOTIFY_CLIENT_SECRET     Application client secret
    SPOTIFY_REFRESH_TOKEN     Refresh token to use instead of the stored one
    RUST_LOG                  Log filter when output is not a terminal
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch top tracks and artists and save them as JSON
    Fetch {
        /// Time range: short_term (~4 weeks), medium_term (~6 months), long_term (~1 year)
        #[arg(short, long, value_parser = parse_time_range)]
        time_range: Option<TimeRange>,

        /// Keep `available_markets` in saved tracks (much larger files)
        #[arg(long)]
        keep_markets: bool,

        /// Directory for the output files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum concurrent page requests
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Items per page (1-50)
        #[arg(long)]
        page_size: Option<usize>,

        /// Stop after this many items per collection
        #[arg(long)]
        max_items: Option<usize>,

        /// Pace API requests to at most this many per second
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Authorize again, replacing any stored credential
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show the stored credential without contacting Spotify
    Status,
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Initialize tracing for non-TTY mode (structured logging)
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("topfetch=info,topfetch_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    let shutdown = shutdown::setup_shutdown_handler();

    let result = tokio::select! {
        result = run(cli) => result,
        Ok(()) = shutdown => {
            return ExitCode::from(shutdown::INTERRUPTED_EXIT_CODE as u8);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if Term::stderr().is_term() {
                eprintln!("{} {}", style("error:").red().bold(), e);
            } else {
                tracing::error!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (config file -> env vars -> defaults)
    let config = Config::load();

    match cli.command {
        Commands::Fetch {
            time_range,
            keep_markets,
            output_dir,
            concurrency,
            page_size,
            max_items,
            rate_limit,
            no_browser,
        } => {
            let options = FetchOptions {
                time_range: time_range.unwrap_or(config.fetch.time_range),
                keep_markets: keep_markets || config.fetch.keep_markets,
                output_dir: output_dir
                    .or_else(|| config.fetch.output_dir.clone())
                    .unwrap_or_else(|| PathBuf::from(".")),
                page_size: page_size.unwrap_or(config.fetch.page_size),
                concurrency: concurrency.unwrap_or(config.fetch.concurrency),
                max_items: max_items.or(config.fetch.max_items),
                requests_per_second: rate_limit.or(config.fetch.requests_per_second),
                open_browser: !no_browser,
            };
            commands::fetch::handle_fetch(options, &config).await?;
        }
        Commands::Login { no_browser } => {
            commands::login::handle_login(&config, !no_browser).await?;
        }
        Commands::Status => {
            commands::status::handle_status(&config)?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
    }

    Ok(())
}
