pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::cli::config::ChannelKind;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Directory holding the per-page records
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Also append application logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Be verbose (add multiple to be more verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Print errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Verbosity ladder: -1 quiet, 0 default, then one step per -v
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            self.verbose.min(3) as i8
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured page once and dispatch notifications
    Run {
        /// Notification channels to use, overriding the configuration.
        /// May give multiple.
        #[arg(short = 'e', long = "channel", value_enum)]
        channels: Vec<ChannelKind>,
    },

    /// Manage the monitored pages
    Page {
        #[command(subcommand)]
        command: PageCommands,
    },

    /// Inspect or save the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum PageCommands {
    /// Register a page to watch
    Add {
        /// Page URL to fetch
        url: String,

        /// CSS selector for the watched element
        selector: String,

        /// Regex narrowing the selected text
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// List the configured pages
    List,

    /// Drop a page and its stored record
    Remove {
        /// Page id, or an unambiguous prefix of it
        id: String,
    },

    /// Stage a new URL for a page, adopted on the next run
    SetUrl {
        /// Page id, or an unambiguous prefix of it
        id: String,

        /// Replacement URL
        url: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the current configuration to disk
    Save,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config_file.clone().unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Run { channels } => {
            info!("Polling configured pages");
            commands::run(&config_path, cli.data_dir, channels).await
        }
        Commands::Page { command } => match command {
            PageCommands::Add { url, selector, pattern } => {
                info!("Adding page {}", url);
                commands::add_page(&config_path, url, selector, pattern).await
            }
            PageCommands::List => commands::list_pages(&config_path).await,
            PageCommands::Remove { id } => {
                info!("Removing page {}", id);
                commands::remove_page(&config_path, cli.data_dir, id).await
            }
            PageCommands::SetUrl { id, url } => {
                info!("Staging new url for page {}", id);
                commands::set_url(&config_path, id, url).await
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::show_config(&config_path).await,
            ConfigCommands::Save => commands::save_config(&config_path).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn verbosity_ladder() {
        let cli = Cli::parse_from(["poller", "-q", "run"]);
        assert_eq!(cli.verbosity(), -1);

        let cli = Cli::parse_from(["poller", "run"]);
        assert_eq!(cli.verbosity(), 0);

        let cli = Cli::parse_from(["poller", "-vv", "run"]);
        assert_eq!(cli.verbosity(), 2);

        let cli = Cli::parse_from(["poller", "-vvvvv", "run"]);
        assert_eq!(cli.verbosity(), 3);
    }
}
