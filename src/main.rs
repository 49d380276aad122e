use anyhow::Result;
use tracing::{info, error};

mod browser;
mod cli;
mod extract;
mod notify;
mod poller;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first so verbosity can shape logging
    let args = cli::parse_args();

    utils::init_logging(args.verbosity(), args.log_file.clone())?;

    info!("Starting change-poller v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
