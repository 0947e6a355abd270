use std::time::Duration;

use clap::Parser;
use serial_gate::{cli, config::Config, logging, server::Gateway};
use tracing::{debug, error, info};

/// Delay before reopening the device after a fatal failure.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    logging::init().await;

    let cli = cli::Cli::parse();

    if let Some(command) = &cli.command {
        match command {
            cli::Commands::ConfigExample => {
                println!("{}", Config::example().serialize_pretty());
                return;
            }
        }
    }

    let mut config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)
    } else {
        debug!("Default config");
        Config::default()
    };

    cli.apply_to(&mut config);

    info!(?config, "Starting service");

    let mut gateway = Gateway::new(config);
    let stop = gateway.stop_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C, quitting");
            stop.stop();
        }
    });

    // A device failure cannot be recovered in place.
    // Start over after a delay and hope the hardware came back.
    loop {
        match gateway.start().await {
            Ok(()) => {
                info!("Service stopped");
                break;
            }
            Err(e) => {
                error!(%e, delay = ?RETRY_DELAY, "Service failed, will retry");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    logging::shutdown();
}
