use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use otaserver_coap::{DEFAULT_COAP_PORT, Server};

use clap::Parser;

use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory containing the firmware images.
    #[arg(long, default_value = "firmwares")]
    firmware_path: PathBuf,

    /// Server address.
    #[arg(long, default_value = "::")]
    address: IpAddr,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_COAP_PORT)]
    port: u16,

    /// Seconds between two scans of the firmware directory, which catch the
    /// files the directory watcher missed. Zero disables the scans.
    #[arg(long, default_value_t = 30)]
    rescan_secs: u64,

    /// Enables debug logs.
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .init();

    info!("Serving firmware from {}", cli.firmware_path.display());

    let server = Server::new(cli.firmware_path)
        .address(cli.address)
        .port(cli.port);

    let server = if cli.rescan_secs == 0 {
        server.disable_rescan()
    } else {
        server.rescan_interval(Duration::from_secs(cli.rescan_secs))
    };

    let result = server
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for the shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .run()
        .await;

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
