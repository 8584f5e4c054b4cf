use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use relive::config::AppConfig;
use relive::supervisor::StreamSupervisor;

#[derive(Parser)]
#[command(name = "relive", version, about = "Live stream proxy and recording supervisor")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and validate a stream URL, printing what was learned.
    Probe {
        /// Stream page URL (YouTube, Twitch, Facebook, or direct HLS/RTMP).
        url: String,
    },
    /// Record a live stream until interrupted (or for a fixed duration).
    Record {
        url: String,
        /// Stop automatically after this many seconds.
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Re-host a live stream as a local rolling HLS proxy until interrupted.
    Proxy {
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    // Keep the appender guard alive for the process lifetime
    let _guard = relive::logging::init(&config.log_dir)?;

    let supervisor = StreamSupervisor::new(config);

    match args.command {
        Commands::Probe { url } => {
            let source = supervisor.detect(&url);
            let (is_live, validated) = supervisor.validate(&source).await;
            println!("{}", serde_json::to_string_pretty(&validated)?);
            if !is_live {
                std::process::exit(1);
            }
        }

        Commands::Record { url, duration } => {
            let id = supervisor.add_url(&url).await?;
            let path = supervisor.start_recording(id).await?;
            info!(stream_id = %id, path = %path.display(), "Recording; stop with Ctrl+C");

            wait_for_stop(duration).await;

            let outcome = supervisor.stop_recording(id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            supervisor.cleanup(id).await;
            supervisor.shutdown_all().await;
        }

        Commands::Proxy { url } => {
            let id = supervisor.add_url(&url).await?;
            let proxy_url = supervisor.start_proxy(id).await?;
            info!(stream_id = %id, proxy_url = %proxy_url, "Proxying; stop with Ctrl+C");
            println!("{proxy_url}");

            wait_for_stop(None).await;

            supervisor.cleanup(id).await;
            supervisor.shutdown_all().await;
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or Ctrl+C), or a fixed duration.
async fn wait_for_stop(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => shutdown_signal().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C; shutting down"),
        _ = terminate => info!("Received terminate signal; shutting down"),
    }
}
