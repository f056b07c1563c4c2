use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

mod business_layer;
mod config;
mod data_layer;
mod error;
mod presentation_layer;
mod services;
mod utils;

#[derive(Parser)]
#[command(name = "swarm-live-relay", version, about = "Hybrid P2P + CDN live segment relay")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch encoder output, distribute segments and announce them to the hub
    Broadcast,
    /// Run the signaling hub
    Signal,
    /// Follow the hub and download the live stream
    View {
        /// Where to write the received stream (overrides viewer.output_path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Broadcast => {
            info!("🚀 Starting broadcaster");
            services::broadcaster::run_broadcaster(config).await
        }
        Command::Signal => {
            info!("🚀 Starting signaling hub");
            services::signaling::run_signaling(config).await
        }
        Command::View { output } => {
            info!("🚀 Starting viewer");
            services::viewer::run_viewer(config, output).await
        }
    }
}
