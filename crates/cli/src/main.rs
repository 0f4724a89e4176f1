mod demo;
mod serve;

use std::process;

use clap::{Parser, Subcommand};

/// Careflow clinic patient-flow toolchain.
#[derive(Parser)]
#[command(name = "careflow", version, about = "Careflow clinic patient-flow service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API backed by an in-memory store
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Average consultation length in minutes, used for estimated waits
        #[arg(long, default_value_t = 15)]
        avg_consult_minutes: i64,
    },

    /// Run a scripted clinic day against an in-memory store and print
    /// the queue as it evolves
    Demo,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve {
            port,
            avg_consult_minutes,
        } => serve::start_server(port, avg_consult_minutes).await,
        Commands::Demo => demo::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
