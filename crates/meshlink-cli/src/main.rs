mod events;
mod replay;
mod simulate;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshlink_session::{address, build_topology, RunningInfo};

#[derive(Parser)]
#[command(name = "meshlink", about = "meshlink session tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a packed engine address to dotted-quad text.
    Addr {
        /// Packed big-endian IPv4 value.
        value: u32,
    },

    /// Check that text is a usable virtual address.
    CheckIp { text: String },

    /// Check that text is a valid `address/prefix` block.
    CheckCidr { text: String },

    /// Build the topology graph from a running-info document (JSON output).
    Topology {
        /// Running-info document as reported by the engine.
        #[arg(long)]
        running_info: PathBuf,
        /// Local address; defaults to the one confirmed in the document.
        #[arg(long)]
        local: Option<String>,
    },

    /// Drive a real session manager against a scripted engine.
    Simulate {
        /// Network configuration (JSON).
        #[arg(long)]
        config: PathBuf,
        /// Running-info document replayed once the address is "confirmed".
        #[arg(long)]
        running_info: PathBuf,
        /// Room name to join.
        #[arg(long, default_value = "simulated")]
        room: String,
        /// Number of status polls answered with "not connected".
        #[arg(long, default_value = "2")]
        confirm_after: usize,
        /// Seconds to keep the session up before disconnecting.
        #[arg(long, default_value = "5")]
        run_for: u64,
        /// Connect timeout in seconds (default 15, or MESHLINK_CONNECT_TIMEOUT_SECS).
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Addr { value } => {
            println!("{}", address::address_to_text(value));
        }

        Command::CheckIp { text } => {
            let addr = address::parse_address(&text)
                .with_context(|| format!("{text:?} is not a usable virtual address"))?;
            println!("{addr}");
        }

        Command::CheckCidr { text } => {
            let (addr, prefix) = address::parse_cidr(&text)
                .with_context(|| format!("{text:?} is not a valid address/prefix block"))?;
            println!("{addr}/{prefix}");
        }

        Command::Topology {
            running_info,
            local,
        } => {
            let raw = std::fs::read_to_string(&running_info)
                .with_context(|| format!("reading {}", running_info.display()))?;
            let info = RunningInfo::parse(&raw).with_context(|| {
                format!("{} is not a running-info document", running_info.display())
            })?;
            let local = local
                .or_else(|| info.confirmed_address().map(|a| a.to_string()))
                .unwrap_or_default();
            let graph = build_topology(&info.peer_records(), &local);
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Command::Simulate {
            config,
            running_info,
            room,
            confirm_after,
            run_for,
            timeout,
        } => {
            eprintln!("meshlink v{}", env!("CARGO_PKG_VERSION"));
            simulate::run(simulate::SimulateConfig {
                config,
                running_info,
                room,
                confirm_after,
                run_for: Duration::from_secs(run_for),
                connect_timeout: timeout.map(Duration::from_secs),
            })
            .await?;
        }
    }

    Ok(())
}
