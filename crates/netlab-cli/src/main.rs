//! netlab CLI tool
//!
//! Wires the devices of a topology file together on a container host, or
//! prints the veth plan for a topology without touching any host.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{cmd_plan, cmd_up, PlanFormat, Target};
use netlab::{PipelineOptions, PlanOptions, SshConfig, DEFAULT_BRIDGE};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create veths and the backbone bridge for a topology on the host
    Up {
        /// Host address of the container host
        #[arg(long, env = "NETLAB_HOST", default_value = "localhost")]
        host: String,

        /// SSH port of the container host
        #[arg(long, env = "NETLAB_PORT", default_value_t = 22)]
        port: u16,

        /// SSH user on the container host
        #[arg(long, env = "NETLAB_USER", default_value = "netlab")]
        user: String,

        /// SSH password (uses sshpass); key authentication when omitted
        #[arg(long, env = "NETLAB_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Run commands on this machine instead of over SSH (SSH options are ignored)
        #[arg(long)]
        local: bool,

        /// Name of the backbone bridge
        #[arg(long, default_value = DEFAULT_BRIDGE)]
        bridge: String,

        /// Namespace lookups / veth pairs to run at once
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        jobs: u16,

        #[command(flatten)]
        topology: TopologyArgs,
    },

    /// Print the veth plan for a topology without contacting a host
    Plan {
        /// Print the plan as JSON
        #[arg(long, conflicts_with = "commands")]
        json: bool,

        /// Print the shell commands the plan would run
        #[arg(long)]
        commands: bool,

        /// Name of the backbone bridge in the printed commands
        #[arg(long, default_value = DEFAULT_BRIDGE)]
        bridge: String,

        #[command(flatten)]
        topology: TopologyArgs,
    },
}

#[derive(Args)]
struct TopologyArgs {
    /// Topology file (YAML, or JSON with a .json extension)
    #[arg(long, env = "NETLAB_TOPOLOGY", default_value = "topology.yaml")]
    topo: PathBuf,

    /// Skip the device reference checks on the topology
    #[arg(long)]
    no_validate: bool,

    /// Allow the same interface name to be planned twice
    #[arg(long)]
    allow_duplicate_names: bool,
}

impl TopologyArgs {
    fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            check_unique_names: !self.allow_duplicate_names,
            ..PlanOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG takes precedence over --verbose
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Up {
            host,
            port,
            user,
            password,
            local,
            bridge,
            jobs,
            topology,
        } => {
            let target = if local {
                Target::Local
            } else {
                Target::Ssh(SshConfig {
                    host,
                    port,
                    user,
                    password,
                })
            };
            let options = PipelineOptions {
                bridge,
                concurrency: usize::from(jobs),
                validate_topology: !topology.no_validate,
                plan: topology.plan_options(),
            };
            cmd_up(target, &topology.topo, options).await?;
        }
        Commands::Plan {
            json,
            commands,
            bridge,
            topology,
        } => {
            let format = if json {
                PlanFormat::Json
            } else if commands {
                PlanFormat::Commands
            } else {
                PlanFormat::Text
            };
            cmd_plan(
                &topology.topo,
                !topology.no_validate,
                topology.plan_options(),
                format,
                &bridge,
            )?;
        }
    }

    Ok(())
}
