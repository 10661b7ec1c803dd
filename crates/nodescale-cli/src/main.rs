//! nodescale — agent pool scale planning.
//!
//! ```text
//! nodescale plan --api-model _output/mycluster/apimodel.json \
//!     --inventory rg-export.json --resource-group my-rg --location westus2 \
//!     --node-pool agentpool1 --new-node-count 5
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "nodescale",
    about = "Scale a cluster's agent pools",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a scale operation would do, without changing anything.
    ///
    /// Nodes are read from a JSON export of the resource group
    /// ({"virtualMachines": [...], "scaleSets": [...]}).
    Plan(PlanArgs),
}

#[derive(clap::Args)]
struct PlanArgs {
    /// Path to the cluster's api model (apimodel.json)
    #[arg(short = 'm', long)]
    api_model: PathBuf,
    /// Resource group inventory export
    #[arg(short, long)]
    inventory: PathBuf,
    /// Pool to scale; required when the cluster has more than one
    #[arg(long)]
    node_pool: Option<String>,
    /// Desired node count
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u32).range(1..))]
    new_node_count: u32,
    /// Resource group the cluster lives in
    #[arg(short = 'g', long)]
    resource_group: String,
    /// Cluster location
    #[arg(short, long)]
    location: String,
    /// Settings file (nodescale.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,nodescale=debug"))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Plan(args) => commands::plan::run(args).await,
    }
}
