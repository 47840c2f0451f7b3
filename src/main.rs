// src/main.rs
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::Address;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod account;
mod bundler;
mod client;
mod config;
mod contracts;
mod deploy;
mod error;
mod gas;
mod scenarios;
mod types;

use crate::config::{Config, Network, NetworkConfig};
use crate::deploy::{deploy_contract, resolve_artifact, Artifact};
use crate::scenarios::Harness;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Exercises ERC-4337 user operations through a bundler", long_about = None)]
struct Args {
    /// Network whose endpoints and addresses are used
    #[clap(short, long, value_enum, default_value_t = Network::Goerli)]
    network: Network,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a contract from its Hardhat artifact and print its address
    Deploy {
        #[clap(long, default_value = "artifacts")]
        artifacts: PathBuf,

        #[clap(long, default_value = "SimpleEventEmitter")]
        contract: String,
    },
    /// Run the direct, relayed and escalating-payload scenarios
    Run {
        /// Emitter address; defaults to CONTRACT_<NETWORK>
        #[clap(long)]
        contract_address: Option<Address>,
    },
    /// Print the fee pair the next user operation would use
    Fees,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let network = Config::from_env().for_network(args.network);

    match args.command {
        Command::Deploy { artifacts, contract } => deploy(&network, &artifacts, &contract).await,
        Command::Run { contract_address } => run(&network, contract_address).await,
        Command::Fees => fees(&network).await,
    }
}

async fn deploy(network: &NetworkConfig, artifacts: &Path, contract: &str) -> anyhow::Result<()> {
    let path = resolve_artifact(artifacts, contract)?;
    info!("Using artifact {}", path.display());
    let artifact = Artifact::load(&path)?;

    let client = client::connect(network).await?;
    let address = deploy_contract(client, &artifact).await?;

    println!("{}: {:?}", contract, address);
    Ok(())
}

async fn run(network: &NetworkConfig, contract_address: Option<Address>) -> anyhow::Result<()> {
    let harness = Harness::connect(network, contract_address).await?;
    harness.run_all().await?;
    Ok(())
}

async fn fees(network: &NetworkConfig) -> anyhow::Result<()> {
    let client = client::connect(network).await?;
    let fees = gas::get_gas_fee(client.as_ref()).await?;
    println!("maxFeePerGas: {}", fees.max_fee_per_gas);
    println!("maxPriorityFeePerGas: {}", fees.max_priority_fee_per_gas);
    Ok(())
}
