// src/config.rs
use std::env;

use clap::ValueEnum;
use ethers::types::Address;

use crate::error::{Result, TesterError};

/// Entry point v0.6, deployed at the same address on every supported network.
pub const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
/// Stackup simple account factory.
pub const SIMPLE_ACCOUNT_FACTORY: &str = "0x9406Cc6185a346906296840746125a0E44976454";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Goerli,
    Mumbai,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Goerli => "goerli",
            Network::Mumbai => "mumbai",
        }
    }
}

/// Raw values read from the environment. Nothing is validated here; a missing
/// value only becomes an error when something asks for it.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub endpoint_goerli: Option<String>,
    pub endpoint_mumbai: Option<String>,
    pub bundler_goerli: Option<String>,
    pub bundler_mumbai: Option<String>,
    pub contract_goerli: Option<String>,
    pub contract_mumbai: Option<String>,
    pub private_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            endpoint_goerli: env::var("ENDPOINT_GOERLI").ok(),
            endpoint_mumbai: env::var("ENDPOINT_MUMBAI").ok(),
            bundler_goerli: env::var("BUNDLER_GOERLI").ok(),
            bundler_mumbai: env::var("BUNDLER_MUMBAI").ok(),
            contract_goerli: env::var("CONTRACT_GOERLI").ok(),
            contract_mumbai: env::var("CONTRACT_MUMBAI").ok(),
            private_key: env::var("PRIVATE_KEY").ok(),
        }
    }

    /// Resolves everything the selected network needs.
    pub fn for_network(&self, network: Network) -> NetworkConfig {
        let (endpoint, bundler, contract) = match network {
            Network::Goerli => (
                self.endpoint_goerli.clone(),
                self.bundler_goerli.clone(),
                self.contract_goerli.clone(),
            ),
            Network::Mumbai => (
                self.endpoint_mumbai.clone(),
                self.bundler_mumbai.clone(),
                self.contract_mumbai.clone(),
            ),
        };

        NetworkConfig {
            network,
            endpoint,
            bundler,
            contract,
            private_key: self.private_key.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    endpoint: Option<String>,
    bundler: Option<String>,
    contract: Option<String>,
    private_key: Option<String>,
}

impl NetworkConfig {
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or(TesterError::MissingEnv(match self.network {
            Network::Goerli => "ENDPOINT_GOERLI",
            Network::Mumbai => "ENDPOINT_MUMBAI",
        }))
    }

    pub fn bundler(&self) -> Result<&str> {
        self.bundler.as_deref().ok_or(TesterError::MissingEnv(match self.network {
            Network::Goerli => "BUNDLER_GOERLI",
            Network::Mumbai => "BUNDLER_MUMBAI",
        }))
    }

    pub fn private_key(&self) -> Result<&str> {
        self.private_key.as_deref().ok_or(TesterError::MissingEnv("PRIVATE_KEY"))
    }

    /// Deployed `SimpleEventEmitter` for this network. An explicit override wins.
    pub fn contract_address(&self, overridden: Option<Address>) -> Result<Address> {
        if let Some(address) = overridden {
            return Ok(address);
        }
        let raw = self.contract.as_deref().ok_or(TesterError::MissingEnv(match self.network {
            Network::Goerli => "CONTRACT_GOERLI",
            Network::Mumbai => "CONTRACT_MUMBAI",
        }))?;
        parse_address(raw)
    }

    pub fn entry_point(&self) -> Result<Address> {
        parse_address(ENTRY_POINT)
    }

    pub fn account_factory(&self) -> Result<Address> {
        parse_address(SIMPLE_ACCOUNT_FACTORY)
    }
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| TesterError::InvalidConfig(format!("bad address {raw:?}: {e}")))
}
