//! # contract-ide
//!
//! Rust SDK and MCP server for a web smart-contract IDE.
//!
//! ## Features
//!
//! - **CompilerClient**: compile contract source to Solidity, Vyper or Stylus Rust
//! - **DeploymentClient**: deploy through the IDE backend, estimate gas, verify, track confirmations
//! - **ContractClient**: call, send and subscribe to deployed contracts over JSON-RPC
//! - **AiClient**: assistant sessions with bounded history plus single-shot code tools
//! - **ContractIde**: one facade over all four with a single event stream
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contract_ide::{ContractIde, CreateAndDeployOptions, SdkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ide = ContractIde::new(SdkConfig::new("http://localhost:3001/api"));
//!     let mut events = ide.subscribe();
//!
//!     let mut options = CreateAndDeployOptions::new("vyper", "sepolia");
//!     options.private_key = Some(std::env::var("PRIVATE_KEY")?);
//!
//!     let deployed = ide.create_and_deploy("def get() -> uint256: return 42", options).await?;
//!     println!("Deployed at {}", deployed.contract.address_string());
//!
//!     while let Ok(event) = events.try_recv() {
//!         println!("{}", event.name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod compiler;
pub mod config;
pub mod deployment;
pub mod error;
pub mod ethereum;
pub mod events;
pub mod fallback;
pub mod sdk;
pub mod server;
pub mod transport;
pub mod types;

pub use ai::AiClient;
pub use compiler::CompilerClient;
pub use deployment::DeploymentClient;
pub use error::{Result, SdkError};
pub use ethereum::contract::{ContractClient, ContractHandle};
pub use ethereum::networks::Networks;
pub use ethereum::{ContractInfo, EventRecord, TransactionOutcome, TxOptions, TxReceipt};
pub use events::{EventBus, SdkEvent};
pub use sdk::{ContractIde, CreateAndDeployOptions, DeployedContract};
pub use transport::{HttpBackend, MockBackend, ReqwestBackend, Transport};
pub use types::*;
