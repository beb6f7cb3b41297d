//! Common types for the chain mirroring service.
//!
//! This crate defines the data types shared by every mirroring component:
//! transaction outcomes, on-chain records, catalog rows and their mirror
//! state, the registry contract ABI and secret handling. Keeping them in one
//! place lets the RPC, delivery, reader and facade crates agree on shapes
//! without depending on each other.

/// Account and network summary types.
pub mod account;
/// Catalog rows and the per-entity mirror state.
pub mod catalog;
/// Block, transaction and account views of the node.
pub mod chain;
/// ABI of the product registry contract.
pub mod contract;
/// Transaction outcome and receipt types.
pub mod delivery;
/// On-chain product and purchase records.
pub mod records;
/// Zeroizing secret string used for credential material.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Formatting helpers.
pub mod utils;

pub use account::*;
pub use catalog::*;
pub use chain::*;
pub use delivery::*;
pub use records::*;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{format_wei, truncate_id, with_0x_prefix, without_0x_prefix};

pub use alloy::primitives::{Address, Bytes, B256, U256};
