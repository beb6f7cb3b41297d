//! Formatting helpers shared across crates.

pub mod formatting;

pub use formatting::{format_wei, truncate_id, with_0x_prefix, without_0x_prefix};
