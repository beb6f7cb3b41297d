//! String formatting utilities.
//!
//! Hex prefix handling, log-friendly truncation of hashes and ids, and wei
//! amounts rendered as ether.

use alloy::primitives::{utils::format_ether, U256};

/// Shortens a long id or hash for log output.
///
/// Keeps the first 10 characters so a `0x` prefixed hash still shows eight
/// hex digits.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 10 {
		id.to_string()
	} else {
		format!("{}..", &id[..10])
	}
}

/// Adds a "0x" prefix unless one is present.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes a leading "0x" or "0X" if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders a wei amount as a decimal ether string.
pub fn format_wei(amount: U256) -> String {
	format_ether(amount)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345"), "12345");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x12345678..");
	}

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0Xabcd"), "0Xabcd");
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_format_wei() {
		let one_eth = U256::from(1_000_000_000_000_000_000u128);
		assert_eq!(format_wei(one_eth), "1.000000000000000000");
	}
}
