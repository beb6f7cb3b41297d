//! Decoding and signer recovery for raw transaction envelopes.

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
	#[error("Malformed transaction envelope: {0}")]
	Decode(String),
	#[error("Unsupported transaction type")]
	UnsupportedType,
	#[error("Signer recovery failed: {0}")]
	Recovery(String),
}

/// Decodes an EIP-2718 encoded transaction.
pub fn decode_envelope(raw: &[u8]) -> Result<TxEnvelope, EnvelopeError> {
	let mut buf = raw;
	let envelope =
		TxEnvelope::decode_2718(&mut buf).map_err(|e| EnvelopeError::Decode(e.to_string()))?;
	if !buf.is_empty() {
		return Err(EnvelopeError::Decode("trailing bytes".to_string()));
	}
	Ok(envelope)
}

/// Recovers the address that signed a legacy or EIP-1559 transaction.
pub fn recover_signer(envelope: &TxEnvelope) -> Result<Address, EnvelopeError> {
	let (signature, prehash) = match envelope {
		TxEnvelope::Legacy(tx) => (*tx.signature(), tx.signature_hash()),
		TxEnvelope::Eip1559(tx) => (*tx.signature(), tx.signature_hash()),
		_ => return Err(EnvelopeError::UnsupportedType),
	};
	signature
		.recover_address_from_prehash(&prehash)
		.map_err(|e| EnvelopeError::Recovery(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_garbage_is_rejected() {
		assert!(matches!(
			decode_envelope(&[0x02, 0xde, 0xad]),
			Err(EnvelopeError::Decode(_))
		));
		assert!(decode_envelope(&[]).is_err());
	}
}
