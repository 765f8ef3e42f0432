use ed25519_dalek::{Signer, SigningKey};
use std::fmt;

use super::service::{SignedTransaction, UnsignedTransaction};
use crate::error::LedgerError;

/// Holds the treasury key. The only component that ever sees it.
pub struct TreasurySigner {
    key: SigningKey,
    address: String,
}

impl fmt::Debug for TreasurySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreasurySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl TreasurySigner {
    /// Parse a hex-encoded 32-byte ed25519 secret key
    pub fn from_hex(secret: &str, network: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| LedgerError::InvalidKey(format!("not hex: {}", e)))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|raw: Vec<u8>| {
            LedgerError::InvalidKey(format!("expected 32 bytes, got {}", raw.len()))
        })?;

        let key = SigningKey::from_bytes(&bytes);
        let address = format!("{}:{}", network, hex::encode(key.verifying_key().to_bytes()));

        Ok(Self { key, address })
    }

    /// Treasury address: `<network>:<hex public key>`
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, transaction: &UnsignedTransaction) -> Result<SignedTransaction, LedgerError> {
        let digest = hex::decode(&transaction.signing_hash).map_err(|e| LedgerError::Rpc {
            method: "createTransactions".to_string(),
            message: format!("transaction {} has a malformed signing hash: {}", transaction.id, e),
        })?;

        let signature = self.key.sign(&digest);

        Ok(SignedTransaction {
            id: transaction.id.clone(),
            payload: transaction.payload.clone(),
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        })
    }
}
