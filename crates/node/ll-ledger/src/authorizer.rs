use ed25519_dalek::{Signature, SignatureError, Verifier, VerifyingKey};
use ll_primitives::address::Address;
use ll_primitives::coin_data::CoinData;
use ll_primitives::transaction::Transaction;
use std::collections::BTreeSet;
use std::fmt;

/// Spend authorization error
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// No signature for spending address
    #[error("Missing signature for {address}")]
    MissingSignature {
        /// Spending address
        address: Address,
    },
    /// Signature doesn't verify
    #[error("Invalid signature for {address}: {error}")]
    InvalidSignature {
        /// Spending address
        address: Address,
        /// Low-level error
        #[source]
        error: SignatureError,
    },
}

/// Decides whether spends of a transaction are authorized by owners of spending addresses
pub trait SpendAuthorizer: fmt::Debug + Send + Sync + 'static {
    /// Check authorization of all spends in coin data of the transaction
    fn authorize(&self, tx: &Transaction, coin_data: &CoinData) -> Result<(), AuthorizationError>;
}

/// Requires an Ed25519 signature over transaction hash for every spending address, where the
/// address is derived from the public key with [`Address::from_public_key()`]
#[derive(Debug, Default, Copy, Clone)]
pub struct Ed25519SpendAuthorizer;

impl SpendAuthorizer for Ed25519SpendAuthorizer {
    fn authorize(&self, tx: &Transaction, coin_data: &CoinData) -> Result<(), AuthorizationError> {
        let spenders = coin_data
            .from
            .iter()
            .map(|coin_from| coin_from.address)
            .collect::<BTreeSet<_>>();

        for address in spenders {
            let signature = tx
                .signatures()
                .iter()
                .find(|signature| Address::from_public_key(&signature.public_key) == address)
                .ok_or(AuthorizationError::MissingSignature { address })?;

            VerifyingKey::from_bytes(&signature.public_key)
                .and_then(|verifying_key| {
                    verifying_key.verify(
                        tx.hash().as_bytes(),
                        &Signature::from_bytes(&signature.signature),
                    )
                })
                .map_err(|error| AuthorizationError::InvalidSignature { address, error })?;
        }

        Ok(())
    }
}

/// Accepts every spend, for development and tests
#[derive(Debug, Default, Copy, Clone)]
pub struct PermissiveSpendAuthorizer;

impl SpendAuthorizer for PermissiveSpendAuthorizer {
    #[inline(always)]
    fn authorize(
        &self,
        _tx: &Transaction,
        _coin_data: &CoinData,
    ) -> Result<(), AuthorizationError> {
        Ok(())
    }
}
