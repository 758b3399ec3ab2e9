//! Wallet implementation for the ledger
//!
//! Provides key management and transaction creation.

use crate::core::{calculate_balance, Block, Transaction, TransactionError, STARTING_BALANCE};
use crate::crypto::{KeyError, KeyPair};
use serde::Serialize;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// A ledger wallet: a signing key plus the last balance it was told about
pub struct Wallet {
    /// The key pair for signing transactions
    key_pair: KeyPair,
    /// Spendable balance used when drafting a new transaction
    pub balance: u64,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new() -> Self {
        Self::from_key_pair(KeyPair::generate())
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_private_key_hex(private_key_hex)?;
        Ok(Self::from_key_pair(key_pair))
    }

    fn from_key_pair(key_pair: KeyPair) -> Self {
        Self {
            key_pair,
            balance: STARTING_BALANCE,
        }
    }

    /// Get the wallet's address (hex public key)
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    /// Sign arbitrary serializable data
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, KeyError> {
        self.key_pair.sign_data(data)
    }

    /// Recompute the wallet balance from `chain`
    pub fn refresh_balance(&mut self, chain: &[Block]) -> u64 {
        self.balance = calculate_balance(chain, &self.address(), None);
        self.balance
    }

    /// Create a transaction to send funds.
    ///
    /// When a chain is given the balance is refreshed from it first, so the
    /// input amount matches what validators will replay.
    pub fn create_transaction(
        &mut self,
        receiver: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, WalletError> {
        if let Some(chain) = chain {
            self.refresh_balance(chain);
        }

        Ok(Transaction::new(self, receiver, amount)?)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Blockchain;

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::new();
        assert_eq!(wallet.balance, STARTING_BALANCE);
        assert_eq!(wallet.address().len(), 66);
    }

    #[test]
    fn test_wallet_import() {
        let wallet1 = Wallet::new();
        let private_key = wallet1.private_key();

        let wallet2 = Wallet::from_private_key(&private_key).unwrap();
        assert_eq!(wallet1.address(), wallet2.address());
    }

    #[test]
    fn test_create_transaction_over_balance() {
        let mut wallet = Wallet::new();
        let result = wallet.create_transaction("foo", 999_999, None);

        assert!(matches!(
            result,
            Err(WalletError::TransactionError(
                TransactionError::InsufficientBalance { .. }
            ))
        ));
    }

    #[test]
    fn test_create_transaction_refreshes_balance_from_chain() {
        let mut wallet = Wallet::new();
        let mut blockchain = Blockchain::new();

        let tx = wallet.create_transaction("foo", 65, None).unwrap();
        blockchain.add_block(vec![tx]);

        // Stale cached balance until the chain is consulted
        assert_eq!(wallet.balance, STARTING_BALANCE);

        let next = wallet
            .create_transaction("bar", 10, Some(&blockchain.blocks))
            .unwrap();
        assert_eq!(wallet.balance, STARTING_BALANCE - 65);
        assert_eq!(next.input.amount(), Some(STARTING_BALANCE - 65));
        assert!(next.is_valid());
    }
}
