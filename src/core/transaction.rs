//! Transaction handling for the ledger
//!
//! Implements an account-style transfer: the sender signs an output map that
//! hands `amount` to each receiver and keeps the remainder for itself. The
//! sender's own output entry is its balance once the transaction is mined.

use crate::crypto::{verify_signature, KeyError};
use crate::wallet::Wallet;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Coins credited to the miner of each block
pub const MINING_REWARD: u64 = 50;

/// Input address that marks a system-issued mining reward
pub const REWARD_ADDRESS: &str = "*authorized-reward*";

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while building or updating a transaction
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Amount exceeds balance: {amount} > {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },
    #[error("Output to a receiver would overflow")]
    OutputOverflow,
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// Reasons a transaction fails its structural check
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidTransaction {
    #[error("outputs total {output:?} does not match input amount {input}")]
    OutputMismatch { input: u64, output: Option<u64> },
    #[error("signature does not verify against the output map")]
    InvalidSignature,
    #[error("transaction carries no signed input")]
    Unsigned,
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Signed input of a regular transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedInput {
    /// Unix milliseconds at which the input was signed
    pub timestamp: i64,
    /// Sender balance the outputs are drawn from
    pub amount: u64,
    /// Sender address (hex public key)
    pub address: String,
    /// Signature over the output map
    pub signature: String,
}

/// Input of a mining reward
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardInput {
    pub address: String,
}

/// Transaction input: either signed by a wallet or issued by the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TransactionInput {
    Signed(SignedInput),
    Reward(RewardInput),
}

impl TransactionInput {
    /// The fixed input carried by every reward transaction
    pub fn reward() -> Self {
        TransactionInput::Reward(RewardInput {
            address: REWARD_ADDRESS.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        match self {
            TransactionInput::Signed(input) => &input.address,
            TransactionInput::Reward(input) => &input.address,
        }
    }

    /// Signing time, if this is a signed input
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            TransactionInput::Signed(input) => Some(input.timestamp),
            TransactionInput::Reward(_) => None,
        }
    }

    /// Claimed sender balance, if this is a signed input
    pub fn amount(&self) -> Option<u64> {
        match self {
            TransactionInput::Signed(input) => Some(input.amount),
            TransactionInput::Reward(_) => None,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A value transfer between addresses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: Uuid,
    /// Who pays, and how much they had
    pub input: TransactionInput,
    /// Amount credited to each address, sender's change included
    #[serde(rename = "outputMap")]
    pub output_map: BTreeMap<String, u64>,
}

impl Transaction {
    /// Create a signed transfer of `amount` from `sender` to `receiver`.
    ///
    /// The sender's wallet balance is the input amount; the remainder stays
    /// with the sender as its own output entry.
    pub fn new(sender: &Wallet, receiver: &str, amount: u64) -> Result<Self, TransactionError> {
        let balance = sender.balance;
        if amount > balance {
            return Err(TransactionError::InsufficientBalance { amount, balance });
        }

        let mut output_map = BTreeMap::new();
        output_map.insert(receiver.to_string(), amount);
        output_map.insert(sender.address(), balance - amount);

        let input = Self::signed_input(sender, balance, &output_map)?;

        Ok(Self {
            id: Uuid::new_v4(),
            input,
            output_map,
        })
    }

    /// Create the miner's reward transaction
    pub fn reward(miner_address: &str) -> Self {
        let mut output_map = BTreeMap::new();
        output_map.insert(miner_address.to_string(), MINING_REWARD);

        Self {
            id: Uuid::new_v4(),
            input: TransactionInput::reward(),
            output_map,
        }
    }

    fn signed_input(
        sender: &Wallet,
        amount: u64,
        output_map: &BTreeMap<String, u64>,
    ) -> Result<TransactionInput, TransactionError> {
        Ok(TransactionInput::Signed(SignedInput {
            timestamp: Utc::now().timestamp_millis(),
            amount,
            address: sender.address(),
            signature: sender.sign(output_map)?,
        }))
    }

    /// Send another `amount` to `receiver` from the sender's remaining output.
    ///
    /// Amounts to an existing receiver accumulate. The input is re-stamped
    /// and re-signed, so any earlier signature no longer applies.
    pub fn update(
        &mut self,
        sender: &Wallet,
        receiver: &str,
        amount: u64,
    ) -> Result<(), TransactionError> {
        let sender_address = sender.address();
        let remaining = self.output_map.get(&sender_address).copied().unwrap_or(0);
        if amount > remaining {
            return Err(TransactionError::InsufficientBalance {
                amount,
                balance: remaining,
            });
        }

        let mut output_map = self.output_map.clone();
        let credited = output_map
            .get(receiver)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(TransactionError::OutputOverflow)?;
        output_map.insert(receiver.to_string(), credited);
        // Read back after the receiver insert: the receiver may be the sender.
        let sender_entry = output_map.entry(sender_address).or_insert(0);
        *sender_entry -= amount;

        let drawn_from = self.input.amount().unwrap_or(remaining);
        self.input = Self::signed_input(sender, drawn_from, &output_map)?;
        self.output_map = output_map;

        Ok(())
    }

    /// Sum of all outputs; `None` on overflow
    pub fn output_total(&self) -> Option<u64> {
        self.output_map
            .values()
            .try_fold(0u64, |total, value| total.checked_add(*value))
    }

    /// Whether this is a system-issued mining reward
    pub fn is_reward(&self) -> bool {
        matches!(&self.input, TransactionInput::Reward(input) if input.address == REWARD_ADDRESS)
    }

    /// Structural check: outputs sum to the input amount and the input
    /// signature covers the output map.
    pub fn validate(&self) -> Result<(), InvalidTransaction> {
        let TransactionInput::Signed(input) = &self.input else {
            return Err(InvalidTransaction::Unsigned);
        };

        let output = self.output_total();
        if output != Some(input.amount) {
            return Err(InvalidTransaction::OutputMismatch {
                input: input.amount,
                output,
            });
        }

        if !verify_signature(&input.address, &self.output_map, &input.signature) {
            return Err(InvalidTransaction::InvalidSignature);
        }

        Ok(())
    }

    /// [`validate`](Self::validate) as a boolean, logging the reason on failure
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Invalid transaction {} from {}: {}",
                    self.id,
                    self.input.address(),
                    e
                );
                false
            }
        }
    }
}
