//! Balance derivation by chain replay
//!
//! No balance table is stored anywhere. An address's balance is the output
//! it assigned to itself in its most recent transaction, plus whatever it
//! has been sent since; with no transaction of its own it is the starting
//! balance plus everything it has received.

use crate::core::block::Block;

/// Balance every address starts with
pub const STARTING_BALANCE: u64 = 1000;

/// Replay `chain` to find the balance of `address`.
///
/// With `as_of`, only history that existed before that instant counts:
/// blocks mined at or after it are skipped, and a transaction the address
/// signed at or after it does not end the scan.
pub fn calculate_balance(chain: &[Block], address: &str, as_of: Option<i64>) -> u64 {
    let mut received: u64 = 0;

    // Genesis carries no transactions and is never replayed
    for block in chain.iter().skip(1).rev() {
        if as_of.is_some_and(|t| block.timestamp >= t) {
            continue;
        }

        let authored = block.transactions.iter().any(|tx| {
            tx.input.address() == address
                && match (as_of, tx.input.timestamp()) {
                    (Some(t), Some(signed_at)) => signed_at < t,
                    _ => true,
                }
        });

        let credited = block
            .transactions
            .iter()
            .filter_map(|tx| tx.output_map.get(address))
            .fold(0u64, |total, value| total.saturating_add(*value));
        received = received.saturating_add(credited);

        if authored {
            return received;
        }
    }

    STARTING_BALANCE.saturating_add(received)
}
