use std::collections::HashSet;
use tracing::warn;

use crate::store::{Balance, PaymentOutput};

/// Which balances are worth paying this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Balances below this many base units roll over to a later cycle
    pub min_payout: u64,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        // Every positive balance gets paid
        Self { min_payout: 1 }
    }
}

/// Turn a balance snapshot into payment outputs.
///
/// Keeps snapshot order. Non-positive balances and balances under the
/// policy minimum are left out; an address listed twice is paid once.
pub fn build_batch(balances: &[Balance], policy: &BatchPolicy) -> Vec<PaymentOutput> {
    let mut seen = HashSet::with_capacity(balances.len());
    let mut outputs = Vec::with_capacity(balances.len());

    for balance in balances {
        if balance.payable_amount <= 0 {
            continue;
        }

        let amount = balance.payable_amount as u64;
        if amount < policy.min_payout {
            continue;
        }

        if !seen.insert(balance.address.as_str()) {
            warn!("⚠️  Duplicate balance for {} in snapshot, paying once", balance.address);
            continue;
        }

        outputs.push(PaymentOutput::new(balance.address.clone(), amount));
    }

    outputs
}
