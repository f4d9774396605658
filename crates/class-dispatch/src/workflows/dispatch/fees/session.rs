use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FeeError;

/// Sparse base-fee table keyed by session count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeeTable {
    fees: BTreeMap<u32, u64>,
}

/// Result of a session-fee lookup, including the configured count that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFee {
    pub requested: u32,
    pub matched: u32,
    pub fee: u64,
}

impl SessionFee {
    pub fn is_exact(&self) -> bool {
        self.requested == self.matched
    }
}

impl SessionFeeTable {
    pub fn new(fees: BTreeMap<u32, u64>) -> Self {
        Self { fees }
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.fees.iter().map(|(count, fee)| (*count, *fee))
    }

    /// Exact count first, then the nearest configured count below it. Never extrapolates upward.
    pub fn lookup(&self, sessions: u32) -> Result<SessionFee, FeeError> {
        if sessions == 0 {
            return Err(FeeError::Validation {
                field: "sessions",
                reason: "session count must be at least 1".to_string(),
            });
        }

        self.fees
            .range(..=sessions)
            .next_back()
            .map(|(matched, fee)| SessionFee {
                requested: sessions,
                matched: *matched,
                fee: *fee,
            })
            .ok_or(FeeError::UnknownSessionCount {
                requested: sessions,
            })
    }
}
