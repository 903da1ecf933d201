//! Per-asset aggregate statistics and partial updates to them.
//!
//! A `StatsPatch` carries only the fields a payload actually contained. A field is absent when
//! its key is missing or its value is `null`; `0` and `false` are real values and are applied.

use crate::wallet::types::Asset;
use crate::wallet::wallet_set::WalletSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsAggregate {
    pub wallet_count: u64,
    pub total_balance: Decimal,
    pub max_balance: Decimal,
    pub min_balance: Decimal,
    pub is_searching: bool,
}

/// Partial stats as pushed by the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPatch {
    #[serde(rename = "total_wallets", default)]
    pub wallet_count: Option<u64>,
    #[serde(default)]
    pub total_balance: Option<Decimal>,
    #[serde(default)]
    pub max_balance: Option<Decimal>,
    #[serde(default)]
    pub min_balance: Option<Decimal>,
    #[serde(default)]
    pub is_searching: Option<bool>,
}

impl StatsPatch {
    pub fn searching(is_searching: bool) -> Self {
        Self {
            is_searching: Some(is_searching),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl StatsAggregate {
    /// Overwrite every field present in `patch`. Returns whether anything changed.
    pub fn merge(&mut self, patch: &StatsPatch) -> bool {
        let before = self.clone();
        if let Some(count) = patch.wallet_count {
            self.wallet_count = count;
        }
        if let Some(total) = patch.total_balance {
            self.total_balance = total;
        }
        if let Some(max) = patch.max_balance {
            self.max_balance = max;
        }
        if let Some(min) = patch.min_balance {
            self.min_balance = min;
        }
        if let Some(searching) = patch.is_searching {
            self.is_searching = searching;
        }
        *self != before
    }

    /// Whether the pushed wallet count disagrees with what the set holds for `asset`.
    ///
    /// The wallet list is paginated by the backend, so the set legitimately holds fewer records
    /// than the producer has found; only a set holding *more* is a real divergence.
    pub fn diverges_from(&self, asset: &Asset, wallets: &WalletSet) -> bool {
        wallets.count_for(asset) as u64 > self.wallet_count
    }
}
