//! Ordered, deduplicated collection of wallet records.
//!
//! Records are keyed by `(asset, address)`. Every upsert stamps the record with a fresh,
//! strictly increasing sequence number, so display order is simply descending sequence order.

use crate::wallet::types::{Asset, WalletKey, WalletRecord};

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct WalletSet {
    /// Key to the sequence number of its current record
    index: HashMap<WalletKey, u64>,
    /// Records by insertion sequence; the highest sequence is the most recent
    records: BTreeMap<u64, WalletRecord>,
    next_seq: u64,
}

impl WalletSet {
    /// Insert or replace the record for its key and move it to the most-recent position.
    ///
    /// Returns the record that was replaced, if any.
    pub fn upsert(&mut self, record: WalletRecord) -> Option<WalletRecord> {
        let key = record.key();
        let replaced = self
            .index
            .remove(&key)
            .and_then(|seq| self.records.remove(&seq));

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(key, seq);
        self.records.insert(seq, record);
        replaced
    }

    pub fn get(&self, asset: &Asset, address: &str) -> Option<&WalletRecord> {
        let key = WalletKey {
            asset: asset.clone(),
            address: address.to_string(),
        };
        self.index.get(&key).and_then(|seq| self.records.get(seq))
    }

    /// Whether `record` is already the most recent entry, field for field.
    pub fn is_latest(&self, record: &WalletRecord) -> bool {
        self.records
            .last_key_value()
            .is_some_and(|(_, latest)| latest == record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in display order, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &WalletRecord> {
        self.records.values().rev()
    }

    pub fn count_for(&self, asset: &Asset) -> usize {
        self.iter().filter(|w| &w.asset == asset).count()
    }

    pub fn total_balance_for(&self, asset: &Asset) -> Decimal {
        self.iter()
            .filter(|w| &w.asset == asset)
            .map(|w| w.balance)
            .sum()
    }
}
