//! Single merge policy for snapshot and live events.
//!
//! The reconciler owns the dashboard state and is the only thing allowed to mutate it. It does no
//! I/O: every operation is a synchronous transition from (state, event) to the next state, and
//! reports whether the transition was observable.
//!
//! Merge rules:
//! - wallets are upserted by `(asset, address)`; the record applied last wins and becomes the most
//!   recent in display order, regardless of whether it came from the snapshot or a live event
//! - stats fields present in a payload overwrite, absent ones (missing or `null`) are kept;
//!   `0` and `false` are values like any other
//! - a search-status update only touches `is_searching`

use crate::wallet::stats::{StatsAggregate, StatsPatch};
use crate::wallet::sync::channel::ConnectionState;
use crate::wallet::sync::events::SyncEvent;
use crate::wallet::types::{Asset, StatusIndicator, WalletRecord};
use crate::wallet::wallet_set::WalletSet;

use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Everything the dashboard shows
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub wallets: WalletSet,
    pub stats: BTreeMap<Asset, StatsAggregate>,
    pub status: StatusIndicator,
    pub connection: ConnectionState,
}

/// Read-only view of the state between two mutations
#[derive(Debug, Clone, Copy)]
pub struct DashboardView<'a> {
    state: &'a DashboardState,
}

impl<'a> DashboardView<'a> {
    pub fn wallets(&self) -> &'a WalletSet {
        &self.state.wallets
    }

    pub fn stats(&self, asset: &Asset) -> Option<&'a StatsAggregate> {
        self.state.stats.get(asset)
    }

    pub fn all_stats(&self) -> impl Iterator<Item = (&'a Asset, &'a StatsAggregate)> + use<'a> {
        self.state.stats.iter()
    }

    pub fn status(&self) -> StatusIndicator {
        self.state.status
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    state: DashboardState,
    closed: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns whether the state changed.
    pub fn apply(&mut self, event: &SyncEvent) -> bool {
        if self.is_closed() {
            debug!("Reconciler closed, ignoring {:?}", event);
            return false;
        }

        match event {
            SyncEvent::WalletFound(wallet) => self.upsert_wallet(wallet.clone()),
            SyncEvent::WalletList(wallets) => self.load_wallets(wallets),
            SyncEvent::StatsUpdate(stats) => stats
                .iter()
                .fold(false, |changed, (asset, patch)| {
                    self.merge_stats(asset, patch) | changed
                }),
            SyncEvent::SearchStatus {
                asset,
                is_searching,
            } => self.set_searching(asset, *is_searching),
            SyncEvent::SnapshotFailed { part, error } => {
                warn!("Snapshot {:?} fetch failed: {}", part, error);
                self.snapshot_failed()
            }
            SyncEvent::ConnectionChanged(next) => self.set_connection(*next),
        }
    }

    /// Insert or replace a wallet and make it the most recent.
    pub fn upsert_wallet(&mut self, wallet: WalletRecord) -> bool {
        if let Some(previous) = self.state.wallets.get(&wallet.asset, &wallet.address) {
            if previous.balance != wallet.balance {
                debug!(
                    "{} wallet {} balance {} -> {}",
                    wallet.asset, wallet.address, previous.balance, wallet.balance
                );
            }
        }
        let unchanged = self.state.wallets.is_latest(&wallet);
        self.state.wallets.upsert(wallet);
        !unchanged
    }

    /// Upsert a list given most recent first, so its first element ends up most recent.
    pub fn load_wallets(&mut self, wallets: &[WalletRecord]) -> bool {
        wallets.iter().rev().fold(false, |changed, wallet| {
            self.upsert_wallet(wallet.clone()) | changed
        })
    }

    pub fn merge_stats(&mut self, asset: &Asset, patch: &StatsPatch) -> bool {
        if patch.is_empty() {
            debug!("Ignoring empty {} stats update", asset);
            return false;
        }
        let stats = self.state.stats.entry(asset.clone()).or_default();
        let changed = stats.merge(patch);
        if stats.diverges_from(asset, &self.state.wallets) {
            debug!(
                "{} stats report {} wallets but {} are held locally",
                asset,
                stats.wallet_count,
                self.state.wallets.count_for(asset)
            );
        }
        changed
    }

    pub fn set_searching(&mut self, asset: &Asset, is_searching: bool) -> bool {
        self.merge_stats(asset, &StatsPatch::searching(is_searching))
    }

    /// Only reported while no live connection has been established or lost yet.
    fn snapshot_failed(&mut self) -> bool {
        match self.state.connection {
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                self.set_status(StatusIndicator::InitialLoadFailed)
            }
            _ => false,
        }
    }

    fn set_connection(&mut self, next: ConnectionState) -> bool {
        let previous = std::mem::replace(&mut self.state.connection, next);
        let status_changed = match next {
            ConnectionState::Connected => self.set_status(StatusIndicator::Ok),
            ConnectionState::Reconnecting => self.set_status(StatusIndicator::Reconnecting),
            _ => false,
        };
        previous != next || status_changed
    }

    fn set_status(&mut self, status: StatusIndicator) -> bool {
        std::mem::replace(&mut self.state.status, status) != status
    }

    /// Stop accepting events. Every later `apply` is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> DashboardView<'_> {
        DashboardView { state: &self.state }
    }

    pub fn into_state(self) -> DashboardState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::sync::events::SnapshotPart;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    fn wallet(address: &str, balance: &str) -> WalletRecord {
        WalletRecord {
            asset: Asset::Btc,
            address: address.to_string(),
            balance: dec(balance),
            strategy: "random".to_string(),
            source: "blockstream".to_string(),
            discovered_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    fn stats(raw: serde_json::Value) -> SyncEvent {
        SyncEvent::StatsUpdate(crate::api::parse_stats_payload(raw).unwrap())
    }

    #[test]
    fn applying_the_same_wallet_twice_is_idempotent() {
        let mut reconciler = Reconciler::new();
        let event = SyncEvent::WalletFound(wallet("addr1", "0.5"));
        assert!(reconciler.apply(&event));
        assert!(!reconciler.apply(&event));
        assert_eq!(reconciler.view().wallets().len(), 1);
    }

    #[test]
    fn snapshot_then_live_event_keeps_live_balance() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&SyncEvent::WalletList(vec![wallet("addr1", "0.5")]));
        reconciler.apply(&stats(serde_json::json!({"BTC": {"total_wallets": 1}})));
        reconciler.apply(&SyncEvent::WalletFound(wallet("addr1", "0.7")));

        let view = reconciler.view();
        assert_eq!(view.wallets().len(), 1);
        assert_eq!(
            view.wallets().get(&Asset::Btc, "addr1").unwrap().balance,
            dec("0.7")
        );
        assert_eq!(view.stats(&Asset::Btc).unwrap().wallet_count, 1);
    }

    #[test]
    fn last_applied_wins_in_either_order() {
        let snapshot = SyncEvent::WalletList(vec![wallet("addr1", "0.5")]);
        let live = SyncEvent::WalletFound(wallet("addr1", "0.7"));

        for (first, second, expected) in [
            (&snapshot, &live, "0.7"),
            (&live, &snapshot, "0.5"),
        ] {
            let mut reconciler = Reconciler::new();
            reconciler.apply(first);
            reconciler.apply(second);
            let wallets = reconciler.view().wallets();
            assert_eq!(wallets.len(), 1);
            assert_eq!(wallets.get(&Asset::Btc, "addr1").unwrap().balance, dec(expected));
        }
    }

    #[test]
    fn wallet_list_keeps_server_order() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&SyncEvent::WalletFound(wallet("old", "1")));
        reconciler.apply(&SyncEvent::WalletList(vec![
            wallet("newest", "3"),
            wallet("older", "2"),
        ]));
        let order: Vec<_> = reconciler
            .view()
            .wallets()
            .iter()
            .map(|w| w.address.clone())
            .collect();
        assert_eq!(order, vec!["newest", "older", "old"]);
    }

    #[test]
    fn explicit_false_then_search_status_true() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&stats(serde_json::json!({"BTC": {"is_searching": false}})));
        reconciler.apply(&SyncEvent::SearchStatus {
            asset: Asset::Btc,
            is_searching: true,
        });
        assert!(reconciler.view().stats(&Asset::Btc).unwrap().is_searching);

        reconciler.apply(&SyncEvent::SearchStatus {
            asset: Asset::Btc,
            is_searching: false,
        });
        assert!(!reconciler.view().stats(&Asset::Btc).unwrap().is_searching);
    }

    #[test]
    fn search_status_leaves_other_fields_alone() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&stats(
            serde_json::json!({"ETH": {"total_wallets": 2, "total_balance": 1.25}}),
        ));
        reconciler.apply(&SyncEvent::SearchStatus {
            asset: Asset::Eth,
            is_searching: true,
        });
        let eth = reconciler.view().stats(&Asset::Eth).unwrap().clone();
        assert_eq!(eth.wallet_count, 2);
        assert_eq!(eth.total_balance, dec("1.25"));
        assert!(eth.is_searching);
    }

    #[test]
    fn status_indicator_follows_connectivity() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&SyncEvent::SnapshotFailed {
            part: SnapshotPart::Wallets,
            error: "connection refused".to_string(),
        });
        assert_eq!(reconciler.view().status(), StatusIndicator::InitialLoadFailed);

        reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Connecting));
        assert_eq!(reconciler.view().status(), StatusIndicator::InitialLoadFailed);

        reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Connected));
        assert_eq!(reconciler.view().status(), StatusIndicator::Ok);

        // A late snapshot failure does not hide a healthy live connection
        assert!(!reconciler.apply(&SyncEvent::SnapshotFailed {
            part: SnapshotPart::Stats,
            error: "timeout".to_string(),
        }));
        assert_eq!(reconciler.view().status(), StatusIndicator::Ok);

        reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Reconnecting));
        assert_eq!(reconciler.view().status(), StatusIndicator::Reconnecting);
        assert_eq!(reconciler.view().connection(), ConnectionState::Reconnecting);
    }

    #[test]
    fn late_snapshot_failure_keeps_the_reconnecting_message() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Connecting));
        reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Reconnecting));

        assert!(!reconciler.apply(&SyncEvent::SnapshotFailed {
            part: SnapshotPart::Wallets,
            error: "timeout".to_string(),
        }));
        assert_eq!(reconciler.view().status(), StatusIndicator::Reconnecting);
        assert_eq!(
            reconciler.view().status().message(),
            Some("Lost connection to server. Reconnecting...")
        );
    }

    #[test]
    fn empty_stats_update_creates_nothing() {
        let mut reconciler = Reconciler::new();
        assert!(!reconciler.apply(&stats(serde_json::json!({"ETH": {}}))));
        assert!(reconciler.view().stats(&Asset::Eth).is_none());
        assert_eq!(reconciler.view().all_stats().count(), 0);
    }

    #[test]
    fn closed_reconciler_ignores_everything() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(&SyncEvent::WalletFound(wallet("addr1", "0.5")));
        reconciler.close();
        assert!(reconciler.is_closed());

        assert!(!reconciler.apply(&SyncEvent::WalletFound(wallet("addr2", "1"))));
        assert!(!reconciler.apply(&SyncEvent::ConnectionChanged(ConnectionState::Connected)));

        let state = reconciler.into_state();
        assert_eq!(state.wallets.len(), 1);
        assert_eq!(state.connection, ConnectionState::Disconnected);
    }
}
