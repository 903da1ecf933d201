//! Progress tracking for a dashboard sync session.
//!
//! This module provides the `SyncProgressTracker`, which counts the events the session applied,
//! broken down by origin and kind, along with reconnects and snapshot failures. The session logs
//! a summary periodically and once more at teardown.

use crate::wallet::sync::channel::ConnectionState;
use crate::wallet::sync::events::{EventOrigin, SourcedEvent, SyncEvent};

use std::collections::HashMap;
use tracing::info;

/// Log a progress line every this many applied events
const LOG_EVERY: usize = 100;

/// Service for tracking synchronization progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    /// Events received from any source
    events_received: usize,
    /// Events that changed the dashboard
    events_changed: usize,
    /// Received events per origin
    by_origin: HashMap<EventOrigin, usize>,
    /// Wallet records upserted, counting each list entry
    wallets_upserted: usize,
    stats_updates: usize,
    search_status_updates: usize,
    snapshot_failures: usize,
    /// Times the live channel entered `Reconnecting`
    reconnects: usize,
    /// `events_received` at the last progress log
    last_logged: usize,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event the session applied, and whether it changed anything
    pub fn record(&mut self, sourced: &SourcedEvent, changed: bool) {
        self.events_received += 1;
        if changed {
            self.events_changed += 1;
        }
        *self.by_origin.entry(sourced.origin).or_default() += 1;

        match &sourced.event {
            SyncEvent::WalletFound(_) => self.wallets_upserted += 1,
            SyncEvent::WalletList(wallets) => self.wallets_upserted += wallets.len(),
            SyncEvent::StatsUpdate(_) => self.stats_updates += 1,
            SyncEvent::SearchStatus { .. } => self.search_status_updates += 1,
            SyncEvent::SnapshotFailed { .. } => self.snapshot_failures += 1,
            SyncEvent::ConnectionChanged(ConnectionState::Reconnecting) => self.reconnects += 1,
            SyncEvent::ConnectionChanged(_) => {}
        }
    }

    /// Log progress every `LOG_EVERY` events or when forced
    pub fn log_progress(&mut self, force: bool) {
        let since_last_log = self.events_received.saturating_sub(self.last_logged);
        if force || since_last_log >= LOG_EVERY {
            info!("Sync progress: {}", self.get_stats().summary());
            self.last_logged = self.events_received;
        }
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            events_received: self.events_received,
            events_changed: self.events_changed,
            snapshot_events: self.origin_count(EventOrigin::Snapshot),
            push_events: self.origin_count(EventOrigin::Push),
            poll_events: self.origin_count(EventOrigin::Poll),
            wallets_upserted: self.wallets_upserted,
            stats_updates: self.stats_updates,
            search_status_updates: self.search_status_updates,
            snapshot_failures: self.snapshot_failures,
            reconnects: self.reconnects,
        }
    }

    fn origin_count(&self, origin: EventOrigin) -> usize {
        self.by_origin.get(&origin).copied().unwrap_or(0)
    }
}

/// Statistics about the sync session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub events_received: usize,
    pub events_changed: usize,
    pub snapshot_events: usize,
    pub push_events: usize,
    pub poll_events: usize,
    pub wallets_upserted: usize,
    pub stats_updates: usize,
    pub search_status_updates: usize,
    pub snapshot_failures: usize,
    pub reconnects: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "{} events ({} changed; {} snapshot, {} push, {} poll): {} wallet upserts, {} stats updates, {} search status updates{}{}",
            self.events_received,
            self.events_changed,
            self.snapshot_events,
            self.push_events,
            self.poll_events,
            self.wallets_upserted,
            self.stats_updates,
            self.search_status_updates,
            if self.reconnects == 0 {
                String::new()
            } else {
                format!(", {} reconnects", self.reconnects)
            },
            if self.snapshot_failures == 0 {
                String::new()
            } else {
                format!(", {} snapshot failures", self.snapshot_failures)
            }
        )
    }
}
