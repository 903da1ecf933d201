//! Dashboard sync session and integration point for all sync services.
//!
//! This module defines the `SyncSession`, which wires the snapshot loader, the live update channel
//! and the reconciler together for the lifetime of one dashboard view.
//!
//! The session is responsible for:
//! - Starting the snapshot fetch and the live channel at the same time
//! - Applying every event, from any producer, through the reconciler in arrival order
//! - Handing each applied event and the resulting view to the registered handlers
//! - Tearing everything down so that nothing mutates state afterwards
//!
//! All producers write to one unbounded channel and only the session loop reads it, so the
//! reconciler is never touched concurrently.

use crate::api::{DashboardApi, FinderApiClient};
use crate::config::{Config, LiveMode};
use crate::wallet::types::SyncError;
use crate::wallet::sync::{
    channel::{LiveUpdateChannel, ReconnectPolicy},
    events::{EventDispatcher, SourcedEvent, SyncEventHandler},
    progress_tracker::{SyncProgressTracker, SyncStats},
    reconciler::{DashboardState, Reconciler},
    snapshot::SnapshotLoader,
    strategies::{LiveStrategy, PollStrategy, PushStrategy},
};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What a finished session leaves behind
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: DashboardState,
    pub stats: SyncStats,
}

/// One dashboard sync session.
///
/// Built once, run once. `run` consumes the session and returns the final state after teardown.
pub struct SyncSession {
    api: Arc<dyn DashboardApi>,
    strategy: Box<dyn LiveStrategy>,
    reconnect: ReconnectPolicy,
    dispatcher: EventDispatcher,
}

impl SyncSession {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        strategy: Box<dyn LiveStrategy>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            api,
            strategy,
            reconnect,
            dispatcher: EventDispatcher::new(),
        }
    }

    /// Create a session against the configured backend, using push or poll for live updates.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let api: Arc<dyn DashboardApi> = Arc::new(FinderApiClient::new(
            &config.api_url,
            config.wallet_limit,
            config.request_timeout,
        )?);

        let strategy: Box<dyn LiveStrategy> = match config.live_mode {
            LiveMode::Push => Box::new(PushStrategy::new(api.clone())),
            LiveMode::Poll => Box::new(PollStrategy::new(api.clone(), config.poll_interval)),
        };

        info!(
            "Created sync session for {} using {}",
            config.api_url,
            strategy.name()
        );
        Ok(Self::new(api, strategy, config.reconnect.clone()))
    }

    /// Register an event handler, called after each applied event.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.dispatcher.register_handler(handler);
    }

    /// Run until `shutdown` resolves, then tear down.
    ///
    /// The snapshot and the live channel start together; neither waits for the other. After
    /// teardown the reconciler is closed, the retry timer is cancelled, in-flight snapshot
    /// fetches are aborted and queued events are discarded.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> SessionReport {
        let SyncSession {
            api,
            strategy,
            reconnect,
            mut dispatcher,
        } = self;

        info!(
            "Starting dashboard sync with {} event handlers",
            dispatcher.len()
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SourcedEvent>();
        let (stop_tx, stop_rx) = watch::channel(false);

        let loader = SnapshotLoader::new(api, events_tx.clone());
        let snapshot_task = tokio::spawn(async move { loader.load().await });
        let channel_task =
            tokio::spawn(LiveUpdateChannel::new(strategy, &reconnect, events_tx).run(stop_rx));

        let mut reconciler = Reconciler::new();
        let mut tracker = SyncProgressTracker::new();

        tokio::pin!(shutdown);
        loop {
            let sourced = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = events_rx.recv() => match next {
                    Some(sourced) => sourced,
                    None => {
                        warn!("All event producers stopped");
                        break;
                    }
                },
            };

            let changed = reconciler.apply(&sourced.event);
            tracker.record(&sourced, changed);
            dispatcher.dispatch(&sourced, &reconciler.view()).await;
            tracker.log_progress(false);
        }

        // Teardown: nothing below may reach the state
        reconciler.close();
        let _ = stop_tx.send(true);
        snapshot_task.abort();
        events_rx.close();

        match channel_task.await {
            Ok(state) => debug!("Live update channel finished in state {:?}", state),
            Err(e) => warn!("Live update channel task failed: {}", e),
        }

        let mut discarded = 0;
        while events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} events queued at teardown", discarded);
        }

        tracker.log_progress(true);
        info!("Dashboard sync stopped");

        SessionReport {
            state: reconciler.into_state(),
            stats: tracker.get_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, EventStream, StatsByAsset};
    use crate::wallet::sync::channel::ConnectionState;
    use crate::wallet::sync::events::{EventOrigin, SyncEvent};
    use crate::wallet::sync::reconciler::DashboardView;
    use crate::wallet::sync::strategies::LiveStream;
    use crate::wallet::types::{Asset, StatusIndicator, WalletRecord};
    use async_trait::async_trait;
    use futures_util::{StreamExt, stream};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::time::Duration;

    fn wallet(address: &str, balance: &str) -> WalletRecord {
        serde_json::from_value(serde_json::json!({
            "address": address,
            "balance": Decimal::from_str(balance).unwrap(),
            "strategy": "random",
            "api_source": "blockstream",
            "created_at": "2024-03-01T12:00:00",
        }))
        .unwrap()
    }

    /// Snapshot endpoints with configurable latency
    struct FakeApi {
        stats_delay: Duration,
        wallets_delay: Duration,
        wallets: Vec<WalletRecord>,
        fail: bool,
    }

    #[async_trait]
    impl DashboardApi for FakeApi {
        async fn fetch_stats(&self) -> Result<StatsByAsset, ApiError> {
            tokio::time::sleep(self.stats_delay).await;
            if self.fail {
                return Err(ApiError::ServerError("down".to_string()));
            }
            Ok(crate::api::parse_stats_payload(serde_json::json!({
                "BTC": {"total_wallets": 1, "is_searching": true}
            }))
            .unwrap())
        }

        async fn fetch_wallets(&self) -> Result<Vec<WalletRecord>, ApiError> {
            tokio::time::sleep(self.wallets_delay).await;
            if self.fail {
                return Err(ApiError::ServerError("down".to_string()));
            }
            Ok(self.wallets.clone())
        }

        async fn open_stream(&self) -> Result<EventStream, ApiError> {
            Err(ApiError::StreamClosed)
        }
    }

    /// Live strategy emitting fixed events after a delay, then holding the connection open
    struct DelayedLive {
        delay: Duration,
        events: Vec<SyncEvent>,
        fail: bool,
    }

    #[async_trait]
    impl LiveStrategy for DelayedLive {
        async fn connect(&mut self) -> Result<LiveStream, ApiError> {
            let delay = self.delay;
            if self.fail {
                tokio::time::sleep(delay).await;
                return Err(ApiError::StreamClosed);
            }
            let events: Vec<Result<SyncEvent, ApiError>> =
                self.events.drain(..).map(Ok).collect();
            let delayed = stream::once(async move {
                tokio::time::sleep(delay).await;
                stream::iter(events)
            })
            .flatten();
            Ok(Box::pin(delayed.chain(stream::pending())))
        }

        fn origin(&self) -> EventOrigin {
            EventOrigin::Push
        }

        fn name(&self) -> &'static str {
            "DelayedLive"
        }
    }

    struct Recording {
        seen: Arc<Mutex<Vec<(EventOrigin, usize)>>>,
    }

    #[async_trait]
    impl SyncEventHandler for Recording {
        async fn handle<'a>(
            &mut self,
            event: &SourcedEvent,
            view: &DashboardView<'a>,
        ) -> Result<(), SyncError> {
            self.seen
                .lock()
                .unwrap()
                .push((event.origin, view.wallets().len()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Recording"
        }
    }

    fn session(api: FakeApi, live: DelayedLive) -> SyncSession {
        SyncSession::new(Arc::new(api), Box::new(live), ReconnectPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn live_update_after_snapshot_wins() {
        let session = session(
            FakeApi {
                stats_delay: Duration::from_millis(10),
                wallets_delay: Duration::from_millis(10),
                wallets: vec![wallet("addr1", "0.5")],
                fail: false,
            },
            DelayedLive {
                delay: Duration::from_millis(100),
                events: vec![SyncEvent::WalletFound(wallet("addr1", "0.7"))],
                fail: false,
            },
        );

        let report = session.run(tokio::time::sleep(Duration::from_secs(1))).await;
        let state = report.state;
        assert_eq!(state.wallets.len(), 1);
        assert_eq!(
            state.wallets.get(&Asset::Btc, "addr1").unwrap().balance,
            Decimal::from_str("0.7").unwrap()
        );
        assert_eq!(state.stats[&Asset::Btc].wallet_count, 1);
        assert!(state.stats[&Asset::Btc].is_searching);
        assert_eq!(state.status, StatusIndicator::Ok);
        assert_eq!(state.connection, ConnectionState::Connected);
        assert_eq!(report.stats.snapshot_events, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_snapshot_overrides_earlier_live_update() {
        let session = session(
            FakeApi {
                stats_delay: Duration::from_millis(10),
                wallets_delay: Duration::from_millis(500),
                wallets: vec![wallet("addr1", "0.5")],
                fail: false,
            },
            DelayedLive {
                delay: Duration::from_millis(100),
                events: vec![SyncEvent::WalletFound(wallet("addr1", "0.7"))],
                fail: false,
            },
        );

        let state = session
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .state;
        assert_eq!(state.wallets.len(), 1);
        assert_eq!(
            state.wallets.get(&Asset::Btc, "addr1").unwrap().balance,
            Decimal::from_str("0.5").unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_applies_after_teardown() {
        let session = session(
            FakeApi {
                stats_delay: Duration::from_millis(10),
                wallets_delay: Duration::from_secs(10),
                wallets: vec![wallet("addr1", "0.5")],
                fail: false,
            },
            DelayedLive {
                delay: Duration::from_secs(5),
                events: vec![SyncEvent::WalletFound(wallet("addr2", "1"))],
                fail: false,
            },
        );

        let report = session.run(tokio::time::sleep(Duration::from_secs(1))).await;
        assert!(report.state.wallets.is_empty());
        assert!(report.state.stats.contains_key(&Asset::Btc));

        // Let the aborted fetch and the dropped stream deadlines pass
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(report.state.wallets.is_empty());
        assert_eq!(report.stats.wallets_upserted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_snapshot_and_live_connect_show_reconnecting() {
        let session = session(
            FakeApi {
                stats_delay: Duration::ZERO,
                wallets_delay: Duration::ZERO,
                wallets: Vec::new(),
                fail: true,
            },
            DelayedLive {
                delay: Duration::from_millis(50),
                events: Vec::new(),
                fail: true,
            },
        );

        let report = session.run(tokio::time::sleep(Duration::from_secs(1))).await;
        assert_eq!(report.state.connection, ConnectionState::Reconnecting);
        assert_eq!(report.state.status, StatusIndicator::Reconnecting);
        assert_eq!(report.stats.snapshot_failures, 2);
        assert_eq!(report.stats.reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_see_every_applied_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = session(
            FakeApi {
                stats_delay: Duration::from_millis(10),
                wallets_delay: Duration::from_millis(20),
                wallets: vec![wallet("addr1", "0.5"), wallet("addr2", "0.1")],
                fail: false,
            },
            DelayedLive {
                delay: Duration::from_millis(100),
                events: Vec::new(),
                fail: false,
            },
        );
        session.register_handler(Box::new(Recording { seen: seen.clone() }));

        let report = session.run(tokio::time::sleep(Duration::from_secs(1))).await;
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), report.stats.events_received);
        assert!(seen.contains(&(EventOrigin::Snapshot, 2)));
        assert!(seen.iter().any(|(origin, _)| *origin == EventOrigin::Push));
    }
}
