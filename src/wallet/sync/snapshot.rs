//! One-shot snapshot of stats and wallets at session start.
//!
//! Both fetches run concurrently and each result is forwarded the moment it arrives, so a slow
//! or failing wallet list never holds back the stats (or the other way round). Failures become
//! `SnapshotFailed` events; nothing escapes this boundary as an error.

use crate::api::{ApiError, DashboardApi};
use crate::wallet::sync::events::{EventOrigin, SnapshotPart, SourcedEvent, SyncEvent};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Which halves of the snapshot made it through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOutcome {
	pub stats_loaded: bool,
	pub wallets_loaded: bool,
}

pub(crate) async fn fetch_stats_event(api: &dyn DashboardApi) -> Result<SyncEvent, ApiError> {
	api.fetch_stats().await.map(SyncEvent::StatsUpdate)
}

pub(crate) async fn fetch_wallets_event(api: &dyn DashboardApi) -> Result<SyncEvent, ApiError> {
	api.fetch_wallets().await.map(SyncEvent::WalletList)
}

pub struct SnapshotLoader {
	api: Arc<dyn DashboardApi>,
	events: mpsc::UnboundedSender<SourcedEvent>,
}

impl SnapshotLoader {
	pub fn new(api: Arc<dyn DashboardApi>, events: mpsc::UnboundedSender<SourcedEvent>) -> Self {
		Self { api, events }
	}

	/// Fetch stats and wallets concurrently, forwarding each result as soon as it completes.
	pub async fn load(&self) -> SnapshotOutcome {
		info!("Loading initial snapshot");

		let stats = async {
			let result = fetch_stats_event(self.api.as_ref()).await;
			self.forward(SnapshotPart::Stats, result)
		};
		let wallets = async {
			let result = fetch_wallets_event(self.api.as_ref()).await;
			self.forward(SnapshotPart::Wallets, result)
		};
		let (stats_loaded, wallets_loaded) = tokio::join!(stats, wallets);

		let outcome = SnapshotOutcome {
			stats_loaded,
			wallets_loaded,
		};
		info!("Initial snapshot finished: {:?}", outcome);
		outcome
	}

	fn forward(&self, part: SnapshotPart, result: Result<SyncEvent, ApiError>) -> bool {
		let (event, loaded) = match result {
			Ok(event) => (event, true),
			Err(e) => {
				warn!("Failed to load initial {:?}: {}", part, e);
				let event = SyncEvent::SnapshotFailed {
					part,
					error: e.to_string(),
				};
				(event, false)
			}
		};
		// A closed receiver means the session was torn down while we were fetching
		let _ = self
			.events
			.send(SourcedEvent::new(EventOrigin::Snapshot, event));
		loaded
	}
}
