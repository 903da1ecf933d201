use crate::api::{ApiError, DashboardApi, EventStream};
use crate::wallet::sync::events::{EventOrigin, SyncEvent};
use crate::wallet::sync::snapshot::{fetch_stats_event, fetch_wallets_event};

use futures_util::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Events from one live connection. The connection is over when the stream ends or yields a
/// non-payload error.
pub type LiveStream = Pin<Box<dyn Stream<Item = Result<SyncEvent, ApiError>> + Send>>;

/// Trait for the ways live updates can be delivered
#[async_trait::async_trait]
pub trait LiveStrategy: Send + Sync {
	/// Open one connection
	async fn connect(&mut self) -> Result<LiveStream, ApiError>;

	/// Origin tag for the events this strategy produces
	fn origin(&self) -> EventOrigin;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Persistent Server-Sent Events subscription
pub struct PushStrategy {
	api: Arc<dyn DashboardApi>,
}

impl PushStrategy {
	pub fn new(api: Arc<dyn DashboardApi>) -> Self {
		Self { api }
	}
}

#[async_trait::async_trait]
impl LiveStrategy for PushStrategy {
	async fn connect(&mut self) -> Result<LiveStream, ApiError> {
		let events: EventStream = self.api.open_stream().await?;
		info!("Subscribed to backend event stream");
		Ok(Box::pin(events.map(|event| event.map(SyncEvent::from))))
	}

	fn origin(&self) -> EventOrigin {
		EventOrigin::Push
	}

	fn name(&self) -> &'static str {
		"PushStrategy"
	}
}

/// Fixed-interval re-fetch of the snapshot endpoints
pub struct PollStrategy {
	api: Arc<dyn DashboardApi>,
	interval: Duration,
}

impl PollStrategy {
	pub fn new(api: Arc<dyn DashboardApi>, interval: Duration) -> Self {
		Self { api, interval }
	}
}

/// One poll cycle: successes first, so a half-failed cycle still applies what it got before the
/// error ends the connection.
async fn poll_once(api: &dyn DashboardApi) -> Vec<Result<SyncEvent, ApiError>> {
	let (stats, wallets) = tokio::join!(fetch_stats_event(api), fetch_wallets_event(api));
	let mut results = vec![stats, wallets];
	results.sort_by_key(|result| result.is_err());
	results
}

#[async_trait::async_trait]
impl LiveStrategy for PollStrategy {
	/// Connecting runs the first poll cycle; it fails only if both fetches fail.
	async fn connect(&mut self) -> Result<LiveStream, ApiError> {
		let mut first = poll_once(self.api.as_ref()).await;
		if first.iter().all(Result::is_err) {
			if let Some(Err(e)) = first.pop() {
				return Err(e);
			}
		}

		let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let later = stream::unfold((self.api.clone(), ticker), |(api, mut ticker)| async move {
			ticker.tick().await;
			debug!("Polling backend");
			let results = poll_once(api.as_ref()).await;
			Some((stream::iter(results), (api, ticker)))
		})
		.flatten();

		Ok(Box::pin(stream::iter(first).chain(later)))
	}

	fn origin(&self) -> EventOrigin {
		EventOrigin::Poll
	}

	fn name(&self) -> &'static str {
		"PollStrategy"
	}
}
