//! Live update channel: connection lifecycle, reconnect timer and event forwarding.
//!
//! The channel drives one `LiveStrategy` (push or poll) through the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     |             |
//!                     +------+------+   connect failure, stream error or close
//!                            v
//!                       Reconnecting -> (retry delay) -> Connecting
//!
//! any state -> Closed   (teardown, terminal)
//! ```
//!
//! Only one connection and at most one pending retry exist at a time. Every state change is
//! forwarded as a `ConnectionChanged` event so the reconciler can update the status indicator.

use crate::api::ApiError;
use crate::wallet::sync::events::{SourcedEvent, SyncEvent};
use crate::wallet::sync::strategies::{LiveStrategy, LiveStream};
use crate::wallet::types::SyncError;

use backoff::ExponentialBackoff;
use backoff::backoff::{Backoff, Constant};
use futures_util::StreamExt;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	Reconnecting,
	Closed,
}

impl ConnectionState {
	pub fn can_transition_to(self, next: ConnectionState) -> bool {
		use ConnectionState::*;
		match (self, next) {
			(Closed, _) => false,
			(_, Closed) => true,
			(Disconnected, Connecting)
			| (Connecting, Connected)
			| (Connecting, Reconnecting)
			| (Connected, Reconnecting)
			| (Reconnecting, Connecting) => true,
			_ => false,
		}
	}
}

/// How long to wait before reconnecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
	/// Same delay before every attempt
	Fixed(Duration),
	/// Delay grows from `initial` up to `max` without jitter, reset after a successful connect
	Exponential { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		ReconnectPolicy::Fixed(Duration::from_millis(5000))
	}
}

impl ReconnectPolicy {
	fn build(&self) -> Box<dyn Backoff + Send> {
		match self {
			ReconnectPolicy::Fixed(delay) => Box::new(Constant::new(*delay)),
			ReconnectPolicy::Exponential { initial, max } => Box::new(ExponentialBackoff {
				initial_interval: *initial,
				current_interval: *initial,
				randomization_factor: 0.0,
				max_interval: *max,
				max_elapsed_time: None,
				..ExponentialBackoff::default()
			}),
		}
	}

	/// Delay used if the backoff ever gives up
	fn ceiling(&self) -> Duration {
		match self {
			ReconnectPolicy::Fixed(delay) => *delay,
			ReconnectPolicy::Exponential { max, .. } => *max,
		}
	}
}

/// The single pending reconnect deadline. Arming replaces whatever was pending.
#[derive(Debug, Default)]
pub struct RetryTimer {
	deadline: Option<Pin<Box<Sleep>>>,
}

impl RetryTimer {
	pub fn arm(&mut self, delay: Duration) {
		self.deadline = Some(Box::pin(tokio::time::sleep(delay)));
	}

	pub fn cancel(&mut self) {
		self.deadline = None;
	}

	pub fn is_pending(&self) -> bool {
		self.deadline.is_some()
	}

	/// Resolves when the armed deadline passes; never resolves while disarmed.
	pub async fn fired(&mut self) {
		match self.deadline.as_mut() {
			Some(sleep) => sleep.as_mut().await,
			None => std::future::pending::<()>().await,
		}
		self.deadline = None;
	}
}

enum PumpEnd {
	Shutdown,
	Failed(ApiError),
}

/// Resolves once teardown is requested, or the session that owns the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct LiveUpdateChannel {
	strategy: Box<dyn LiveStrategy>,
	state: ConnectionState,
	retry: RetryTimer,
	backoff: Box<dyn Backoff + Send>,
	ceiling: Duration,
	events: mpsc::UnboundedSender<SourcedEvent>,
}

impl LiveUpdateChannel {
	pub fn new(
		strategy: Box<dyn LiveStrategy>,
		policy: &ReconnectPolicy,
		events: mpsc::UnboundedSender<SourcedEvent>,
	) -> Self {
		Self {
			strategy,
			state: ConnectionState::Disconnected,
			retry: RetryTimer::default(),
			backoff: policy.build(),
			ceiling: policy.ceiling(),
			events,
		}
	}

	/// Run until teardown is requested. Returns the final state, always `Closed`.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConnectionState {
		info!("Starting live updates using {}", self.strategy.name());

		if let Err(e) = self.run_until_shutdown(&mut shutdown).await {
			error!("Live update channel stopped: {}", e);
		}
		self.close();
		self.state
	}

	async fn run_until_shutdown(
		&mut self,
		shutdown: &mut watch::Receiver<bool>,
	) -> Result<(), SyncError> {
		loop {
			self.transition(ConnectionState::Connecting)?;

			let connected = tokio::select! {
				biased;
				_ = shutdown_requested(shutdown) => return Ok(()),
				result = self.strategy.connect() => result,
			};

			match connected {
				Ok(stream) => {
					self.transition(ConnectionState::Connected)?;
					self.backoff.reset();
					info!("Live updates connected via {}", self.strategy.name());

					match self.pump(stream, shutdown).await {
						PumpEnd::Shutdown => return Ok(()),
						PumpEnd::Failed(e) => error!("Live update connection lost: {}", e),
					}
				}
				Err(e) => error!("Failed to connect live updates: {}", e),
			}

			self.transition(ConnectionState::Reconnecting)?;
			let delay = self
				.backoff
				.next_backoff()
				.unwrap_or(self.ceiling)
				.min(self.ceiling);
			self.retry.arm(delay);
			info!("Reconnecting in {}ms", delay.as_millis());

			tokio::select! {
				biased;
				_ = shutdown_requested(shutdown) => return Ok(()),
				_ = self.retry.fired() => {}
			}
		}
	}

	/// Forward events until the stream fails, ends, or teardown is requested.
	async fn pump(&mut self, mut stream: LiveStream, shutdown: &mut watch::Receiver<bool>) -> PumpEnd {
		loop {
			let item = tokio::select! {
				biased;
				_ = shutdown_requested(shutdown) => return PumpEnd::Shutdown,
				item = stream.next() => item,
			};

			match item {
				Some(Ok(event)) => {
					let event = SourcedEvent::new(self.strategy.origin(), event);
					if self.events.send(event).is_err() {
						debug!("Event receiver dropped, stopping live updates");
						return PumpEnd::Shutdown;
					}
				}
				Some(Err(e)) if e.is_malformed_payload() => {
					warn!("Dropping malformed live payload: {}", e);
				}
				Some(Err(e)) => return PumpEnd::Failed(e),
				None => return PumpEnd::Failed(ApiError::StreamClosed),
			}
		}
	}

	fn transition(&mut self, next: ConnectionState) -> Result<(), SyncError> {
		if !self.state.can_transition_to(next) {
			return Err(SyncError::IllegalTransition {
				from: self.state,
				to: next,
			});
		}
		debug!("Connection state {:?} -> {:?}", self.state, next);
		self.state = next;
		// Nobody left to tell once the session has dropped the receiver
		let _ = self.events.send(SourcedEvent::new(
			self.strategy.origin(),
			SyncEvent::ConnectionChanged(next),
		));
		Ok(())
	}

	/// Cancel the retry timer and move to `Closed`. Idempotent.
	pub fn close(&mut self) {
		if self.retry.is_pending() {
			debug!("Cancelling pending reconnect");
		}
		self.retry.cancel();
		if self.state != ConnectionState::Closed {
			// Closed is reachable from every other state
			let _ = self.transition(ConnectionState::Closed);
		}
	}
}
