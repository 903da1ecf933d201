//! Event system for dashboard synchronization.
//!
//! Every producer (the snapshot loader, the push stream, the poll loop, and the live channel's
//! own state machine) emits `SourcedEvent`s onto one ordered channel. The session applies each
//! event through the reconciler and then hands it, together with a read-only view of the
//! result, to every registered `SyncEventHandler`.

use crate::api::{StatsByAsset, StreamEvent};
use crate::wallet::sync::channel::ConnectionState;
use crate::wallet::sync::reconciler::DashboardView;
use crate::wallet::types::{Asset, SyncError, WalletRecord};

/// Which producer an event came from. The merge policy ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOrigin {
    Snapshot,
    Push,
    Poll,
}

/// Which half of the snapshot a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPart {
    Stats,
    Wallets,
}

/// Events that change, or report on, dashboard state
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A single wallet was discovered or updated
    WalletFound(WalletRecord),
    /// A full wallet list, most recent first
    WalletList(Vec<WalletRecord>),
    /// Partial stats for one or more assets
    StatsUpdate(StatsByAsset),
    /// Only the searching flag of one asset changed
    SearchStatus { asset: Asset, is_searching: bool },
    /// One of the snapshot fetches failed
    SnapshotFailed { part: SnapshotPart, error: String },
    /// The live channel moved to a new connection state
    ConnectionChanged(ConnectionState),
}

impl From<StreamEvent> for SyncEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::WalletFound(wallet) => SyncEvent::WalletFound(wallet),
            StreamEvent::StatsUpdate(stats) => SyncEvent::StatsUpdate(stats),
            StreamEvent::SearchStatus {
                asset,
                is_searching,
            } => SyncEvent::SearchStatus {
                asset,
                is_searching,
            },
        }
    }
}

/// An event tagged with its producer
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    pub origin: EventOrigin,
    pub event: SyncEvent,
}

impl SourcedEvent {
    pub fn new(origin: EventOrigin, event: SyncEvent) -> Self {
        Self { origin, event }
    }
}

/// Trait for observing applied events.
///
/// Implementors are the presenter boundary: they get the event and a read-only view of the state
/// it produced, and must not assume anything about the order of snapshot and live events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle an event after the reconciler has applied it.
    async fn handle<'a>(
        &mut self,
        event: &SourcedEvent,
        view: &DashboardView<'a>,
    ) -> Result<(), SyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order; a failing handler never stops the others.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch an event to all registered handlers.
    pub async fn dispatch(&mut self, event: &SourcedEvent, view: &DashboardView<'_>) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event, view).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}
