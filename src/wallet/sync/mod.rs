//! Dashboard Synchronization Module
//!
//! This module keeps a local view of the wallet finder backend consistent while two producers race
//! to fill it: a one-shot snapshot of the REST endpoints and a live update channel.
//!
//! - `orchestrator`: The session that starts both producers, applies their events and tears down.
//! - `events`: Event types, origins and the handler trait presenters implement.
//! - `snapshot`: Concurrent initial fetch of stats and wallets.
//! - `channel`: Connection state machine, reconnect timer and reconnect policies.
//! - `strategies`: Push (event stream) and poll (periodic re-fetch) delivery of live updates.
//! - `reconciler`: The single merge policy and the state it owns.
//! - `progress_tracker`: Counts applied events for progress logging.
//!
//! Producers never touch state. They send `SourcedEvent`s over one channel and the session applies
//! them one at a time, so the outcome depends only on arrival order.

/// Connection lifecycle and reconnect scheduling
pub mod channel;
/// Event system for decoupled communication during sync
pub mod events;
/// Main coordinator for the dashboard sync session
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Merge policy for snapshot and live events
pub mod reconciler;
/// Initial data load
pub mod snapshot;
/// Pluggable live update strategies
pub mod strategies;

pub use orchestrator::*;
