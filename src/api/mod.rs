//! Integration with the wallet finder backend
//!
//! This module provides the client and wire types for the backend's REST endpoints and its
//! Server-Sent Events stream. Nothing here touches dashboard state; payloads are decoded into
//! typed values and handed to the sync layer.

/// HTTP client and the `DashboardApi` seam
mod client;
/// Incremental `text/event-stream` decoder
mod sse;
/// Wire types and errors
mod types;

pub use client::{DashboardApi, EventStream, FinderApiClient, MAX_WALLET_LIMIT};
pub use types::*;
