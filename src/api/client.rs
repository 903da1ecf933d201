//!
//! HTTP client for the wallet finder backend.
//!
//! This module provides an async client for the backend's REST endpoints (`/api/stats`,
//! `/api/wallets`) and its Server-Sent Events stream (`/api/stream`). The `DashboardApi` trait
//! is the seam the sync layer talks to, so sources can be swapped for fakes in tests.

use super::sse::SseDecoder;
use super::types::*;
use crate::wallet::types::WalletRecord;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Live events decoded from the push stream. The stream ends when the server closes it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// Largest page the backend will return from `/api/wallets`
pub const MAX_WALLET_LIMIT: u32 = 50;

/// Everything the sync layer needs from the backend
#[async_trait]
pub trait DashboardApi: Send + Sync {
	/// Fetch the latest stats for every asset.
	async fn fetch_stats(&self) -> Result<StatsByAsset, ApiError>;

	/// Fetch the most recent wallets, most recent first.
	async fn fetch_wallets(&self) -> Result<Vec<WalletRecord>, ApiError>;

	/// Open the push stream.
	async fn open_stream(&self) -> Result<EventStream, ApiError>;
}

/// Wallet finder REST/SSE client
#[derive(Clone)]
pub struct FinderApiClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL shared by the REST endpoints and the stream, without trailing slash.
	base_url: String,
	/// Page size requested from `/api/wallets`.
	wallet_limit: u32,
	/// Timeout for REST requests. The stream itself has no overall timeout.
	request_timeout: Duration,
}

impl FinderApiClient {
	/// Create a new client.
	///
	/// # Arguments
	/// * `base_url` - The backend origin, e.g. `http://localhost:8888`.
	/// * `wallet_limit` - Wallets requested per snapshot, clamped to `1..=50`.
	/// * `request_timeout` - Timeout applied to each REST request.
	pub fn new(
		base_url: &str,
		wallet_limit: u32,
		request_timeout: Duration,
	) -> Result<Self, ApiError> {
		let http_client = Client::builder()
			.connect_timeout(Duration::from_secs(10))
			.build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			wallet_limit: wallet_limit.clamp(1, MAX_WALLET_LIMIT),
			request_timeout,
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
		let response = self
			.http_client
			.get(url)
			.timeout(self.request_timeout)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ApiError::StatusError {
				url: url.to_string(),
				status: response.status(),
			});
		}

		Ok(response.json().await?)
	}
}

#[async_trait]
impl DashboardApi for FinderApiClient {
	async fn fetch_stats(&self) -> Result<StatsByAsset, ApiError> {
		let url = self.endpoint("/api/stats");
		let response: StatsResponse = self.get_json(&url).await?;
		response.into_stats()
	}

	async fn fetch_wallets(&self) -> Result<Vec<WalletRecord>, ApiError> {
		let url = format!("{}?limit={}", self.endpoint("/api/wallets"), self.wallet_limit);
		let response: WalletListResponse = self.get_json(&url).await?;
		response.into_records()
	}

	async fn open_stream(&self) -> Result<EventStream, ApiError> {
		let url = self.endpoint("/api/stream");
		debug!("Opening event stream at {}", url);

		let response = self
			.http_client
			.get(&url)
			.header(ACCEPT, "text/event-stream")
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ApiError::StatusError {
				url,
				status: response.status(),
			});
		}

		let mut decoder = SseDecoder::new();
		let frames = response
			.bytes_stream()
			.map(move |chunk| match chunk {
				Ok(bytes) => match decoder.feed(&bytes) {
					Ok(frames) => frames.into_iter().map(Ok).collect::<Vec<_>>(),
					Err(e) => vec![Err(e)],
				},
				Err(e) => vec![Err(ApiError::HttpError(e))],
			})
			.flat_map(stream::iter);

		let events = frames.filter_map(|frame| async move {
			match frame {
				Ok(frame) => match StreamEvent::from_frame(frame.event.as_deref(), &frame.data) {
					Ok(Some(event)) => Some(Ok(event)),
					Ok(None) => {
						debug!("Ignoring unknown stream event: {:?}", frame.event);
						None
					}
					Err(e) => Some(Err(e)),
				},
				Err(e) => Some(Err(e)),
			}
		});

		Ok(Box::pin(events))
	}
}
