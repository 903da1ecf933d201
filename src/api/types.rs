//! Wire types for the finder backend's REST endpoints and event stream

use crate::wallet::types::{Asset, WalletRecord, asset_or_default};
use crate::wallet::stats::StatsPatch;

use serde::Deserialize;
use serde::de::Error as _;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Stats keyed by asset, as carried by `/api/stats` and `stats_update`.
pub type StatsByAsset = BTreeMap<Asset, StatsPatch>;

/// Keys that mark a stats object as flat (one asset, named by `coin_type`) rather than keyed.
const FLAT_STATS_FIELDS: [&str; 6] = [
    "coin_type",
    "total_wallets",
    "total_balance",
    "max_balance",
    "min_balance",
    "is_searching",
];

/// Accepted shapes of the `/api/wallets` response.
///
/// Wallets are kept as raw JSON until normalization so a single malformed record does not
/// discard the whole list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WalletListResponse {
    /// A bare JSON array of wallets
    List(Vec<Value>),
    /// `{ "wallets": [...] }`
    Bare { wallets: Vec<Value> },
    /// `{ "success": bool, "data": { "wallets": [...] } }`
    Envelope {
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        data: Option<WalletListData>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct WalletListData {
    #[serde(default)]
    pub wallets: Vec<Value>,
}

impl WalletListResponse {
    /// Normalize every accepted shape to a list of records, in the order the server sent them.
    pub fn into_records(self) -> Result<Vec<WalletRecord>, ApiError> {
        let raw = match self {
            WalletListResponse::List(wallets) => wallets,
            WalletListResponse::Bare { wallets } => wallets,
            WalletListResponse::Envelope {
                success: Some(false),
                error,
                ..
            } => {
                return Err(ApiError::ServerError(
                    error.unwrap_or_else(|| "wallet list request failed".to_string()),
                ));
            }
            WalletListResponse::Envelope {
                data: Some(data), ..
            } => data.wallets,
            WalletListResponse::Envelope { data: None, .. } => return Err(ApiError::NoData),
        };

        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<WalletRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Dropping malformed wallet in list: {}", e);
                    None
                }
            })
            .collect())
    }
}

/// `/api/stats` response envelope
#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatsResponse {
    pub fn into_stats(self) -> Result<StatsByAsset, ApiError> {
        if self.success == Some(false) {
            return Err(ApiError::ServerError(
                self.error
                    .unwrap_or_else(|| "stats request failed".to_string()),
            ));
        }
        let data = self.data.ok_or(ApiError::NoData)?;
        Ok(parse_stats_payload(data)?)
    }
}

/// Parse a stats object that is either keyed by asset or flat with a `coin_type` field.
///
/// The backend's own `stats_update` events are flat; `/api/stats` is keyed.
pub fn parse_stats_payload(value: Value) -> Result<StatsByAsset, serde_json::Error> {
    let Value::Object(map) = value else {
        return Err(serde_json::Error::custom("stats payload is not an object"));
    };

    if FLAT_STATS_FIELDS.iter().any(|field| map.contains_key(*field)) {
        let asset = match map.get("coin_type") {
            Some(Value::String(code)) => Asset::from(code.as_str()),
            _ => Asset::default(),
        };
        let patch = serde_json::from_value::<StatsPatch>(Value::Object(map))?;
        return Ok(BTreeMap::from([(asset, patch)]));
    }

    let mut by_asset = StatsByAsset::new();
    for (code, stats) in map {
        by_asset.insert(Asset::from(code), serde_json::from_value(stats)?);
    }
    Ok(by_asset)
}

#[derive(Debug, Deserialize)]
struct SearchStatusPayload {
    is_searching: bool,
    #[serde(
        rename = "coin_type",
        alias = "asset",
        default,
        deserialize_with = "asset_or_default"
    )]
    asset: Asset,
}

/// Frame body used by the backend when it does not name the SSE event itself.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A typed event from the push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    WalletFound(WalletRecord),
    StatsUpdate(StatsByAsset),
    SearchStatus { asset: Asset, is_searching: bool },
}

impl StreamEvent {
    pub const WALLET_FOUND: &'static str = "wallet_found";
    pub const STATS_UPDATE: &'static str = "stats_update";
    pub const SEARCH_STATUS: &'static str = "search_status";

    /// Decode a named event. Unknown names yield `Ok(None)`.
    pub fn from_named(name: &str, data: Value) -> Result<Option<Self>, ApiError> {
        let malformed = |source| ApiError::MalformedEvent {
            event: name.to_string(),
            source,
        };
        let event = match name {
            Self::WALLET_FOUND => {
                StreamEvent::WalletFound(serde_json::from_value(data).map_err(malformed)?)
            }
            Self::STATS_UPDATE => {
                StreamEvent::StatsUpdate(parse_stats_payload(data).map_err(malformed)?)
            }
            Self::SEARCH_STATUS => {
                let status: SearchStatusPayload =
                    serde_json::from_value(data).map_err(malformed)?;
                StreamEvent::SearchStatus {
                    asset: status.asset,
                    is_searching: status.is_searching,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Decode the text of an SSE frame. Frames without an event name carry an
    /// `{ "event", "data" }` envelope instead.
    pub fn from_frame(event: Option<&str>, data: &str) -> Result<Option<Self>, ApiError> {
        let name = event.unwrap_or("message");
        let value: Value = serde_json::from_str(data).map_err(|source| ApiError::MalformedEvent {
            event: name.to_string(),
            source,
        })?;

        if name != "message" {
            return Self::from_named(name, value);
        }
        let envelope: EventEnvelope =
            serde_json::from_value(value).map_err(|source| ApiError::MalformedEvent {
                event: name.to_string(),
                source,
            })?;
        Self::from_named(&envelope.event, envelope.data)
    }
}

/// Error types for calls against the finder backend
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{url} returned status {status}")]
    StatusError {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Server reported failure: {0}")]
    ServerError(String),

    #[error("Malformed {event} payload: {source}")]
    MalformedEvent {
        event: String,
        source: serde_json::Error,
    },

    #[error("No data returned")]
    NoData,

    #[error("Event stream closed by server")]
    StreamClosed,

    #[error("Event stream line of {length} bytes exceeds the {limit} byte limit")]
    LineTooLong { length: usize, limit: usize },
}

impl ApiError {
    /// Payload errors only affect the offending message; the connection stays usable.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(self, ApiError::MalformedEvent { .. })
    }
}
