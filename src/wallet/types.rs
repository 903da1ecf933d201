use crate::api::ApiError;
use crate::wallet::sync::channel::ConnectionState;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Cryptocurrency code scoping wallet records and stats aggregates.
///
/// Codes the finder backend is known to emit get their own variant; anything else is kept
/// verbatim (uppercased) so a new finder never causes payloads to be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Asset {
	#[default]
	Btc,
	Eth,
	Doge,
	Other(String),
}

impl Asset {
	pub fn code(&self) -> &str {
		match self {
			Asset::Btc => "BTC",
			Asset::Eth => "ETH",
			Asset::Doge => "DOGE",
			Asset::Other(code) => code,
		}
	}
}

impl From<String> for Asset {
	fn from(code: String) -> Self {
		Asset::from(code.as_str())
	}
}

impl From<&str> for Asset {
	fn from(code: &str) -> Self {
		let code = code.trim().to_ascii_uppercase();
		match code.as_str() {
			"BTC" => Asset::Btc,
			"ETH" => Asset::Eth,
			"DOGE" => Asset::Doge,
			_ => Asset::Other(code),
		}
	}
}

impl From<Asset> for String {
	fn from(asset: Asset) -> Self {
		asset.code().to_string()
	}
}

impl fmt::Display for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.code())
	}
}

/// Identity of a wallet record: unique per asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalletKey {
	pub asset: Asset,
	pub address: String,
}

/// A wallet reported by the finder backend.
///
/// Field names follow the backend's JSON (`coin_type`, `api_source`, `created_at`), the Rust
/// names follow what the fields mean to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
	/// Defaults to BTC when the producer omits it.
	#[serde(rename = "coin_type", default, deserialize_with = "asset_or_default")]
	pub asset: Asset,
	#[serde(deserialize_with = "non_empty")]
	pub address: String,
	#[serde(deserialize_with = "non_negative")]
	pub balance: Decimal,
	/// How the wallet was found (opaque tag).
	#[serde(default)]
	pub strategy: String,
	/// Which external provider reported the balance (opaque tag).
	#[serde(rename = "api_source", default)]
	pub source: String,
	/// Receipt time is used when the producer omits `created_at`.
	#[serde(
		rename = "created_at",
		default = "Utc::now",
		deserialize_with = "timestamp::deserialize"
	)]
	pub discovered_at: DateTime<Utc>,
	#[serde(default, deserialize_with = "timestamp::deserialize_opt")]
	pub updated_at: Option<DateTime<Utc>>,
}

impl WalletRecord {
	pub fn key(&self) -> WalletKey {
		WalletKey {
			asset: self.asset.clone(),
			address: self.address.clone(),
		}
	}
}

pub(crate) fn asset_or_default<'de, D>(deserializer: D) -> Result<Asset, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Option::<Asset>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	let value = String::deserialize(deserializer)?;
	if value.trim().is_empty() {
		return Err(serde::de::Error::custom("wallet address is empty"));
	}
	Ok(value)
}

fn non_negative<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
	D: Deserializer<'de>,
{
	let value = <Decimal as Deserialize>::deserialize(deserializer)?;
	if value.is_sign_negative() && !value.is_zero() {
		return Err(serde::de::Error::custom(format!(
			"wallet balance is negative: {}",
			value
		)));
	}
	Ok(value)
}

/// Timestamps from the backend are either RFC 3339 or naive ISO 8601 (assumed UTC).
pub(crate) mod timestamp {
	use super::*;

	pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
		if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
			return Some(parsed.with_timezone(&Utc));
		}
		["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
			.iter()
			.find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
			.map(|naive| naive.and_utc())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		parse(&raw)
			.ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
	}

	pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Option::<String>::deserialize(deserializer)? {
			Some(raw) => parse(&raw)
				.map(Some)
				.ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
			None => Ok(None),
		}
	}
}

/// Transient, user-visible connectivity indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusIndicator {
	#[default]
	Ok,
	InitialLoadFailed,
	Reconnecting,
}

impl StatusIndicator {
	/// The message to show, or `None` when there is nothing to report.
	pub fn message(&self) -> Option<&'static str> {
		match self {
			StatusIndicator::Ok => None,
			StatusIndicator::InitialLoadFailed => Some("Failed to load initial data"),
			StatusIndicator::Reconnecting => Some("Lost connection to server. Reconnecting..."),
		}
	}
}

/// Error types for the sync session
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("API error: {0}")]
	ApiError(#[from] ApiError),

	#[error("Illegal connection transition from {from:?} to {to:?}")]
	IllegalTransition {
		from: ConnectionState,
		to: ConnectionState,
	},
}
