//! Core types for the activity feed.

use crate::error::{FeedError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of a persisted activity, assigned by the store.
///
/// Doubles as the cursor type: pagination asks for ids strictly older than a
/// cursor, catch-up asks for ids strictly newer than one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub u64);

impl ActivityId {
    pub fn next(self) -> Self {
        ActivityId(self.0 + 1)
    }
}

impl fmt::Debug for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivityId({})", self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActivityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ActivityId)
    }
}

/// The closed set of activity kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MarketplacePost,
    TokenTransfer,
    WalletCreated,
    GameStarted,
    BetPlaced,
    OtcPurchase,
    MerchOrder,
    PokemonPurchase,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::MarketplacePost,
        ActivityKind::TokenTransfer,
        ActivityKind::WalletCreated,
        ActivityKind::GameStarted,
        ActivityKind::BetPlaced,
        ActivityKind::OtcPurchase,
        ActivityKind::MerchOrder,
        ActivityKind::PokemonPurchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::MarketplacePost => "marketplace_post",
            ActivityKind::TokenTransfer => "token_transfer",
            ActivityKind::WalletCreated => "wallet_created",
            ActivityKind::GameStarted => "game_started",
            ActivityKind::BetPlaced => "bet_placed",
            ActivityKind::OtcPurchase => "otc_purchase",
            ActivityKind::MerchOrder => "merch_order",
            ActivityKind::PokemonPurchase => "pokemon_purchase",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ActivityKind::ALL.iter().map(|k| k.as_str()).collect();
                FeedError::Validation(format!(
                    "Invalid kind. Must be one of: {}",
                    valid.join(", ")
                ))
            })
    }
}

/// A persisted activity. Immutable once the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub correlation_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub is_public: bool,
    #[serde(with = "rfc3339_millis")]
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Build the record for `input` once the store has picked its id.
    pub fn from_input(id: ActivityId, input: ActivityInput, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: input.kind,
            correlation_id: input.correlation_id,
            payload: input.payload,
            is_public: input.is_public,
            created_at,
        }
    }
}

/// Current time truncated to millisecond precision, the resolution the
/// wire format carries.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// A validated submission, before the store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityInput {
    pub kind: ActivityKind,
    pub correlation_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub is_public: bool,
}

impl ActivityInput {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            correlation_id: None,
            payload: None,
            is_public: false,
        }
    }

    /// Attach a correlation id. Empty strings count as absent.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.correlation_id = if id.is_empty() { None } else { Some(id) };
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }
}

/// An unvalidated submission as it arrives from a client.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivity {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl TryFrom<CreateActivity> for ActivityInput {
    type Error = FeedError;

    fn try_from(raw: CreateActivity) -> Result<Self> {
        let kind = match raw.kind.as_deref() {
            None | Some("") => return Err(FeedError::Validation("kind is required".into())),
            Some(kind) => kind.parse::<ActivityKind>()?,
        };

        let payload = match raw.payload {
            None | Some(serde_json::Value::Null) => None,
            Some(value @ serde_json::Value::Object(_)) => Some(value),
            Some(_) => {
                return Err(FeedError::Validation(
                    "payload must be a JSON object".into(),
                ))
            }
        };

        let mut input = ActivityInput::new(kind).public(raw.is_public.unwrap_or(false));
        input.payload = payload;
        if let Some(id) = raw.correlation_id {
            input = input.with_correlation_id(id);
        }
        Ok(input)
    }
}

mod rfc3339_millis {
    use super::*;

    pub fn serialize<S: Serializer>(
        ts: &DateTime<Utc>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
