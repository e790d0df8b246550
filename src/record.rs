//! Result types handed to consumers: [`ServiceRecord`] on success,
//! [`ErrorRecord`] on failure.
//!
//! Both are plain data. A `ServiceRecord` is only built by
//! [`crate::pipeline::normalize::ResponseNormalizer`], which guarantees that
//! every schema key is present; there are no mutating accessors, so that
//! guarantee holds for the record's whole lifetime.

use crate::schema::ServiceSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ── ErrorRecord ──────────────────────────────────────────────────────────────

/// Why an extraction produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The upstream call failed for a reason other than rate limiting.
    ModelCallFailed,
    /// The upstream rate or usage limit was hit.
    QuotaExceeded,
    /// The reply could not be interpreted as the expected structure.
    InvalidJson,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ModelCallFailed => "model_call_failed",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::InvalidJson => "invalid_json",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed extraction, returned as data rather than raised.
///
/// `raw` carries the cleaned reply text for [`ErrorKind::InvalidJson`] so
/// callers can show what the model actually said; it is `None` for the
/// call-failure kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ErrorRecord {
    pub fn invalid_json(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidJson,
            detail: non_empty(detail.into(), "reply is not the expected JSON"),
            raw: Some(raw.into()),
        }
    }

    pub fn quota_exceeded(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::QuotaExceeded,
            detail: non_empty(detail.into(), "upstream quota exceeded"),
            raw: None,
        }
    }

    pub fn model_call_failed(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ModelCallFailed,
            detail: non_empty(detail.into(), "model call failed"),
            raw: None,
        }
    }
}

fn non_empty(detail: String, fallback: &str) -> String {
    if detail.trim().is_empty() {
        fallback.to_string()
    } else {
        detail
    }
}

// ── ServiceRecord ────────────────────────────────────────────────────────────

/// Adult and child price of one passenger tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    pub adults: Option<f64>,
    pub children: Option<f64>,
}

/// One extracted airport service.
///
/// Serialises transparently as the underlying JSON object: schema keys in
/// schema order, then any extra keys the model emitted, in its order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceRecord(Map<String, Value>);

impl ServiceRecord {
    pub(crate) fn from_completed(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`; `None` when null, absent, or not a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Numeric value of `key`. Accepts JSON numbers and numeric strings
    /// such as `"90"`, which models emit regularly.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(as_number)
    }

    pub fn service_name(&self) -> Option<&str> {
        self.text("service_name")
    }

    pub fn airport(&self) -> Option<&str> {
        self.text("airport")
    }

    pub fn travel_type(&self) -> Option<&str> {
        self.text("travel_type")
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        self.number("duration_minutes")
    }

    /// Bullet points in document order; empty when the field is null.
    pub fn service_details(&self) -> Vec<&str> {
        self.0
            .get("service_details")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Price of `tier` under the canonical `pricing` field.
    pub fn tier_price(&self, tier: &str) -> Option<TierPrice> {
        self.tier_price_in("pricing", tier)
    }

    /// Price of `tier` under an arbitrary pricing field.
    pub fn tier_price_in(&self, pricing_field: &str, tier: &str) -> Option<TierPrice> {
        let tier = self.0.get(pricing_field)?.get(tier)?.as_object()?;
        Some(TierPrice {
            adults: tier.get("adults").and_then(as_number),
            children: tier.get("children").and_then(as_number),
        })
    }

    /// All tiers of the canonical `pricing` field, in tier order.
    pub fn pricing(&self) -> Vec<(&str, TierPrice)> {
        let Some(table) = self.0.get("pricing").and_then(Value::as_object) else {
            return Vec::new();
        };
        table
            .iter()
            .filter_map(|(tier, _)| Some((tier.as_str(), self.tier_price(tier)?)))
            .collect()
    }

    /// Keys the model emitted that `schema` does not declare.
    pub fn extra_keys<'a>(&'a self, schema: &'a ServiceSchema) -> impl Iterator<Item = &'a str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(move |k| !schema.declares(k))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
