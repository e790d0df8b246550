//! The service schema template: which keys every extracted record exposes.
//!
//! The schema is data, not code. [`ServiceSchema::canonical`] is the built-in
//! version `"1"`; callers that need a different field set (older price
//! lists use a `prices` table, some feeds add defaults) load their own with
//! [`ServiceSchema::from_path`] and pass it through
//! [`crate::config::ExtractionConfig::schema`]. Nothing in the normalizer
//! names a field directly; it only walks this descriptor.
//!
//! ## File format
//!
//! ```json
//! {
//!   "version": "1",
//!   "fields": [
//!     { "name": "service_name", "kind": "text", "hint": "\"vip\" or \"transfer\"" },
//!     { "name": "pricing", "kind": "pricing" },
//!     { "name": "service_details", "kind": "list" },
//!     { "name": "duration_minutes", "kind": "number" }
//!   ],
//!   "pricing": { "tiers": ["1_pax", "2_pax"], "sub_fields": ["adults", "children"] }
//! }
//! ```

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Number of passenger tiers in the canonical schema.
pub const CANONICAL_TIER_COUNT: usize = 10;

/// Value kind of a schema field. Drives default validation and the prompt
/// template; the normalizer only treats [`FieldKind::Pricing`] specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    List,
    Pricing,
}

/// One declared key of a service record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Value used when the model omits the key. `null` unless overridden.
    #[serde(default)]
    pub default: Value,
    /// Extraction hint shown to the model next to the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, hint: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: Value::Null,
            hint: hint.map(str::to_string),
        }
    }
}

/// Passenger tiers and the price columns inside each tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSpec {
    /// Tier keys in output order, e.g. `1_pax` … `10_pax`.
    pub tiers: Vec<String>,
    /// Sub-fields of every tier, e.g. `adults`, `children`.
    pub sub_fields: Vec<String>,
}

impl Default for PricingSpec {
    fn default() -> Self {
        Self {
            tiers: (1..=CANONICAL_TIER_COUNT).map(|n| format!("{n}_pax")).collect(),
            sub_fields: vec!["adults".to_string(), "children".to_string()],
        }
    }
}

/// A versioned record template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub version: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub pricing: PricingSpec,
}

impl Default for ServiceSchema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ServiceSchema {
    /// The built-in schema (version `"1"`).
    pub fn canonical() -> Self {
        use FieldKind::*;
        let fields = vec![
            FieldSpec::new("service_name", Text, Some("\"vip\" or \"transfer\"")),
            FieldSpec::new("service_category", Text, None),
            FieldSpec::new("company_title", Text, Some("title of the PDF document only")),
            FieldSpec::new("airport", Text, Some("airport name")),
            FieldSpec::new("pricing", Pricing, None),
            FieldSpec::new("travel_type", Text, Some("\"arrival\", \"departure\" or \"both\"")),
            FieldSpec::new("meeting_point", Text, None),
            FieldSpec::new("fast_track", Text, Some("\"yes\", \"no\" or \"expedited\"")),
            FieldSpec::new("service_details", List, Some("details of the service as bullet points, in document order")),
            FieldSpec::new("transportation_mode", Text, Some("transport inside the airport: \"foot\" or \"vehicle\"")),
            FieldSpec::new("assistance_with_luggage", Text, None),
            FieldSpec::new("lounge_access", Text, Some("\"yes\" or \"no\"")),
            FieldSpec::new("max_passengers_allowed", Number, None),
            FieldSpec::new("duration_minutes", Number, Some("convert hours to minutes")),
            FieldSpec::new("fee_out_of_hours", Number, Some("out-of-hours fee")),
            FieldSpec::new("late_booking_fee", Number, None),
            FieldSpec::new("usp", Text, Some("unique selling point")),
            FieldSpec::new("refund_policy_hours", Number, Some("hours before service for a 100% refund")),
        ];
        Self {
            version: "1".to_string(),
            fields,
            pricing: PricingSpec::default(),
        }
    }

    /// Parse and validate a schema from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        let schema: Self = serde_json::from_str(json)
            .map_err(|e| ExtractError::InvalidSchema(format!("not a valid schema file: {e}")))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Read, parse and validate a schema file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::InvalidSchema(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Check structural constraints the normalizer relies on.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let invalid = |msg: String| Err(ExtractError::InvalidSchema(msg));

        if self.fields.is_empty() {
            return invalid("schema declares no fields".into());
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return invalid("field names must not be empty".into());
            }
            if !seen.insert(field.name.as_str()) {
                return invalid(format!("duplicate field '{}'", field.name));
            }
            let default_ok = match (field.kind, &field.default) {
                (_, Value::Null) => true,
                (FieldKind::Text, Value::String(_)) => true,
                (FieldKind::Number, Value::Number(_)) => true,
                (FieldKind::List, Value::Array(_)) => true,
                _ => false,
            };
            if !default_ok {
                return invalid(format!(
                    "default for '{}' does not match kind {:?}",
                    field.name, field.kind
                ));
            }
        }

        let pricing_fields = self
            .fields
            .iter()
            .filter(|f| f.kind == FieldKind::Pricing)
            .count();
        if pricing_fields != 1 {
            return invalid(format!(
                "schema must declare exactly one pricing field, found {pricing_fields}"
            ));
        }

        check_keys("pricing tier", &self.pricing.tiers)?;
        check_keys("pricing sub-field", &self.pricing.sub_fields)?;
        Ok(())
    }

    /// Name of the pricing field.
    pub fn pricing_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.kind == FieldKind::Pricing)
            .map(|f| f.name.as_str())
    }

    /// Declared keys in output order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn declares(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.name == key)
    }

    /// A blank tier: every sub-field `null`.
    pub fn blank_tier(&self) -> Map<String, Value> {
        self.pricing
            .sub_fields
            .iter()
            .map(|s| (s.clone(), Value::Null))
            .collect()
    }

    /// A blank pricing table: every tier present and blank.
    pub fn blank_pricing(&self) -> Map<String, Value> {
        self.pricing
            .tiers
            .iter()
            .map(|t| (t.clone(), Value::Object(self.blank_tier())))
            .collect()
    }

    /// The blank record shown to the model: every field at its default,
    /// pricing fully expanded.
    pub fn template(&self) -> Value {
        let record: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let value = match f.kind {
                    FieldKind::Pricing => Value::Object(self.blank_pricing()),
                    _ => f.default.clone(),
                };
                (f.name.clone(), value)
            })
            .collect();
        Value::Object(record)
    }
}

fn check_keys(what: &str, keys: &[String]) -> Result<(), ExtractError> {
    if keys.is_empty() {
        return Err(ExtractError::InvalidSchema(format!("no {what}s declared")));
    }
    let mut seen = HashSet::new();
    for key in keys {
        if key.trim().is_empty() || !seen.insert(key.as_str()) {
            return Err(ExtractError::InvalidSchema(format!(
                "{what} '{key}' is empty or duplicated"
            )));
        }
    }
    Ok(())
}
