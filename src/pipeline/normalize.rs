//! Response normalization: raw model reply → `Vec<ServiceRecord>` or a typed
//! [`ErrorRecord`].
//!
//! This is the only stage with a hard contract. Whatever the model says —
//! prose, fenced JSON, a single object, an array, truncated output — the
//! caller gets exactly one of:
//!
//! * `Ok(records)` — non-empty, in reply order, every schema key present;
//! * `Err(ErrorRecord { kind: InvalidJson, raw, detail })`.
//!
//! Nothing here panics on malformed input, and nothing is invented: values
//! the reply contains are copied verbatim, keys it lacks get the schema
//! default (`null` unless the schema says otherwise). Keys the schema does not
//! know are kept after the declared ones so no extractor output is lost.

use crate::pipeline::postprocess::strip_code_fences;
use crate::record::{ErrorRecord, ServiceRecord};
use crate::schema::{FieldKind, ServiceSchema};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

static CANONICAL: Lazy<ResponseNormalizer> =
    Lazy::new(|| ResponseNormalizer::new(Arc::new(ServiceSchema::canonical())));

/// Normalize `raw_text` against the canonical schema.
pub fn normalize(raw_text: &str) -> Result<Vec<ServiceRecord>, ErrorRecord> {
    CANONICAL.normalize(raw_text)
}

/// Turns raw replies into completed records for one schema.
///
/// Holds no per-call state; share one instance freely across tasks.
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    schema: Arc<ServiceSchema>,
}

impl ResponseNormalizer {
    pub fn new(schema: Arc<ServiceSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ServiceSchema {
        &self.schema
    }

    /// Clean, parse, shape and complete a raw reply.
    pub fn normalize(&self, raw_text: &str) -> Result<Vec<ServiceRecord>, ErrorRecord> {
        let cleaned = strip_code_fences(raw_text);

        let parsed: Value = serde_json::from_str(&cleaned)
            .map_err(|e| ErrorRecord::invalid_json(format!("reply is not valid JSON: {e}"), &cleaned))?;

        let objects = shape(parsed).map_err(|detail| ErrorRecord::invalid_json(detail, &cleaned))?;

        let records = objects
            .into_iter()
            .enumerate()
            .map(|(i, object)| {
                self.complete(object)
                    .map_err(|detail| ErrorRecord::invalid_json(format!("record {i}: {detail}"), &cleaned))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Normalized reply into {} record(s) (schema v{})",
            records.len(),
            self.schema.version
        );
        Ok(records)
    }

    /// Merge one object against the schema template.
    ///
    /// Declared keys come first in schema order, then undeclared keys in the
    /// order the object had them. Completing an already complete object
    /// returns it unchanged.
    pub fn complete(&self, object: Map<String, Value>) -> Result<ServiceRecord, String> {
        let mut out = Map::with_capacity(object.len().max(self.schema.fields.len()));

        for field in &self.schema.fields {
            let value = object.get(&field.name);
            let completed = match field.kind {
                FieldKind::Pricing => Value::Object(self.complete_pricing(&field.name, value)?),
                _ => value.cloned().unwrap_or_else(|| field.default.clone()),
            };
            out.insert(field.name.clone(), completed);
        }

        out.extend(object.into_iter().filter(|(key, _)| !self.schema.declares(key)));
        Ok(ServiceRecord::from_completed(out))
    }

    fn complete_pricing(
        &self,
        field: &str,
        value: Option<&Value>,
    ) -> Result<Map<String, Value>, String> {
        let table = match value {
            None | Some(Value::Null) => return Ok(self.schema.blank_pricing()),
            Some(Value::Object(table)) => table,
            Some(other) => {
                return Err(format!(
                    "field `{field}` must be an object, found {}",
                    type_name(other)
                ))
            }
        };

        let tiers = &self.schema.pricing.tiers;
        let mut out = Map::with_capacity(tiers.len());
        for tier in tiers {
            let completed = match table.get(tier) {
                None | Some(Value::Null) => self.schema.blank_tier(),
                Some(Value::Object(prices)) => self.complete_tier(prices),
                Some(other) => {
                    return Err(format!(
                        "pricing tier `{tier}` must be an object, found {}",
                        type_name(other)
                    ))
                }
            };
            out.insert(tier.clone(), Value::Object(completed));
        }

        for (key, value) in table {
            if !tiers.contains(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(out)
    }

    fn complete_tier(&self, prices: &Map<String, Value>) -> Map<String, Value> {
        let sub_fields = &self.schema.pricing.sub_fields;
        let mut out = Map::with_capacity(sub_fields.len().max(prices.len()));
        for sub in sub_fields {
            out.insert(sub.clone(), prices.get(sub).cloned().unwrap_or(Value::Null));
        }
        for (key, value) in prices {
            if !sub_fields.contains(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

/// Object ⇒ one-element list; array of objects ⇒ as-is; anything else is a
/// schema violation.
fn shape(parsed: Value) -> Result<Vec<Map<String, Value>>, String> {
    match parsed {
        Value::Object(object) => Ok(vec![object]),
        Value::Array(items) if items.is_empty() => {
            Err("reply is an empty array; expected at least one service object".to_string())
        }
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(object) => Ok(object),
                other => Err(format!(
                    "array element {i} is {}, expected an object",
                    type_name(&other)
                )),
            })
            .collect(),
        other => Err(format!(
            "reply is {}, expected an object or an array of objects",
            type_name(&other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
