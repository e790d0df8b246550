//! Prompts for structured service extraction.
//!
//! The system prompt carries the fixed extraction rules; the user prompt is
//! rebuilt per request from the active [`ServiceSchema`], the same one the
//! normalizer completes replies against.
//!
//! Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

use crate::schema::{FieldKind, ServiceSchema};

/// Default system prompt for extracting airport services from a document.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert at reading commercial price lists for airport services (VIP meet & assist, fast track, lounge access, transfers). You extract what the document states into JSON.

Follow these rules precisely:

1. FIDELITY
   - Copy names, prices and conditions exactly as the document states them
   - Do NOT invent, estimate or infer values that are not written
   - A value that is not present is null

2. SERVICES
   - The document may describe SEVERAL services; return one object per service
   - Services with different prices are different services
   - Keep the order in which services appear in the document

3. OUTPUT FORMAT
   - Output ONLY a valid JSON array
   - Do NOT wrap the JSON in ```json fences
   - Do NOT add commentary or explanations"#;

const PRICING_RULES: &str = r#"PRICING RULES:
1. Extract adult AND child prices separately for EACH service and EACH passenger tier.
2. Look for phrases such as "Price per child" or "Children (2-16yrs old)".
3. The tier key is the number of passengers: "1_pax" is the price for one passenger, "2_pax" for two, and so on.
4. If the child rate equals the additional-person rate, use it; if a child-specific rate is given, use that.
5. If no child price is mentioned, set it to null.
6. If a price is given without saying whom it applies to, do not guess: add it to the service details instead, including VAT when the document mentions it."#;

const DETAIL_RULES: &str = r#"IMPORTANT:
- Do not copy boilerplate such as "Terms & Conditions apply", "Rates subject to change" or rounding notes into any field.
- Number the service details: "1. ...", "2. ...", and so on."#;

/// Build the user prompt for one document.
///
/// `document_text` is the locally extracted text in text mode; `None` when the
/// document itself travels as an attachment.
pub fn extraction_prompt(schema: &ServiceSchema, document_text: Option<&str>) -> String {
    let template = serde_json::to_string_pretty(&schema.template()).unwrap_or_default();

    let mut prompt = String::with_capacity(template.len() + 2048);
    prompt.push_str(
        "You are extracting airport service information from a PDF. \
         The PDF may contain MULTIPLE SERVICES.\n\n\
         Return a JSON ARRAY with one object for each service found.\n\n\
         Each service object must follow this template:\n",
    );
    prompt.push_str(&template);
    prompt.push_str("\n\n");

    let hints = field_hints(schema);
    if !hints.is_empty() {
        prompt.push_str("FIELDS:\n");
        prompt.push_str(&hints);
        prompt.push('\n');
    }

    if schema.pricing_field().is_some() {
        prompt.push_str(PRICING_RULES);
        prompt.push_str("\n\n");
    }
    prompt.push_str(DETAIL_RULES);
    prompt.push_str("\n\n");

    match document_text {
        Some(text) => {
            prompt.push_str("DOCUMENT TEXT:\n\"\"\"\n");
            prompt.push_str(text.trim());
            prompt.push_str("\n\"\"\"\n\nNow extract ALL services from the document text above.");
        }
        None => prompt.push_str("Now extract ALL services from the attached document."),
    }
    prompt
}

/// One line per field that carries a hint or a non-text kind.
fn field_hints(schema: &ServiceSchema) -> String {
    let mut out = String::new();
    for field in &schema.fields {
        let kind = match field.kind {
            FieldKind::Number => Some("a number"),
            FieldKind::List => Some("a list of strings"),
            FieldKind::Text | FieldKind::Pricing => None,
        };
        let line = match (kind, field.hint.as_deref()) {
            (Some(kind), Some(hint)) => format!("- {}: {kind}; {hint}\n", field.name),
            (Some(kind), None) => format!("- {}: {kind}\n", field.name),
            (None, Some(hint)) => format!("- {}: {hint}\n", field.name),
            (None, None) => continue,
        };
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_every_schema_key() {
        let schema = ServiceSchema::canonical();
        let prompt = extraction_prompt(&schema, None);
        for name in schema.field_names() {
            assert!(prompt.contains(&format!("\"{name}\"")), "missing {name}");
        }
        assert!(prompt.contains("\"10_pax\""));
        assert!(prompt.contains("attached document"));
    }

    #[test]
    fn text_mode_inlines_document() {
        let prompt = extraction_prompt(&ServiceSchema::canonical(), Some("  VIP Arrival 475 EUR \n"));
        assert!(prompt.contains("\"\"\"\nVIP Arrival 475 EUR\n\"\"\""));
        assert!(!prompt.contains("attached document"));
    }

    #[test]
    fn hints_list_kinds() {
        let hints = field_hints(&ServiceSchema::canonical());
        assert!(hints.contains("- duration_minutes: a number; convert hours to minutes"));
        assert!(hints.contains("- max_passengers_allowed: a number\n"));
        assert!(!hints.contains("- service_category"));
    }

    #[test]
    fn pricing_rules_follow_schema() {
        let mut schema = ServiceSchema::canonical();
        schema.fields.retain(|f| f.kind != FieldKind::Pricing);
        assert!(!extraction_prompt(&schema, None).contains("PRICING RULES"));
    }

    #[test]
    fn system_prompt_forbids_fences() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do NOT wrap"));
    }
}
