//! Post-processing: deterministic cleanup of a raw model reply before it is
//! parsed as JSON.
//!
//! ## Why is this necessary?
//!
//! Even when told "return ONLY valid JSON, no markdown", models regularly
//! wrap their answer in a ` ```json ... ``` ` fence, prepend a sentence such
//! as "Here is the extracted data:", or start the reply with a byte-order
//! mark. None of that changes the data, but every one of them makes a strict
//! JSON parser fail.
//!
//! Cleanup is best-effort and total: it never fails and never panics, and it
//! only ever *removes* wrapping text. The cleaned string is also what ends up
//! in [`crate::record::ErrorRecord::raw`] when parsing still fails, so it must
//! stay recognisable as the model's reply.
//!
//! ## Rule Order
//!
//! 1. Trim whitespace and invisible characters at both ends
//! 2. If the text opens with a complete fenced block and prose follows it,
//!    keep only the block body
//! 3. Strip an opening fence line (with optional language tag)
//! 4. Strip a closing fence
//! 5. If prose surrounds a fenced block, keep only the block body
//!
//! The rules are applied repeatedly until the text stops changing, which makes
//! [`strip_code_fences`] idempotent by construction. Every effective pass makes
//! the string strictly shorter, so the loop terminates.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that are invisible but not `char::is_whitespace`.
const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

const FENCE: &str = "```";

/// Clean a raw model reply so it can be handed to a JSON parser.
pub fn strip_code_fences(input: &str) -> String {
    let mut current = trim_edges(input).to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(input: &str) -> String {
    let s = trim_edges(input);
    let s = take_leading_block(s);
    let s = trim_edges(s);
    let s = strip_opening_fence(s);
    let s = trim_edges(s);
    let s = strip_closing_fence(s);
    let s = trim_edges(s);
    let s = extract_fenced_block(s);
    trim_edges(s).to_string()
}

// ── Rule 1: Trim edges ───────────────────────────────────────────────────────

fn trim_edges(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c))
}

// ── Rule 2: Leading block with trailing prose ────────────────────────────────
//
// "```json\n[...]\n```\n\nLet me know if ..." must not reach Rule 3, which
// would leave the closing fence and the prose behind the JSON. The closing
// fence has to sit on its own line, so a nested opening fence never closes
// the block early.

static RE_LEADING_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[ \t]*[\w.+-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```[ \t]*(?:\r?\n|$)").unwrap()
});

fn take_leading_block(input: &str) -> &str {
    let Some(caps) = RE_LEADING_BLOCK.captures(input) else {
        return input;
    };
    match (caps.get(0), caps.get(1)) {
        (Some(block), Some(body)) if !trim_edges(&input[block.end()..]).is_empty() => body.as_str(),
        _ => input,
    }
}

// ── Rule 3: Opening fence ────────────────────────────────────────────────────

/// An opening fence followed by a language tag that ends the line, e.g.
/// ` ```json\n` or ` ``` JSON \n`.
static RE_OPENING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[ \t]*[A-Za-z][\w.+-]*[ \t]*(?:\r?\n|$)").unwrap());

/// A tag glued directly onto the payload: ` ```json{"a": 1}`.
static RE_GLUED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[ \t]*[A-Za-z][\w.+-]*([\[{])").unwrap());

fn strip_opening_fence(input: &str) -> &str {
    if !input.starts_with(FENCE) {
        return input;
    }
    if let Some(m) = RE_OPENING_LINE.find(input) {
        return &input[m.end()..];
    }
    if let Some(caps) = RE_GLUED_TAG.captures(input) {
        if let Some(bracket) = caps.get(1) {
            return &input[bracket.start()..];
        }
    }
    // Bare fence: "```\n{...}" or "```{...}"
    input.trim_start_matches('`')
}

// ── Rule 4: Closing fence ────────────────────────────────────────────────────

fn strip_closing_fence(input: &str) -> &str {
    if input.ends_with(FENCE) {
        input.trim_end_matches('`')
    } else {
        input
    }
}

// ── Rule 5: Fenced block inside prose ────────────────────────────────────────
//
// "Here is the data:\n```json\n[...]\n```\nLet me know if ..." — the JSON
// sits between the first fence pair. Only applied when the text does not
// already look like bare JSON, so a fence inside a JSON string value is left
// alone.

static RE_INNER_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*[\w.+-]*[ \t]*\r?\n(.*?)```").unwrap());

fn extract_fenced_block(input: &str) -> &str {
    if input.starts_with('{') || input.starts_with('[') {
        return input;
    }
    match RE_INNER_BLOCK.captures(input).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => input,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        let input = "```\n[1, 2]\n```";
        assert_eq!(strip_code_fences(input), "[1, 2]");
    }

    #[test]
    fn test_strip_uppercase_tag_and_crlf() {
        let input = "```JSON\r\n{\"a\": 1}\r\n```\r\n";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_opening_fence_only() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_closing_fence_only() {
        assert_eq!(strip_code_fences("{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_single_line_fences() {
        assert_eq!(strip_code_fences("```{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_prose_around_block() {
        let input = "Here is the extracted data:\n```json\n[{\"a\": 1}]\n```\nLet me know!";
        assert_eq!(strip_code_fences(input), "[{\"a\": 1}]");
    }

    #[test]
    fn test_prose_after_block() {
        let input = "```json\n[{\"a\": 1}]\n```\n\nLet me know if you need anything else.";
        assert_eq!(strip_code_fences(input), "[{\"a\": 1}]");
    }

    #[test]
    fn test_fence_inside_string_value_untouched() {
        let input = "{\"note\": \"use ```json\\n{}\\n``` blocks\"}";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_bom_and_zero_width_trimmed() {
        let input = "\u{FEFF}```json\n{\"a\": 1}\n```\u{200B}";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_degenerate_inputs_do_not_panic() {
        for input in ["", "```", "``````", "` ` `", "```json", "\n```\n", "``", "```é"] {
            let once = strip_code_fences(input);
            assert_eq!(strip_code_fences(&once), once, "input {input:?}");
        }
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn test_prose_is_kept() {
        let input = "Sorry, I cannot process this.";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_idempotent_on_nested_fences() {
        let input = "```json\n```json\n{\"a\": 1}\n```\n```";
        let once = strip_code_fences(input);
        assert_eq!(once, "{\"a\": 1}");
        assert_eq!(strip_code_fences(&once), once);
    }
}
