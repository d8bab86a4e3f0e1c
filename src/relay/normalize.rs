//! Text handling around the completion provider's single JSON payload.

use std::sync::OnceLock;

use regex::Regex;

/// Substituted when the provider produced no usable answer.
pub const FALLBACK_ANSWER: &str = "Sorry, the response was not meaningful or too long.";

/// Log snippets of provider bodies are capped at this many bytes.
const SNIPPET_LIMIT: usize = 512;

fn blank_line_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static regex"))
}

/// Trim the raw body and collapse every run of blank lines into a single
/// newline before it is parsed as JSON.
///
/// Some providers pad the payload with whitespace or keep-alive newlines.
pub fn normalize_body(raw: &str) -> String {
    blank_line_run().replace_all(raw.trim(), "\n").into_owned()
}

/// Cut the answer at the first blank line.
///
/// This is a policy rather than anything the provider documents: completion
/// models tend to run on into invented follow-up turns after a blank line.
pub fn truncate_at_blank_line(text: &str) -> &str {
    match text.find("\n\n") {
        Some(end) => &text[..end],
        None => text,
    }
}

/// Pull the answer out of a `{choices: [{text}]}` payload.
///
/// Missing `choices`, a non-string `text`, or an answer that is empty after
/// truncation all yield [`FALLBACK_ANSWER`], so the caller never receives an
/// empty chunk.
pub fn extract_answer(payload: &serde_json::Value) -> String {
    let answer = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("text"))
        .and_then(|text| text.as_str())
        .map(truncate_at_blank_line)
        .unwrap_or_default();

    if answer.is_empty() {
        FALLBACK_ANSWER.to_string()
    } else {
        answer.to_string()
    }
}

/// Bounded prefix of a provider body for logs, cut on a char boundary.
pub(crate) fn snippet(text: &str) -> &str {
    if text.len() <= SNIPPET_LIMIT {
        return text;
    }
    let mut end = SNIPPET_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
