//! Pull the parameter payload out of a finished assistant reply.
//!
//! The assistant is told to answer with the JSON object only, but replies
//! regularly arrive wrapped in prose or a markdown fence. The extractor scans
//! for the first top-level `{...}` span that decodes as a JSON object and hands
//! it to the validator. Not finding a usable payload is an expected outcome
//! and yields `None`.

use log::{debug, warn};
use serde_json::Value;

use crate::model::VisualParameters;
use crate::validate::validate;

/// Extract and validate the embedded parameter object from `raw`.
pub fn extract(raw: &str) -> Option<VisualParameters> {
    let Some(candidate) = first_json_object(raw) else {
        debug!("No JSON object found in assistant reply ({} bytes)", raw.len());
        return None;
    };
    match validate(&candidate) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!("Assistant payload rejected: {e}");
            None
        }
    }
}

/// The first top-level brace-delimited span of `text` that decodes as a JSON
/// object. Spans that fail to decode are skipped as a whole; an unclosed `{`
/// is skipped on its own so a later span can still match.
pub fn first_json_object(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text.get(search_from..)?.find('{') {
        let start = search_from + offset;
        match matching_close(text, start) {
            Some(end) => {
                if let Some(span) = text.get(start..=end) {
                    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(span) {
                        return Some(value);
                    }
                }
                search_from = end + 1;
            }
            None => search_from = start + 1,
        }
    }
    None
}

/// Byte index of the `}` closing the `{` at `start`, ignoring braces inside
/// JSON string literals. All delimiters are ASCII, so byte scanning never
/// lands inside a multi-byte character.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
