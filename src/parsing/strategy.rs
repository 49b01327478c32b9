//! Ordered recovery strategies for JSON embedded in model output.
//!
//! Each strategy is a pure function from raw text to a decoded value. Parsers
//! walk a strategy table front to back and keep the first hit, so adding a new
//! recovery trick means adding a row, not touching call sites.

use serde_json::Value;

/// Pulls a list of raw items out of text, given the envelope key (`"cards"`).
pub struct ListStrategy {
    pub name: &'static str,
    pub extract: fn(&str, &str) -> Option<Vec<Value>>,
}

/// Pulls a single JSON object out of text.
pub struct ObjectStrategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<Value>,
}

pub const LIST_STRATEGIES: &[ListStrategy] = &[
    ListStrategy {
        name: "envelope",
        extract: envelope,
    },
    ListStrategy {
        name: "bare-list",
        extract: bare_list,
    },
    ListStrategy {
        name: "fence-stripped",
        extract: fence_stripped_list,
    },
    ListStrategy {
        name: "bracket-slice",
        extract: bracket_slice_list,
    },
];

pub const OBJECT_STRATEGIES: &[ObjectStrategy] = &[
    ObjectStrategy {
        name: "direct",
        extract: direct_object,
    },
    ObjectStrategy {
        name: "fence-stripped",
        extract: fence_stripped_object,
    },
    ObjectStrategy {
        name: "brace-slice",
        extract: brace_slice_object,
    },
];

fn decode(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

fn envelope(text: &str, key: &str) -> Option<Vec<Value>> {
    match decode(text)? {
        Value::Object(mut map) => match map.remove(key)? {
            Value::Array(items) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn bare_list(text: &str, _key: &str) -> Option<Vec<Value>> {
    match decode(text)? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn fence_stripped_list(text: &str, key: &str) -> Option<Vec<Value>> {
    let inner = strip_code_fences(text)?;
    envelope(inner, key).or_else(|| bare_list(inner, key))
}

fn bracket_slice_list(text: &str, key: &str) -> Option<Vec<Value>> {
    slice_between(text, '{', '}')
        .and_then(|slice| envelope(slice, key))
        .or_else(|| slice_between(text, '[', ']').and_then(|slice| bare_list(slice, key)))
}

fn direct_object(text: &str) -> Option<Value> {
    decode(text).filter(Value::is_object)
}

fn fence_stripped_object(text: &str) -> Option<Value> {
    strip_code_fences(text).and_then(direct_object)
}

fn brace_slice_object(text: &str) -> Option<Value> {
    slice_between(text, '{', '}').and_then(direct_object)
}

/// Body of the first fenced block (```` ```json ... ``` ````), if there is one.
pub fn strip_code_fences(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_marker = &text[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after_marker.find('\n').map_or(0, |idx| idx + 1);
    let body = &after_marker[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    Some(body.trim())
}

/// Text from the first `open` to the last `close`, inclusive.
pub fn slice_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_info_string() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), Some("[1]"));
        assert_eq!(strip_code_fences("Here:\n```\n{\"a\":1}\n```\nDone"), Some("{\"a\":1}"));
        assert_eq!(strip_code_fences("no fences"), None);
    }

    #[test]
    fn slices_outermost_brackets() {
        assert_eq!(slice_between("x [1, [2]] y", '[', ']'), Some("[1, [2]]"));
        assert_eq!(slice_between("] backwards [", '[', ']'), None);
    }

    #[test]
    fn envelope_requires_the_named_key() {
        assert!(envelope(r#"{"cards":[1]}"#, "cards").is_some());
        assert!(envelope(r#"{"segments":[1]}"#, "cards").is_none());
        assert!(envelope(r#"{"cards":{}}"#, "cards").is_none());
    }

    #[test]
    fn bracket_slice_prefers_the_envelope() {
        let text = r#"Sure! {"cards":[{"a":1}]} hope that helps"#;
        assert_eq!(bracket_slice_list(text, "cards").unwrap().len(), 1);
        let text = "The list: [{\"a\":1},{\"a\":2}] end";
        assert_eq!(bracket_slice_list(text, "cards").unwrap().len(), 2);
    }
}
