use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseFailure;

use super::parse_object;
use super::strategy::strip_code_fences;

/// Answer to "should these two cards be one?".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeDecision {
    #[serde(alias = "merge", alias = "shouldMerge")]
    pub combine: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Title and summary spanning two merged cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardSynthesis {
    pub title: String,
    pub summary: String,
    #[serde(default, alias = "detailed_summary")]
    pub detailed_summary: Option<String>,
}

pub fn parse_merge_decision(raw: &str) -> Result<MergeDecision, ParseFailure> {
    let mut decision: MergeDecision = parse_object(raw, "merge decision")?;
    // Some models answer on a 0-100 scale.
    if decision.confidence > 1.0 && decision.confidence <= 100.0 {
        decision.confidence /= 100.0;
    }
    decision.confidence = decision.confidence.clamp(0.0, 1.0);
    Ok(decision)
}

pub fn parse_card_synthesis(raw: &str) -> Result<CardSynthesis, ParseFailure> {
    let synthesis: CardSynthesis = parse_object(raw, "merged card")?;
    if synthesis.title.trim().is_empty() {
        return Err(ParseFailure::new("merged card", "title is empty", raw));
    }
    Ok(synthesis)
}

/// Extract a single free-text answer such as a title or a category name.
///
/// Accepts `{"<label>": "..."}`, a fenced block, or plain text with an
/// optional `Label:` prefix and surrounding quotes.
pub fn parse_text_field(raw: &str, label: &'static str) -> Result<String, ParseFailure> {
    let body = strip_code_fences(raw).unwrap_or(raw).trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let found = map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(label))
            .and_then(|(_, value)| value.as_str())
            .map(clean_field);
        return match found {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(ParseFailure::new(label, format!("no `{label}` string in JSON"), raw)),
        };
    }

    let without_prefix = strip_label(body, label);
    let text = clean_field(without_prefix);
    if text.is_empty() {
        return Err(ParseFailure::new(label, "response was empty", raw));
    }
    Ok(text)
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    let head = text.get(..label.len());
    match head {
        Some(head) if head.eq_ignore_ascii_case(label) => {
            let rest = &text[label.len()..];
            rest.strip_prefix(':').unwrap_or(text)
        }
        _ => text,
    }
}

fn clean_field(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_threshold_inputs_parse_exactly() {
        let low = parse_merge_decision(r#"{"combine": true, "confidence": 0.75}"#).unwrap();
        assert!(low.combine);
        assert_eq!(low.confidence, 0.75);

        let high = parse_merge_decision("```json\n{\"combine\": true, \"confidence\": 0.81}\n```")
            .unwrap();
        assert_eq!(high.confidence, 0.81);
    }

    #[test]
    fn decision_accepts_percent_scale_and_aliases() {
        let decision = parse_merge_decision(r#"Answer: {"shouldMerge": false, "confidence": 90}"#)
            .unwrap();
        assert!(!decision.combine);
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn decision_without_verdict_fails() {
        let err = parse_merge_decision(r#"{"confidence": 0.9}"#).unwrap_err();
        assert_eq!(err.kind, "merge decision");
        assert!(parse_merge_decision("yes, merge them").is_err());
    }

    #[test]
    fn synthesis_requires_a_title() {
        assert!(parse_card_synthesis(r#"{"title":"  ","summary":"x"}"#).is_err());
        let ok = parse_card_synthesis(r#"{"title":"Refactor","summary":"Long session"}"#).unwrap();
        assert_eq!(ok.detailed_summary, None);
    }

    #[test]
    fn text_field_variants() {
        assert_eq!(parse_text_field("Title: \"Fixing CI\"", "title").unwrap(), "Fixing CI");
        assert_eq!(parse_text_field(r#"{"Title":"Fixing CI"}"#, "title").unwrap(), "Fixing CI");
        assert_eq!(parse_text_field("```\nWork\n```", "category").unwrap(), "Work");
        assert_eq!(parse_text_field("Titles are hard", "title").unwrap(), "Titles are hard");
        assert!(parse_text_field("   ", "summary").is_err());
        assert!(parse_text_field(r#"{"other":"x"}"#, "title").is_err());
    }
}
