mod cards;
mod fields;
mod frames;
pub mod strategy;

pub use cards::parse_cards;
pub use fields::{parse_card_synthesis, parse_merge_decision, parse_text_field, CardSynthesis, MergeDecision};
pub use frames::{parse_frame_descriptions, parse_segments};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParseFailure;

use strategy::{LIST_STRATEGIES, OBJECT_STRATEGIES};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Run the list strategies in order and keep the first one that yields at
/// least one valid item. Items that fail `convert` are dropped.
pub(crate) fn parse_list<T>(
    raw: &str,
    kind: &'static str,
    envelope_key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<T>, ParseFailure> {
    let mut reason = "no JSON list found".to_string();

    for strategy in LIST_STRATEGIES {
        let Some(items) = (strategy.extract)(raw, envelope_key) else {
            continue;
        };
        let total = items.len();
        let parsed: Vec<T> = items.iter().filter_map(&convert).collect();
        if !parsed.is_empty() {
            log_debug!(
                "[parsing] {kind}: strategy {} kept {}/{} item(s)",
                strategy.name,
                parsed.len(),
                total
            );
            return Ok(parsed);
        }
        reason = if total == 0 {
            format!("the `{envelope_key}` list was empty")
        } else {
            format!("none of the {total} item(s) had every required field")
        };
    }

    Err(ParseFailure::new(kind, reason, raw))
}

/// Whether any strategy finds JSON at all, usable or not.
pub(crate) fn contains_json(raw: &str, envelope_key: &str) -> bool {
    LIST_STRATEGIES
        .iter()
        .any(|strategy| (strategy.extract)(raw, envelope_key).is_some())
        || OBJECT_STRATEGIES
            .iter()
            .any(|strategy| (strategy.extract)(raw).is_some())
}

/// Run the object strategies in order and decode the first JSON object found.
pub(crate) fn parse_object<T: DeserializeOwned>(
    raw: &str,
    kind: &'static str,
) -> Result<T, ParseFailure> {
    let mut reason = "no JSON object found".to_string();

    for strategy in OBJECT_STRATEGIES {
        let Some(value) = (strategy.extract)(raw) else {
            continue;
        };
        match serde_json::from_value::<T>(value) {
            Ok(parsed) => {
                log_debug!("[parsing] {kind}: strategy {} succeeded", strategy.name);
                return Ok(parsed);
            }
            Err(err) => reason = err.to_string(),
        }
    }

    Err(ParseFailure::new(kind, reason, raw))
}
