use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseFailure;
use crate::models::{ActivityCard, AppSites, Distraction};
use crate::utils::time::parse_clock;

use super::parse_list;

/// Item shape accepted from the model. Field names are looser than the
/// committed `ActivityCard`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(alias = "start")]
    start_time: String,
    #[serde(alias = "end")]
    end_time: String,
    category: String,
    #[serde(default)]
    subcategory: Option<String>,
    title: String,
    summary: String,
    #[serde(default, alias = "detailed_summary")]
    detailed_summary: Option<String>,
    #[serde(default)]
    distractions: Option<Vec<Value>>,
    #[serde(default, alias = "app_sites")]
    app_sites: Option<AppSites>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDistraction {
    #[serde(alias = "start")]
    start_time: String,
    #[serde(alias = "end")]
    end_time: String,
    title: String,
    #[serde(default)]
    summary: String,
}

pub fn parse_cards(raw: &str) -> Result<Vec<ActivityCard>, ParseFailure> {
    parse_list(raw, "activity cards", "cards", card_from_value)
}

/// Convert one item, or drop it if any required field is missing or malformed.
fn card_from_value(value: &Value) -> Option<ActivityCard> {
    let raw: RawCard = serde_json::from_value(value.clone()).ok()?;
    let start_time = raw.start_time.trim().to_string();
    let end_time = raw.end_time.trim().to_string();
    parse_clock(&start_time)?;
    parse_clock(&end_time)?;

    let title = raw.title.trim().to_string();
    let category = raw.category.trim().to_string();
    if title.is_empty() || category.is_empty() {
        return None;
    }

    let distractions = raw
        .distractions
        .unwrap_or_default()
        .iter()
        .filter_map(distraction_from_value)
        .collect();

    Some(ActivityCard {
        start_time,
        end_time,
        category,
        subcategory: raw.subcategory.unwrap_or_default().trim().to_string(),
        title,
        summary: raw.summary.trim().to_string(),
        detailed_summary: raw.detailed_summary.unwrap_or_default().trim().to_string(),
        distractions,
        app_sites: raw.app_sites,
    })
}

fn distraction_from_value(value: &Value) -> Option<Distraction> {
    let raw: RawDistraction = serde_json::from_value(value.clone()).ok()?;
    parse_clock(&raw.start_time)?;
    parse_clock(&raw.end_time)?;
    Some(Distraction {
        start_time: raw.start_time.trim().to_string(),
        end_time: raw.end_time.trim().to_string(),
        title: raw.title.trim().to_string(),
        summary: raw.summary.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"{"startTime":"9:00 AM","endTime":"9:20 AM","category":"Work","subcategory":"Coding","title":"Parser work","summary":"Wrote code and reviewed a PR","distractions":[{"startTime":"9:05 AM","endTime":"9:07 AM","title":"Slack","summary":"Replied"}]}"#;

    #[test]
    fn envelope_bare_and_fenced_forms_agree() {
        let enveloped = parse_cards(&format!(r#"{{"cards":[{ITEM}]}}"#)).unwrap();
        let bare = parse_cards(&format!("[{ITEM}]")).unwrap();
        let fenced = parse_cards(&format!(
            "Here is the timeline you asked for:\n```json\n[{ITEM}]\n```\nLet me know if you need changes."
        ))
        .unwrap();

        assert_eq!(enveloped.len(), 1);
        assert_eq!(enveloped, bare);
        assert_eq!(enveloped, fenced);
        assert_eq!(enveloped[0].title, "Parser work");
        assert_eq!(enveloped[0].distractions.len(), 1);
    }

    #[test]
    fn prose_around_the_envelope_is_ignored() {
        let cards = parse_cards(&format!("Sure! {{\"cards\":[{ITEM}]}} Anything else?")).unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[test]
    fn accepts_short_time_keys() {
        let cards = parse_cards(
            r#"[{"start":"1:00 PM","end":"1:30 PM","category":"Personal","title":"Errands","summary":"Banking"}]"#,
        )
        .unwrap();
        assert_eq!(cards[0].start_time, "1:00 PM");
        assert_eq!(cards[0].subcategory, "");
    }

    #[test]
    fn invalid_items_are_dropped() {
        let cards = parse_cards(&format!(
            r#"{{"cards":[{ITEM},{{"startTime":"soon","endTime":"9:40 AM","category":"Work","title":"x","summary":"y"}},{{"title":"no times"}}]}}"#
        ))
        .unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[test]
    fn nothing_usable_is_a_failure_with_raw_text() {
        let raw = r#"{"cards":[{"title":"no times"}]}"#;
        let err = parse_cards(raw).unwrap_err();
        assert_eq!(err.raw, raw);
        assert_eq!(err.kind, "activity cards");

        assert!(parse_cards("I could not determine any activities.").is_err());
        assert!(parse_cards(r#"{"cards":[]}"#).is_err());
    }

    #[test]
    fn malformed_distractions_do_not_sink_the_card() {
        let cards = parse_cards(
            r#"[{"startTime":"9:00 AM","endTime":"9:20 AM","category":"Work","title":"t","summary":"s","distractions":[{"title":"missing times"}]}]"#,
        )
        .unwrap();
        assert!(cards[0].distractions.is_empty());
    }
}
