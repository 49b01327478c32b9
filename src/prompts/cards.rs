use crate::models::{ActivityCard, Observation};

use super::{card_json, observation_lines, PromptContext};

/// Prompt asking for the full, updated card timeline for a sliding window.
pub fn cards_prompt(
    observations: &[Observation],
    existing: &[ActivityCard],
    context: &PromptContext<'_>,
    min_minutes: f64,
    max_minutes: f64,
) -> String {
    let previous = if existing.is_empty() {
        "There are no earlier cards for this window. Build the timeline from the observations alone.".to_string()
    } else {
        format!(
            "These cards already cover the earlier part of the window. Revise them if the new observations change the picture, but every minute they cover must still be covered by your output:\n{}",
            card_json(existing)
        )
    };

    let language = context.language_line();

    format!(
        r#"You turn screen activity observations into a timeline of activity cards.

OBSERVATIONS
{observations}

EXISTING CARDS
{previous}

CATEGORIES
Pick each card's category from this list, spelled exactly as shown:
{categories}

RULES
- The cards must cover the whole span of the existing cards and observations with no gaps and no overlaps. Each card's endTime is the next card's startTime.
- Only leave a gap where the existing cards already had one.
- Every card except the last must last at least {min_minutes:.0} minutes and at most {max_minutes:.0} minutes. Fold short stretches into a neighbour.
- Distractions are brief interruptions inside a card. They do not break the card.
- Times use the 12-hour clock as in the observations, for example "9:05 AM".
{language}

Return only JSON, no prose and no code fences, in exactly this shape:
{{"cards":[{{"startTime":"9:00 AM","endTime":"9:30 AM","category":"...","subcategory":"...","title":"...","summary":"...","detailedSummary":"...","distractions":[{{"startTime":"9:10 AM","endTime":"9:12 AM","title":"...","summary":"..."}}],"appSites":{{"primary":"...","secondary":"..."}}}}]}}"#,
        observations = observation_lines(observations, &context.offset),
        categories = context.category_list(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_categories;
    use chrono::FixedOffset;

    #[test]
    fn includes_observations_cards_and_rules() {
        let categories = default_categories();
        let context = PromptContext {
            categories: &categories,
            output_language: Some("French"),
            offset: FixedOffset::east_opt(0).unwrap(),
        };
        let observations = vec![Observation::new(1, 32_400, 33_120, "wrote code")];
        let existing = vec![ActivityCard::placeholder("8:30 AM", "9:00 AM")];

        let prompt = cards_prompt(&observations, &existing, &context, 10.0, 60.0);
        assert!(prompt.contains("[9:00 AM - 9:12 AM]: wrote code"));
        assert!(prompt.contains("\"startTime\": \"8:30 AM\""));
        assert!(prompt.contains("at least 10 minutes and at most 60 minutes"));
        assert!(prompt.contains("- Work: "));
        assert!(prompt.contains("French"));
    }

    #[test]
    fn cold_start_says_so() {
        let categories = default_categories();
        let context = PromptContext {
            categories: &categories,
            output_language: None,
            offset: FixedOffset::east_opt(0).unwrap(),
        };
        let prompt = cards_prompt(&[], &[], &context, 10.0, 60.0);
        assert!(prompt.contains("no earlier cards"));
    }
}
