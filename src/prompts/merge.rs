use crate::models::ActivityCard;

use super::PromptContext;

fn describe(card: &ActivityCard) -> String {
    format!(
        "{} - {} | {} | {}\n{}",
        card.start_time, card.end_time, card.category, card.title, card.summary
    )
}

pub fn merge_check_prompt(previous: &ActivityCard, candidate: &ActivityCard) -> String {
    format!(
        r#"Two consecutive activity cards from one person's timeline:

EARLIER
{earlier}

LATER
{later}

Are these the same ongoing activity, so that one card would describe both periods better than two? Answer false when the task, project or goal changed, even if the application is the same.

Return only JSON:
{{"combine": true or false, "confidence": number between 0 and 1, "reason": "short explanation"}}"#,
        earlier = describe(previous),
        later = describe(candidate),
    )
}

pub fn merge_synthesis_prompt(
    previous: &ActivityCard,
    candidate: &ActivityCard,
    context: &PromptContext<'_>,
) -> String {
    format!(
        r#"Combine these two consecutive activity cards into one card that spans both periods.

EARLIER
{earlier}

LATER
{later}

Write a title of at most eight words and a summary of two or three sentences covering the whole span.
{language}

Return only JSON:
{{"title":"...","summary":"...","detailedSummary":"..."}}"#,
        earlier = describe(previous),
        later = describe(candidate),
        language = context.language_line(),
    )
}
