//! Prompt text. Every builder is a pure function of its inputs.

mod cards;
mod fields;
mod frames;
mod merge;

pub use cards::cards_prompt;
pub use fields::{category_prompt, summary_prompt, title_prompt};
pub use frames::{frame_description_prompt, segment_merge_prompt};
pub use merge::{merge_check_prompt, merge_synthesis_prompt};

use chrono::FixedOffset;

use crate::models::{ActivityCard, CategoryConfig, Observation};
use crate::utils::time::format_epoch;

/// Everything prompt text depends on besides the records themselves.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub categories: &'a [CategoryConfig],
    pub output_language: Option<&'a str>,
    pub offset: FixedOffset,
}

impl PromptContext<'_> {
    pub(crate) fn language_line(&self) -> String {
        match self.output_language.map(str::trim).filter(|l| !l.is_empty()) {
            Some(language) => format!(
                "Write every title, summary and description in {language}. Keep JSON keys and category names exactly as given."
            ),
            None => String::new(),
        }
    }

    pub(crate) fn category_list(&self) -> String {
        self.categories
            .iter()
            .map(|category| {
                if category.description.is_empty() {
                    format!("- {}", category.name)
                } else {
                    format!("- {}: {}", category.name, category.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One `[start - end]: text` line per observation.
pub fn observation_lines(observations: &[Observation], offset: &FixedOffset) -> String {
    observations
        .iter()
        .map(|obs| {
            format!(
                "[{} - {}]: {}",
                format_epoch(obs.start_ts, offset),
                format_epoch(obs.end_ts, offset),
                obs.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cards rendered as the JSON the model is asked to return.
pub fn card_json(cards: &[ActivityCard]) -> String {
    serde_json::to_string_pretty(&serde_json::json!({ "cards": cards }))
        .unwrap_or_else(|_| "{\"cards\":[]}".to_string())
}

/// The base prompt with a block describing why the previous attempt was rejected.
///
/// The base text is kept whole so the retry sees the same context.
pub fn with_correction(base: &str, attempt: u32, diagnostic: &str) -> String {
    format!(
        "{base}\n\n\
         PREVIOUS ATTEMPT FAILED\n\
         Your response to attempt {attempt} was rejected:\n\
         {diagnostic}\n\n\
         Correct exactly this problem and return the complete response again in the required format."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_keeps_base_and_diagnostic_verbatim() {
        let base = "Summarize these observations.\n[9:00 AM - 9:12 AM]: wrote code";
        let diagnostic = "Uncovered: 9:15 AM - 9:20 AM (5 minutes)";
        let prompt = with_correction(base, 1, diagnostic);
        assert!(prompt.starts_with(base));
        assert!(prompt.contains(diagnostic));
        assert!(prompt.contains("attempt 1"));
    }

    #[test]
    fn observation_lines_use_wall_clock() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let observations = vec![
            Observation::new(1, 9 * 3600, 9 * 3600 + 720, "wrote code"),
            Observation::new(1, 9 * 3600 + 720, 9 * 3600 + 1200, " reviewed PR "),
        ];
        assert_eq!(
            observation_lines(&observations, &utc),
            "[9:00 AM - 9:12 AM]: wrote code\n[9:12 AM - 9:20 AM]: reviewed PR"
        );
    }

    #[test]
    fn language_line_only_when_set() {
        let categories = crate::models::default_categories();
        let mut context = PromptContext {
            categories: &categories,
            output_language: None,
            offset: FixedOffset::east_opt(0).unwrap(),
        };
        assert!(context.language_line().is_empty());
        context.output_language = Some("Japanese");
        assert!(context.language_line().contains("Japanese"));
        assert!(context.category_list().contains("- Idle: "));
    }
}
