use crate::models::Observation;

use super::{observation_lines, PromptContext};

pub fn summary_prompt(observations: &[Observation], context: &PromptContext<'_>) -> String {
    format!(
        "Summarize what this person did during the period below in two or three sentences. \
         Mention the concrete apps, documents and tasks.\n{}\n\n{}\n\nReply with the summary text only.",
        context.language_line(),
        observation_lines(observations, &context.offset),
    )
}

pub fn title_prompt(summary: &str, context: &PromptContext<'_>) -> String {
    format!(
        "Write a short title (at most eight words) for this activity summary.\n{}\n\nSUMMARY\n{}\n\nReply with the title only.",
        context.language_line(),
        summary.trim(),
    )
}

pub fn category_prompt(summary: &str, context: &PromptContext<'_>) -> String {
    format!(
        "Pick the category that best fits this activity summary.\n\nCATEGORIES\n{}\n\nSUMMARY\n{}\n\nReply with the category name only, spelled exactly as listed.",
        context.category_list(),
        summary.trim(),
    )
}
