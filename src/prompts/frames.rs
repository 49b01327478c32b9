use crate::models::{Frame, FrameDescription};
use crate::utils::time::format_elapsed;

use super::PromptContext;

/// Prompt sent alongside a chunk of screenshots, one description per frame.
pub fn frame_description_prompt(frames: &[Frame], context: &PromptContext<'_>) -> String {
    let listing = frames
        .iter()
        .enumerate()
        .map(|(idx, frame)| format!("Frame {}: at {}", idx + 1, format_elapsed(frame.offset_secs)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are given {count} screenshots of one person's screen, in chronological order.

{listing}

For each frame, describe in one or two sentences what the person is doing: the application, the document or site, and the task. Be concrete ("editing parser.rs in VS Code", not "using a computer"). If the screen is locked or unchanged, say so.
{language}

Return only JSON in this shape, one entry per frame:
{{"frames":[{{"frame":1,"description":"..."}}]}}"#,
        count = frames.len(),
        language = context.language_line(),
    )
}

/// Prompt grouping per-frame descriptions into contiguous activity segments.
pub fn segment_merge_prompt(
    descriptions: &[FrameDescription],
    batch_duration_secs: f64,
    context: &PromptContext<'_>,
) -> String {
    let listing = descriptions
        .iter()
        .map(|d| format!("[{}] {}", format_elapsed(d.offset_secs), d.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"These are descriptions of screenshots taken during a recording that lasts {duration}. Each line starts with its offset from the start of the recording.

{listing}

Group consecutive descriptions that belong to the same activity into segments. Segments must be in order, must not overlap, must start at or after 00:00 and end no later than {duration}. Each segment needs a description that summarizes the activity.
{language}

Return only JSON in this shape, with MM:SS or HH:MM:SS offsets:
{{"segments":[{{"start":"00:00","end":"01:30","description":"..."}}]}}"#,
        duration = format_elapsed(batch_duration_secs),
        language = context.language_line(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_categories;
    use chrono::FixedOffset;
    use std::path::PathBuf;

    #[test]
    fn lists_frames_and_offsets() {
        let categories = default_categories();
        let context = PromptContext {
            categories: &categories,
            output_language: None,
            offset: FixedOffset::east_opt(0).unwrap(),
        };
        let frames = vec![
            Frame {
                path: PathBuf::from("/tmp/a.png"),
                offset_secs: 0.0,
            },
            Frame {
                path: PathBuf::from("/tmp/b.png"),
                offset_secs: 75.0,
            },
        ];
        let prompt = frame_description_prompt(&frames, &context);
        assert!(prompt.contains("2 screenshots"));
        assert!(prompt.contains("Frame 2: at 01:15"));

        let descriptions = vec![FrameDescription {
            offset_secs: 75.0,
            description: "Reading docs".into(),
        }];
        let prompt = segment_merge_prompt(&descriptions, 900.0, &context);
        assert!(prompt.contains("[01:15] Reading docs"));
        assert!(prompt.contains("no later than 15:00"));
    }
}
