use crate::error::ValidationFailure;
use crate::models::VideoSegment;
use crate::utils::time::format_elapsed;

/// Segments must be ordered, non-overlapping, described, and inside
/// `[0, batch_duration]` give or take `slack_secs`.
pub fn check_segments(
    segments: &[VideoSegment],
    batch_duration_secs: f64,
    slack_secs: f64,
) -> Result<(), ValidationFailure> {
    let mut problems = Vec::new();
    let mut previous_end: Option<f64> = None;

    for (idx, segment) in segments.iter().enumerate() {
        let label = format!(
            "segment {} ({} - {})",
            idx + 1,
            format_elapsed(segment.start_secs),
            format_elapsed(segment.end_secs)
        );

        if segment.end_secs <= segment.start_secs {
            problems.push(format!("- {label} ends before it starts"));
        }
        if segment.end_secs > batch_duration_secs + slack_secs {
            problems.push(format!(
                "- {label} runs past the end of the recording at {}",
                format_elapsed(batch_duration_secs)
            ));
        }
        if segment.description.trim().is_empty() {
            problems.push(format!("- {label} has no description"));
        }
        if let Some(prev) = previous_end {
            if segment.start_secs + slack_secs < prev {
                problems.push(format!("- {label} overlaps the previous segment"));
            }
        }
        previous_end = Some(segment.end_secs);
    }

    if problems.is_empty() {
        return Ok(());
    }

    Err(ValidationFailure::Segments(format!(
        "Segment check failed:\n{}\nReturn ordered, non-overlapping segments between 00:00 and {}, each with a description.",
        problems.join("\n"),
        format_elapsed(batch_duration_secs)
    )))
}
