use crate::error::ValidationFailure;
use crate::models::ActivityCard;
use crate::utils::range::MINUTES_PER_DAY;
use crate::utils::time::format_clock;
use crate::utils::{merge_ranges, TimeRange};

use super::ValidationConfig;

/// Project cards in list order, carrying a day forward whenever a card starts
/// well before its predecessor (the list crossed midnight).
fn timeline_ranges(cards: &[ActivityCard]) -> Vec<TimeRange> {
    let mut day_shift = 0.0;
    let mut previous_start: Option<f64> = None;
    let mut ranges = Vec::with_capacity(cards.len());

    for card in cards {
        let Some(mut range) = TimeRange::from_card(card) else {
            continue;
        };
        range.start += day_shift;
        range.end += day_shift;
        if let Some(prev) = previous_start {
            if range.start + MINUTES_PER_DAY / 2.0 < prev {
                day_shift += MINUTES_PER_DAY;
                range.start += MINUTES_PER_DAY;
                range.end += MINUTES_PER_DAY;
            }
        }
        previous_start = Some(range.start);
        ranges.push(range);
    }
    ranges
}

/// Check that `output` covers every minute `existing` covered and every
/// observed minute, give or take the configured tolerance. Vacuously true
/// when there is neither.
///
/// `observed` is on the minute axis of `observation_ranges`.
pub fn check_coverage(
    existing: &[ActivityCard],
    observed: &[TimeRange],
    output: &[ActivityCard],
    config: &ValidationConfig,
) -> Result<(), ValidationFailure> {
    if existing.is_empty() && observed.is_empty() {
        return Ok(());
    }

    let tolerance = config.coverage_tolerance_minutes;
    let mut reference = timeline_ranges(existing);
    let day_behind = match (reference.first(), observed.first()) {
        (Some(card), Some(seen)) => seen.start + MINUTES_PER_DAY / 2.0 < card.start,
        _ => false,
    };
    let shift = if day_behind { MINUTES_PER_DAY } else { 0.0 };
    reference.extend(
        observed
            .iter()
            .map(|r| TimeRange::new(r.start + shift, r.end + shift)),
    );
    let input_ranges = merge_ranges(reference);
    let mut output_ranges = timeline_ranges(output);

    // Output that restarts the day while the input sits late in the evening
    // belongs to the following day.
    if let Some(first_input) = input_ranges.first() {
        for range in &mut output_ranges {
            if range.start + MINUTES_PER_DAY / 2.0 < first_input.start {
                range.start += MINUTES_PER_DAY;
                range.end += MINUTES_PER_DAY;
            }
        }
    }
    output_ranges.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut uncovered: Vec<TimeRange> = Vec::new();
    let mut iterations = 0usize;

    for interval in &input_ranges {
        let mut position = interval.start;
        while position < interval.end {
            iterations += 1;
            if iterations > config.max_sweep_iterations {
                return Err(ValidationFailure::Coverage(format!(
                    "Coverage check gave up after {} steps. Return fewer, contiguous cards.\n{}",
                    config.max_sweep_iterations,
                    render_inputs(existing, observed, output)
                )));
            }

            let reach = output_ranges
                .iter()
                .filter(|r| r.start <= position + tolerance && r.end > position)
                .map(|r| r.end)
                .reduce(f64::max);

            match reach {
                Some(end) => position = end,
                None => {
                    let gap_end = output_ranges
                        .iter()
                        .map(|r| r.start)
                        .filter(|start| *start > position)
                        .reduce(f64::min)
                        .map_or(interval.end, |start| start.min(interval.end));
                    if gap_end - position > tolerance {
                        uncovered.push(TimeRange::new(position, gap_end));
                    }
                    position = gap_end;
                }
            }
        }
    }

    if uncovered.is_empty() {
        return Ok(());
    }

    let windows = uncovered
        .iter()
        .map(|gap| {
            format!(
                "- {} to {} ({:.0} minutes)",
                clock_at(gap.start),
                clock_at(gap.end),
                gap.duration()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Err(ValidationFailure::Coverage(format!(
        "Coverage check failed: your cards leave parts of the timeline uncovered.\n\
         Uncovered time windows:\n{windows}\n{}\n\
         Every minute covered by the existing cards or the observations must be covered by your cards. Extend or add cards so there are no gaps.",
        render_inputs(existing, observed, output)
    )))
}

fn clock_at(minute: f64) -> String {
    let secs = (minute.rem_euclid(MINUTES_PER_DAY) * 60.0).round() as u32;
    format_clock(secs)
}

fn render_inputs(
    existing: &[ActivityCard],
    observed: &[TimeRange],
    output: &[ActivityCard],
) -> String {
    let mut text = format!("Existing cards:\n{}\n", render_cards(existing));
    if !observed.is_empty() {
        let spans = merge_ranges(observed.to_vec())
            .iter()
            .map(|r| format!("- {} - {}", clock_at(r.start), clock_at(r.end)))
            .collect::<Vec<_>>()
            .join("\n");
        text.push_str(&format!("Observed time:\n{spans}\n"));
    }
    text.push_str(&format!("Your cards:\n{}", render_cards(output)));
    text
}

fn render_cards(cards: &[ActivityCard]) -> String {
    if cards.is_empty() {
        return "(none)".to_string();
    }
    cards
        .iter()
        .map(|card| format!("- {} - {}: {}", card.start_time, card.end_time, card.title))
        .collect::<Vec<_>>()
        .join("\n")
}
