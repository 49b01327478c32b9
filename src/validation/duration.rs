use crate::error::ValidationFailure;
use crate::models::ActivityCard;

use super::ValidationConfig;

/// Every card but the last must fall inside the configured length bounds.
/// The last card may still be in progress and is exempt.
pub fn check_durations(
    cards: &[ActivityCard],
    config: &ValidationConfig,
) -> Result<(), ValidationFailure> {
    let Some((_, checked)) = cards.split_last() else {
        return Ok(());
    };

    let mut problems = Vec::new();
    for card in checked {
        let Some(minutes) = card.duration_minutes() else {
            problems.push(format!(
                "- \"{}\" has unreadable times ({} - {})",
                card.title, card.start_time, card.end_time
            ));
            continue;
        };

        if minutes < config.min_card_minutes {
            problems.push(format!(
                "- \"{}\" ({} - {}) lasts {} minutes, shorter than the {} minute minimum",
                card.title,
                card.start_time,
                card.end_time,
                format_minutes(minutes),
                format_minutes(config.min_card_minutes)
            ));
        } else if minutes > config.max_card_minutes {
            problems.push(format!(
                "- \"{}\" ({} - {}) lasts {} minutes, longer than the {} minute maximum",
                card.title,
                card.start_time,
                card.end_time,
                format_minutes(minutes),
                format_minutes(config.max_card_minutes)
            ));
        }
    }

    if problems.is_empty() {
        return Ok(());
    }

    Err(ValidationFailure::Duration(format!(
        "Duration check failed. Every card except the last must last between {} and {} minutes:\n{}\n\
         Merge short cards into a neighbour and split long ones, keeping the timeline contiguous.",
        format_minutes(config.min_card_minutes),
        format_minutes(config.max_card_minutes),
        problems.join("\n")
    )))
}

fn format_minutes(minutes: f64) -> String {
    let rounded = (minutes * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(start: &str, end: &str) -> ActivityCard {
        ActivityCard::placeholder(start, end)
    }

    #[test]
    fn just_under_ten_minutes_fails() {
        let config = ValidationConfig::default();
        let cards = vec![
            card("9:00:00 AM", "9:09:54 AM"),
            card("9:09:54 AM", "9:30:00 AM"),
        ];
        let err = check_durations(&cards, &config).unwrap_err();
        assert!(matches!(err, ValidationFailure::Duration(_)));
        assert!(err.diagnostic().contains("lasts 9.9 minutes"), "{}", err.diagnostic());
        assert!(err.diagnostic().contains(&cards[0].title));
    }

    #[test]
    fn exactly_ten_minutes_passes() {
        let config = ValidationConfig::default();
        let cards = vec![card("9:00 AM", "9:10 AM"), card("9:10 AM", "9:30 AM")];
        assert!(check_durations(&cards, &config).is_ok());
    }

    #[test]
    fn last_card_is_exempt() {
        let config = ValidationConfig::default();
        let cards = vec![card("9:00 AM", "9:20 AM"), card("9:20 AM", "9:22 AM")];
        assert!(check_durations(&cards, &config).is_ok());
        assert!(check_durations(&[card("9:00 AM", "9:01 AM")], &config).is_ok());
        assert!(check_durations(&[], &config).is_ok());
    }

    #[test]
    fn overlong_cards_fail() {
        let config = ValidationConfig::default();
        let cards = vec![card("9:00 AM", "10:30 AM"), card("10:30 AM", "10:45 AM")];
        let err = check_durations(&cards, &config).unwrap_err();
        assert!(err.diagnostic().contains("longer than the 60 minute maximum"));
    }

    #[test]
    fn measures_across_midnight() {
        let config = ValidationConfig::default();
        let cards = vec![card("11:55 PM", "12:15 AM"), card("12:15 AM", "12:20 AM")];
        assert!(check_durations(&cards, &config).is_ok());
    }
}
