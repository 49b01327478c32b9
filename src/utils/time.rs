use chrono::{FixedOffset, NaiveTime, TimeZone, Timelike};

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

const CLOCK_FORMATS_12H: &[&str] = &["%I:%M:%S %p", "%I:%M %p"];
const CLOCK_FORMATS_24H: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parse a time-of-day string into seconds after midnight.
///
/// Accepts the shapes models actually emit: `9:05 AM`, `09:05:30 pm`,
/// `9:05AM`, `9 AM`, `21:05`, `21:05:30`.
pub fn parse_clock(text: &str) -> Option<u32> {
    let normalized = normalize_meridiem(text.trim());
    if normalized.is_empty() {
        return None;
    }

    let has_meridiem = normalized.ends_with("AM") || normalized.ends_with("PM");
    let formats = if has_meridiem {
        CLOCK_FORMATS_12H
    } else {
        CLOCK_FORMATS_24H
    };

    formats
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&normalized, fmt).ok())
        .map(|time| time.num_seconds_from_midnight())
}

/// Uppercases the meridiem and makes sure it is separated by one space.
fn normalize_meridiem(text: &str) -> String {
    let upper = text.to_ascii_uppercase().replace('.', "");
    for suffix in ["AM", "PM"] {
        if let Some(head) = upper.strip_suffix(suffix) {
            let head = head.trim_end();
            // `9 PM` carries no minutes; chrono needs them.
            if head.contains(':') {
                return format!("{head} {suffix}");
            }
            return format!("{head}:00 {suffix}");
        }
    }
    upper
}

/// Render seconds after midnight as `h:mm AM`. Seconds are kept only when non-zero.
pub fn format_clock(seconds_of_day: u32) -> String {
    let secs = seconds_of_day % SECONDS_PER_DAY;
    let hour = secs / 3600;
    let minute = (secs % 3600) / 60;
    let second = secs % 60;
    let (display_hour, meridiem) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    if second == 0 {
        format!("{display_hour}:{minute:02} {meridiem}")
    } else {
        format!("{display_hour}:{minute:02}:{second:02} {meridiem}")
    }
}

/// Wall-clock string for an epoch timestamp in the given offset.
pub fn format_epoch(epoch_secs: i64, offset: &FixedOffset) -> String {
    let Some(local) = offset.timestamp_opt(epoch_secs, 0).single() else {
        return format_clock(0);
    };
    format_clock(local.num_seconds_from_midnight())
}

/// Seconds after midnight for an epoch timestamp in the given offset.
pub fn seconds_of_day(epoch_secs: i64, offset: &FixedOffset) -> u32 {
    offset
        .timestamp_opt(epoch_secs, 0)
        .single()
        .map(|local| local.num_seconds_from_midnight())
        .unwrap_or(0)
}

/// Forward distance in seconds from `start` to `end`, wrapping past midnight.
pub fn clock_span_secs(start: u32, end: u32) -> u32 {
    if end < start {
        end + SECONDS_PER_DAY - start
    } else {
        end - start
    }
}

/// Duration in minutes between two time-of-day strings (midnight wrap aware).
pub fn clock_duration_minutes(start: &str, end: &str) -> Option<f64> {
    let start = parse_clock(start)?;
    let end = parse_clock(end)?;
    Some(f64::from(clock_span_secs(start, end)) / 60.0)
}

/// Parse an elapsed offset such as `HH:MM:SS`, `MM:SS`, `SS` or `MM:SS.5`.
pub fn parse_elapsed(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    for (idx, part) in parts.iter().enumerate() {
        let value: f64 = part.trim().parse().ok()?;
        if value < 0.0 || !value.is_finite() {
            return None;
        }
        // Only the leading component may exceed 59.
        if idx > 0 && value >= 60.0 {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}

/// Render an elapsed offset as `MM:SS`, or `HH:MM:SS` past the hour.
pub fn format_elapsed(total_secs: f64) -> String {
    let secs = total_secs.max(0.0).round() as u64;
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Local offset of this machine right now; resolved once at construction time.
pub fn local_offset() -> FixedOffset {
    *chrono::Local::now().offset()
}

/// Offset from a configured minute count, falling back to the local offset.
pub fn offset_from_minutes(minutes: Option<i32>) -> FixedOffset {
    minutes
        .and_then(|m| FixedOffset::east_opt(m * 60))
        .unwrap_or_else(local_offset)
}
