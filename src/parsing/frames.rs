use serde_json::Value;

use crate::error::ParseFailure;
use crate::models::{Frame, FrameDescription, VideoSegment};
use crate::utils::time::parse_elapsed;

use super::{contains_json, parse_list};

struct RawDescription {
    /// 1-based frame number, when the model echoed one.
    frame: Option<usize>,
    text: String,
}

/// Pair the model's descriptions with the frames that were sent.
///
/// Structured output is tried first. Only when the reply holds no JSON at all
/// is each non-empty line taken as the description of the next frame, in
/// order; JSON with unusable items stays a failure.
pub fn parse_frame_descriptions(
    raw: &str,
    frames: &[Frame],
) -> Result<Vec<FrameDescription>, ParseFailure> {
    let items = match parse_list(raw, "frame descriptions", "frames", raw_description) {
        Ok(items) => items,
        Err(structured) if contains_json(raw, "frames") => return Err(structured),
        Err(structured) => {
            let lines = description_lines(raw);
            if lines.is_empty() {
                return Err(structured);
            }
            lines
                .into_iter()
                .map(|text| RawDescription { frame: None, text })
                .collect()
        }
    };

    let mut slots: Vec<Option<String>> = vec![None; frames.len()];
    for (position, item) in items.into_iter().enumerate() {
        let index = item
            .frame
            .and_then(|n| n.checked_sub(1))
            .filter(|idx| *idx < frames.len())
            .unwrap_or(position);
        if let Some(slot) = slots.get_mut(index) {
            slot.get_or_insert(item.text);
        }
    }

    let paired: Vec<FrameDescription> = frames
        .iter()
        .zip(slots)
        .filter_map(|(frame, text)| {
            text.map(|description| FrameDescription {
                offset_secs: frame.offset_secs,
                description,
            })
        })
        .collect();

    if paired.is_empty() {
        return Err(ParseFailure::new(
            "frame descriptions",
            "no description could be paired with a frame",
            raw,
        ));
    }
    Ok(paired)
}

fn raw_description(value: &Value) -> Option<RawDescription> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(RawDescription {
            frame: None,
            text: text.trim().to_string(),
        }),
        Value::Object(map) => {
            let text = map
                .get("description")
                .or_else(|| map.get("text"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())?;
            let frame = map
                .get("frame")
                .or_else(|| map.get("index"))
                .and_then(Value::as_u64)
                .map(|n| n as usize);
            Some(RawDescription {
                frame,
                text: text.to_string(),
            })
        }
        _ => None,
    }
}

/// Non-empty lines with list markers (`1.`, `2)`, `-`, `Frame 3:`) removed.
fn description_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let mut rest = line.trim();
    if let Some(stripped) = rest.strip_prefix("- ").or_else(|| rest.strip_prefix("* ")) {
        rest = stripped;
    }
    if let Some(head) = rest.get(..5).filter(|head| head.eq_ignore_ascii_case("frame")) {
        let after = rest[head.len()..].trim_start();
        if after.starts_with(|c: char| c.is_ascii_digit()) {
            rest = after;
        }
    }
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(stripped) = after
            .strip_prefix('.')
            .or_else(|| after.strip_prefix(')'))
            .or_else(|| after.strip_prefix(':'))
        {
            rest = stripped;
        }
    }
    rest.trim()
}

/// Decode `{"segments":[{start,end,description}]}` with batch-relative times.
pub fn parse_segments(raw: &str) -> Result<Vec<VideoSegment>, ParseFailure> {
    parse_list(raw, "segments", "segments", segment_from_value)
}

fn segment_from_value(value: &Value) -> Option<VideoSegment> {
    let map = value.as_object()?;
    let start_secs = elapsed_field(map.get("start")?)?;
    let end_secs = elapsed_field(map.get("end")?)?;
    let description = map
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    Some(VideoSegment {
        start_secs,
        end_secs,
        description,
    })
}

fn elapsed_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => parse_elapsed(text),
        Value::Number(number) => number.as_f64().filter(|secs| *secs >= 0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|idx| Frame {
                path: PathBuf::from(format!("/tmp/frame-{idx}.png")),
                offset_secs: idx as f64 * 15.0,
            })
            .collect()
    }

    #[test]
    fn structured_descriptions_use_echoed_frame_numbers() {
        let parsed = parse_frame_descriptions(
            r#"{"frames":[{"frame":2,"description":"Terminal running tests"},{"frame":1,"description":"Editor with parser.rs"}]}"#,
            &frames(2),
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].offset_secs, 0.0);
        assert_eq!(parsed[0].description, "Editor with parser.rs");
        assert_eq!(parsed[1].description, "Terminal running tests");
    }

    #[test]
    fn plain_lines_pair_positionally() {
        let parsed = parse_frame_descriptions(
            "1. Editor open on parser.rs\n\n2) Browser showing docs.rs\nFrame 3: Slack",
            &frames(3),
        )
        .unwrap();
        let texts: Vec<_> = parsed.iter().map(|d| d.description.as_str()).collect();
        assert_eq!(texts, ["Editor open on parser.rs", "Browser showing docs.rs", "Slack"]);
        assert_eq!(parsed[2].offset_secs, 30.0);
    }

    #[test]
    fn fewer_lines_than_frames_describes_a_prefix() {
        let parsed = parse_frame_descriptions("Editor\nBrowser", &frames(4)).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].offset_secs, 15.0);
    }

    #[test]
    fn json_with_unknown_keys_is_not_read_as_lines() {
        let raw = r#"{"frames":[{"frame":1,"desc":"Editor"},{"frame":2,"desc":"Browser"}]}"#;
        let err = parse_frame_descriptions(raw, &frames(2)).unwrap_err();
        assert_eq!(err.raw, raw);
        assert!(err.reason.contains("required field"), "{}", err.reason);

        let fenced = "Here you go:\n```json\n[{\"caption\": \"Editor\"}]\n```";
        assert!(parse_frame_descriptions(fenced, &frames(2)).is_err());
    }

    #[test]
    fn blank_output_fails() {
        assert!(parse_frame_descriptions("  \n ", &frames(2)).is_err());
    }

    #[test]
    fn segments_accept_clock_and_numeric_offsets() {
        let parsed = parse_segments(
            r#"```json
{"segments":[{"start":"00:00","end":"01:30","description":"Coding"},{"start":90,"end":"00:03:00","description":"Review"}]}
```"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].end_secs, 90.0);
        assert_eq!(parsed[1].start_secs, 90.0);
        assert_eq!(parsed[1].end_secs, 180.0);
    }

    #[test]
    fn segments_with_bad_times_are_dropped() {
        let err = parse_segments(r#"{"segments":[{"start":"later","end":"01:00","description":"x"}]}"#)
            .unwrap_err();
        assert_eq!(err.kind, "segments");
    }
}
