//! Lenient parsing of model replies.
//!
//! Models wrap JSON in prose or code fences, use strings for numbers and skip fields. The reply
//! is cut to the span between the first `{` and the last `}` and read through
//! [serde_json::Value] so that one odd field does not discard the whole reply.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::{
    daemon::storage::entities::{
        ActivityCardEntity, AppSite, Category, Distraction, ObservationEntity,
    },
    utils::time::local_to_utc,
};

const FALLBACK_TEXT_LENGTH: usize = 500;
const UNTITLED: &str = "Untitled activity";

/// Returns the outermost `{ ... }` span of `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Reads `{"observations": [...]}`. A reply that looks like JSON but can't be parsed becomes a
/// single observation spanning the chunk so the description is not lost.
pub fn parse_observations(text: &str, duration: f64) -> Vec<ObservationEntity> {
    let Some(json) = extract_json_object(text) else {
        warn!("Reply contains no JSON object: {}", prefix(text, 200));
        return vec![];
    };
    let value = match serde_json::from_str::<Value>(json) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse observations: {e}");
            return vec![ObservationEntity {
                start_ts: 0.,
                end_ts: duration,
                text: prefix(text, FALLBACK_TEXT_LENGTH).to_string(),
                app_name: None,
                window_title: None,
            }];
        }
    };

    items(&value, "observations")
        .map(|item| ObservationEntity {
            start_ts: number(item.get("start_ts")).unwrap_or(0.),
            end_ts: number(item.get("end_ts")).unwrap_or(duration),
            text: string(item.get("text")).unwrap_or_default(),
            app_name: string(item.get("app_name")),
            window_title: string(item.get("window_title")),
        })
        .collect()
}

/// Reads `{"cards": [...]}` produced for a chunk spanning `start..end`. Missing or unreadable
/// times fall back to the chunk bounds.
pub fn parse_cards(text: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ActivityCardEntity> {
    let Some(json) = extract_json_object(text) else {
        warn!("Reply contains no JSON object: {}", prefix(text, 200));
        return vec![];
    };
    let value = match serde_json::from_str::<Value>(json) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse cards: {e}");
            return vec![];
        }
    };

    items(&value, "cards")
        .map(|item| {
            let app_sites = items(item, "app_sites")
                .filter_map(|app| {
                    Some(AppSite {
                        name: string(app.get("name"))?,
                        duration_seconds: number(app.get("duration_seconds")).unwrap_or(0.),
                    })
                })
                .collect();
            let distractions = items(item, "distractions")
                .map(|d| Distraction {
                    description: string(d.get("description")).unwrap_or_default(),
                    timestamp: number(d.get("timestamp")).unwrap_or(0.),
                    duration_seconds: number(d.get("duration_seconds")).unwrap_or(0.),
                })
                .collect();

            ActivityCardEntity {
                id: None,
                category: string(item.get("category"))
                    .map(|v| Category::parse_lenient(&v))
                    .unwrap_or(Category::Other),
                title: string(item.get("title"))
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string()),
                summary: string(item.get("summary")).unwrap_or_default(),
                start_time: string(item.get("start_time"))
                    .and_then(|v| parse_time(&v))
                    .unwrap_or(start),
                end_time: string(item.get("end_time"))
                    .and_then(|v| parse_time(&v))
                    .unwrap_or(end),
                app_sites,
                distractions,
                productivity_score: number(item.get("productivity_score")).unwrap_or(0.),
            }
            .normalized()
        })
        .collect()
}

/// RFC 3339 times keep their offset, times without one are local.
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(local_to_utc)
}

fn items<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone};

    use super::*;

    #[test]
    fn json_is_found_inside_prose() {
        let text = "Sure!\n```json\n{\"a\": {\"b\": 1}}\n```";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("} nothing {"), None);
        assert_eq!(extract_json_object("plain"), None);
    }

    #[test]
    fn observations_fill_missing_bounds() {
        let text = r#"{"observations": [
            {"start_ts": 0, "end_ts": 30, "text": "Writing code"},
            {"start_ts": "30", "text": "Reading docs", "app_name": "Firefox"}
        ]}"#;

        let observations = parse_observations(text, 60.);

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].end_ts, 30.);
        assert_eq!(observations[1].start_ts, 30.);
        assert_eq!(observations[1].end_ts, 60.);
        assert_eq!(observations[1].app_name.as_deref(), Some("Firefox"));
    }

    #[test]
    fn broken_observation_json_keeps_the_text() {
        let text = format!("{{ broken {} }}", "x".repeat(600));

        let observations = parse_observations(&text, 60.);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].start_ts, 0.);
        assert_eq!(observations[0].end_ts, 60.);
        assert_eq!(observations[0].text.chars().count(), 500);
        assert!(parse_observations("no json here", 60.).is_empty());
    }

    #[test]
    fn cards_are_parsed_leniently() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 9, 1, 0).unwrap();
        let text = r#"Here you go: {"cards": [{
            "category": "编程",
            "title": "Dayflow development",
            "summary": "Login flow",
            "start_time": "2024-03-01T09:00:10Z",
            "end_time": "garbage",
            "app_sites": [{"name": "Visual Studio Code", "duration_seconds": 50}, {"oops": 1}],
            "distractions": [{"description": "Chat", "timestamp": 20, "duration_seconds": 5}],
            "productivity_score": "140"
        }, {"title": ""}]}"#;

        let cards = parse_cards(text, start, end);

        assert_eq!(cards.len(), 2);
        let card = &cards[0];
        assert_eq!(card.category, Category::Coding);
        assert_eq!(card.start_time, start + chrono::Duration::seconds(10));
        assert_eq!(card.end_time, end);
        assert_eq!(card.app_sites.len(), 1);
        assert_eq!(card.distractions[0].description, "Chat");
        assert_eq!(card.productivity_score, 100.);

        assert_eq!(cards[1].category, Category::Other);
        assert_eq!(cards[1].title, UNTITLED);
        assert_eq!(cards[1].start_time, start);
    }

    #[test]
    fn broken_card_json_is_empty() {
        let now = Utc::now();
        assert!(parse_cards("{ nope }", now, now).is_empty());
        assert!(parse_cards("nothing", now, now).is_empty());
    }

    #[test]
    fn naive_times_are_local() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_time("2024-03-01T10:30:00"), Some(expected));
        assert_eq!(parse_time("2024-03-01 10:30"), Some(expected));
        assert_eq!(
            parse_time("2024-03-01T10:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(parse_time("yesterday"), None);
    }
}
