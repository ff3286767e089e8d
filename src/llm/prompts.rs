use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::daemon::storage::entities::{ActivityCardEntity, ObservationEntity};

pub const TRANSCRIBE_SYSTEM_PROMPT: &str = r#"You analyze screen activity. Using the screenshots and the window information, describe what the user is doing.

Reply with JSON:
{
  "observations": [
    {"start_ts": 0, "end_ts": 10, "text": "Writing Python code for the login form"}
  ]
}

Rules:
- start_ts/end_ts are seconds from the start of the recording
- text describes only the behaviour (what code is written, what is read, what is done), not the application name
- use window titles for context (file names, page titles, chat partners)
- reply with JSON only"#;

pub const GENERATE_CARDS_SYSTEM_PROMPT: &str = r#"You are a time management assistant. Turn the observations into activity cards.

Reply with JSON:
{
  "cards": [
    {
      "category": "Coding",
      "title": "Dayflow development",
      "summary": "Implemented the login form and wrote unit tests",
      "start_time": "2024-01-01T10:00:00",
      "end_time": "2024-01-01T11:30:00",
      "app_sites": [{"name": "Visual Studio Code", "duration_seconds": 5400}],
      "distractions": [],
      "productivity_score": 85
    }
  ]
}

Categories:
- Coding: writing code, debugging, code review
- Work: documents, email, project management, design
- Learning: tutorials, reading documentation, taking notes
- Meeting: video conferences, voice calls
- Social: chatting, social media
- Entertainment: videos, games, music
- Rest: no visible activity
- Other: anything else

productivity_score:
- 90-100: focused core work (coding, writing, design)
- 70-89: regular work (email, documents, meetings)
- 50-69: inefficient work (frequent switching, fragmented tasks)
- 30-49: light entertainment (browsing, social)
- 0-29: pure entertainment (games, videos)

Merge consecutive observations of the same application and similar activity into one card.
Split a period into several cards when the kind of activity changes.

Continuity: when the last previous card describes the same kind of activity as the first
observations, continue it instead of starting something new and reflect that in the title.

Reply with JSON only"#;

pub fn transcribe_text(duration: f64, frame_count: usize, window_info: &str) -> String {
    let mut text = format!(
        "These are {frame_count} key frames of a {duration:.0} second screen recording. Describe the user's activity."
    );
    if !window_info.is_empty() {
        text.push_str("\n\nWindow information:\n");
        text.push_str(window_info);
    }
    text
}

/// Observations, the recording start and the last `context_limit` previous cards.
pub fn cards_text(
    observations: &[ObservationEntity],
    start: DateTime<Utc>,
    context_cards: &[ActivityCardEntity],
    context_limit: usize,
) -> String {
    let mut text = String::from("Observations:\n");
    for observation in observations {
        let _ = write!(
            text,
            "- [{:.0}s - {:.0}s] {}",
            observation.start_ts, observation.end_ts, observation.text
        );
        if let Some(app) = &observation.app_name {
            let _ = write!(text, " (app: {app})");
        }
        text.push('\n');
    }

    let _ = write!(
        text,
        "\nRecording started at: {}",
        start.with_timezone(&Local).format("%Y-%m-%dT%H:%M:%S")
    );

    let skip = context_cards.len().saturating_sub(context_limit);
    let context = &context_cards[skip..];
    if !context.is_empty() {
        text.push_str("\n\nPrevious activity cards:\n");
        for card in context {
            let _ = writeln!(text, "- {}: {}", card.category, card.title);
        }
    }
    text
}
