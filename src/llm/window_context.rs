//! Window samples recorded alongside a chunk.
//!
//! The model sees the collapsed window history as text. After transcription the recorded
//! history is also trusted over whatever application the model guessed.

use std::{collections::HashMap, fmt::Write};

use crate::daemon::{chunk::WindowSample, storage::entities::ObservationEntity};

/// Consecutive samples with the same application and title collapsed into one line each:
/// `- [0s - 12s] Firefox: Rust docs`. The last line ends at `duration`.
pub fn window_info_text(samples: &[WindowSample], duration: f64) -> String {
    let mut text = String::new();
    let mut current: Option<(&str, &str, f64)> = None;
    for sample in samples {
        let changed = current.map_or(true, |(app, title, _)| {
            app != sample.app_name || title != sample.window_title
        });
        if !changed {
            continue;
        }
        if let Some((app, title, start)) = current {
            push_line(&mut text, app, title, start, sample.timestamp);
        }
        current = Some((&sample.app_name, &sample.window_title, sample.timestamp));
    }
    if let Some((app, title, start)) = current {
        push_line(&mut text, app, title, start, duration);
    }
    text
}

fn push_line(text: &mut String, app: &str, title: &str, start: f64, end: f64) {
    let _ = write!(text, "- [{start:.0}s - {end:.0}s] {app}");
    if !title.is_empty() {
        let _ = write!(text, ": {title}");
    }
    text.push('\n');
}

struct Segment<'a> {
    start: f64,
    end: f64,
    app: &'a str,
    title: &'a str,
}

/// Splits samples into segments whenever the application changes. A segment keeps the title
/// seen when it started.
fn app_segments(samples: &[WindowSample], duration: f64) -> Vec<Segment<'_>> {
    let mut segments: Vec<Segment> = vec![];
    for sample in samples {
        if let Some(last) = segments.last_mut() {
            if last.app == sample.app_name {
                continue;
            }
            last.end = sample.timestamp;
        }
        segments.push(Segment {
            start: sample.timestamp,
            end: duration,
            app: &sample.app_name,
            title: &sample.window_title,
        });
    }
    segments
}

/// Replaces the application of every observation with the one that was focused for the
/// longest part of it. Observations that overlap no sample are left as they are.
pub fn apply_window_records(
    observations: &mut [ObservationEntity],
    samples: &[WindowSample],
    duration: f64,
) {
    let segments = app_segments(samples, duration);
    if segments.is_empty() {
        return;
    }

    for observation in observations {
        let mut overlaps: Vec<(&str, f64, &str)> = vec![];
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for segment in &segments {
            let overlap = observation.end_ts.min(segment.end) - observation.start_ts.max(segment.start);
            if overlap <= 0. {
                continue;
            }
            match positions.get(segment.app) {
                Some(&i) => overlaps[i].1 += overlap,
                None => {
                    positions.insert(segment.app, overlaps.len());
                    overlaps.push((segment.app, overlap, segment.title));
                }
            }
        }

        // First application wins ties.
        let main = overlaps
            .into_iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best });
        if let Some((app, _, title)) = main {
            observation.app_name = Some(app.to_string());
            observation.window_title = Some(title.to_string());
        }
    }
}
