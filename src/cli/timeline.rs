use std::path::Path;

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::Parser;

use crate::{
    daemon::storage::{
        db::Database,
        entities::{ActivityCardEntity, Category},
    },
    utils::dir::database_path,
};

use super::{output::stats::StatsCollector, range::RangeArgs};

#[derive(Debug, Parser)]
pub struct TimelineCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, help = "Print without colors")]
    no_color: bool,
}

/// Prints the activity cards of the selected days, grouped by local day.
pub async fn process_timeline_command(app_dir: &Path, command: TimelineCommand) -> Result<()> {
    let (start, end) = command.range.resolve()?;
    let stats = StatsCollector::new(Database::open(database_path(app_dir))?);
    let cards = stats.cards_in_range(start, end).await?;

    if cards.is_empty() {
        println!("No activity recorded between {start} and {end}");
        return Ok(());
    }
    print!("{}", render_timeline(&cards, !command.no_color));
    Ok(())
}

pub fn render_timeline(cards: &[ActivityCardEntity], colored: bool) -> String {
    let mut output = String::new();
    let mut current_day: Option<NaiveDate> = None;
    for card in cards {
        let start = card.start_time.with_timezone(&Local);
        let end = card.end_time.with_timezone(&Local);
        let day = start.date_naive();
        if current_day != Some(day) {
            if current_day.is_some() {
                output.push('\n');
            }
            let header = day.format("%A %Y-%m-%d").to_string();
            output.push_str(&paint(Style::new().bold(), &header, colored));
            output.push('\n');
            current_day = Some(day);
        }

        let apps: Vec<_> = card.app_sites.iter().map(|v| v.name.as_str()).collect();
        let apps = if apps.is_empty() {
            String::new()
        } else {
            format!("  ({})", apps.join(", "))
        };
        output.push_str(&format!(
            "{}-{}  {:>3}  {}  {}{}\n",
            start.format("%H:%M"),
            end.format("%H:%M"),
            card.productivity_score.round() as i64,
            paint(
                category_colour(card.category).normal(),
                &format!("{:<13}", card.category.as_str()),
                colored
            ),
            card.title,
            apps
        ));
    }
    output
}

fn paint(style: Style, text: &str, colored: bool) -> String {
    if colored {
        style.paint(text).to_string()
    } else {
        text.to_string()
    }
}

pub(crate) fn category_colour(category: Category) -> Colour {
    let hex = category.color().trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|v| u8::from_str_radix(v, 16).ok())
            .unwrap_or(u8::MAX)
    };
    Colour::RGB(channel(0), channel(2), channel(4))
}
