use std::{fmt::Write, path::Path};

use anyhow::Result;
use chrono::NaiveDate;

use crate::{daemon::storage::db::Database, utils::dir::database_path};

use super::output::{
    dashboard::{DashboardData, DashboardExporter},
    stats::{format_minutes, StatsCollector},
};

const BAR_WIDTH: usize = 30;

pub async fn process_stats_command(app_dir: &Path, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let stats = StatsCollector::new(Database::open(database_path(app_dir))?);
    let data = DashboardExporter::new(stats).collect(start, end).await?;
    print!("{}", render_stats(&data)?);
    Ok(())
}

pub fn render_stats(data: &DashboardData) -> Result<String> {
    let mut output = String::new();
    let overview = &data.overview;
    writeln!(output, "{}", data.date_range)?;
    writeln!(output, "Total time      {}", data.total_formatted)?;
    writeln!(output, "Productivity    {:.1}", overview.avg_productivity)?;
    writeln!(output, "Deep work       {}", data.deep_work_formatted)?;
    writeln!(output, "Activities      {}", overview.activity_count)?;

    if !data.category_distribution.is_empty() {
        writeln!(output, "\nCategories")?;
        for share in &data.category_distribution {
            writeln!(
                output,
                "  {:<14}{:>8}",
                share.name,
                format_minutes(share.minutes as i64)
            )?;
        }
    }

    if !data.top_applications.is_empty() {
        writeln!(output, "\nApplications")?;
        for app in &data.top_applications {
            writeln!(
                output,
                "  {:<24}{:>8}  {:>5.1}%",
                app.name,
                format_minutes(app.minutes as i64),
                app.percentage
            )?;
        }
    }

    let active_hours: Vec<_> = data
        .hourly_efficiency
        .iter()
        .filter(|v| v.minutes > 0.)
        .collect();
    if !active_hours.is_empty() {
        writeln!(output, "\nHourly efficiency")?;
        for hour in active_hours {
            writeln!(
                output,
                "  {:02}:00  {:>5.1}  {}",
                hour.hour,
                hour.score,
                bar(hour.score, 100.)
            )?;
        }
    }

    writeln!(output, "\nLast 7 days")?;
    let longest = data
        .weekly_trend
        .iter()
        .map(|v| v.minutes)
        .fold(0., f64::max);
    for day in &data.weekly_trend {
        writeln!(
            output,
            "  {} {}  {:>8}  {}",
            day.weekday,
            day.date,
            format_minutes(day.minutes as i64),
            bar(day.minutes, longest)
        )?;
    }
    Ok(output)
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0. {
        return String::new();
    }
    let filled = ((value / max).clamp(0., 1.) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(filled)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;

    use super::*;
    use crate::{cli::output::stats::tests::card_at, daemon::storage::entities::Category};

    #[test]
    fn bars_scale_to_maximum() {
        assert_eq!(bar(50., 100.), "#".repeat(15));
        assert_eq!(bar(150., 100.), "#".repeat(BAR_WIDTH));
        assert_eq!(bar(1., 0.), "");
    }

    #[tokio::test]
    async fn stats_are_rendered() -> Result<()> {
        let day = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        let db = Database::open_in_memory()?;
        db.insert_card(card_at(day, 9, 90, Category::Coding, 90., &[("Terminal", 5400.)]))
            .await?;
        db.insert_card(card_at(day, 13, 30, Category::Entertainment, 10., &[("YouTube", 1800.)]))
            .await?;
        let data = DashboardExporter::new(StatsCollector::new(db))
            .collect(day, day)
            .await?;

        let output = render_stats(&data)?;

        assert!(output.starts_with("2024-04-10\n"));
        assert!(output.contains("Total time      2h"));
        assert!(output.contains("Deep work       1h 30m"));
        assert!(output.contains(&format!("  {:<14}{:>8}", "Coding", "1h 30m")));
        assert!(output.contains(&format!("  {:<24}{:>8}   75.0%", "Terminal", "1h 30m")));
        assert!(output.contains("  09:00   90.0  "));
        assert_eq!(output.matches("Wed 04-10").count(), 1);
        Ok(())
    }
}
