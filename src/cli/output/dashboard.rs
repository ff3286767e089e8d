//! Self-contained HTML report of a date range.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::daemon::storage::entities::Category;

use super::stats::{
    activities, category_distribution, format_minutes, overview, top_applications, ActivityRow,
    AppUsage, CategoryShare, DayTrend, HourEfficiency, Overview, StatsCollector,
};

const TEMPLATE: &str = include_str!("dashboard.html");
const TOP_APPLICATIONS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub title: String,
    pub date_range: String,
    pub generated_at: String,
    pub overview: Overview,
    pub total_formatted: String,
    pub deep_work_formatted: String,
    pub category_distribution: Vec<CategoryShare>,
    /// Hours of the last day of the range.
    pub hourly_efficiency: Vec<HourEfficiency>,
    pub weekly_trend: Vec<DayTrend>,
    pub top_applications: Vec<AppUsage>,
    pub activities: Vec<ActivityRow>,
    pub categories: Vec<String>,
    pub category_colors: BTreeMap<&'static str, &'static str>,
}

pub struct DashboardExporter {
    stats: StatsCollector,
}

impl DashboardExporter {
    pub fn new(stats: StatsCollector) -> Self {
        Self { stats }
    }

    pub async fn collect(&self, start: NaiveDate, end: NaiveDate) -> Result<DashboardData> {
        let cards = self.stats.cards_in_range(start, end).await?;
        let overview = overview(&cards);
        let activities = activities(&cards);

        let mut categories: Vec<String> =
            activities.iter().map(|v| v.category.to_string()).collect();
        categories.sort();
        categories.dedup();

        let date_range = if start == end {
            start.format("%Y-%m-%d").to_string()
        } else {
            format!("{} - {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
        };

        Ok(DashboardData {
            title: format!("Dayflow productivity report - {date_range}"),
            date_range,
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            total_formatted: format_minutes(overview.total_minutes),
            deep_work_formatted: format_minutes(overview.deep_work_minutes),
            overview,
            category_distribution: category_distribution(&cards),
            hourly_efficiency: self.stats.hourly_efficiency(end).await?,
            weekly_trend: self.stats.weekly_trend(end).await?,
            top_applications: top_applications(&cards, TOP_APPLICATIONS),
            activities,
            categories,
            category_colors: Category::ALL
                .iter()
                .map(|v| (v.as_str(), v.color()))
                .collect(),
        })
    }

    /// Writes the report into `output_dir` and returns its path.
    pub async fn export(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("failed to create {}", output_dir.display()))?;

        let data = self.collect(start, end).await?;
        let html = render(&data)?;
        let path = output_dir.join(report_file_name(start, end));
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Exported dashboard to {path:?}");
        Ok(path)
    }
}

pub fn report_file_name(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        format!("dayflow_report_{start}.html")
    } else {
        format!("dayflow_report_{start}_{end}.html")
    }
}

pub fn render(data: &DashboardData) -> Result<String> {
    // `<` is escaped so that text can't close the script element the data lives in.
    let json = serde_json::to_string(data)?.replace('<', "\\u003c");
    Ok(TEMPLATE
        .replace("{{TITLE}}", &escape_html(&data.title))
        .replace("{{GENERATED_AT}}", &escape_html(&data.generated_at))
        .replace("{{TOTAL}}", &escape_html(&data.total_formatted))
        .replace(
            "{{PRODUCTIVITY}}",
            &format!("{:.1}", data.overview.avg_productivity),
        )
        .replace("{{DEEP_WORK}}", &escape_html(&data.deep_work_formatted))
        .replace(
            "{{ACTIVITY_COUNT}}",
            &data.overview.activity_count.to_string(),
        )
        .replace("{{DATA}}", &json))
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
