//! Aggregations over activity cards used by `dayflow stats` and the dashboard.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate, Timelike};
use futures::future::try_join_all;
use serde::Serialize;

use crate::{
    daemon::storage::{
        db::Database,
        entities::{ActivityCardEntity, Category},
    },
    utils::time::{days_between, local_day_bounds},
};

/// Cards at or above this score count as deep work.
pub const DEEP_WORK_SCORE: f64 = 80.;
pub const TREND_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_minutes: i64,
    pub avg_productivity: f64,
    pub deep_work_minutes: i64,
    pub activity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub name: String,
    pub minutes: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourEfficiency {
    pub hour: u32,
    pub score: f64,
    pub minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTrend {
    pub date: String,
    pub weekday: String,
    pub minutes: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppUsage {
    pub name: String,
    pub minutes: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    pub start: String,
    pub end: String,
    pub date: String,
    pub category: Category,
    pub category_color: &'static str,
    pub title: String,
    pub summary: String,
    pub score: f64,
    pub minutes: f64,
    pub main_app: String,
    pub apps: Vec<String>,
}

/// Loads cards of local calendar days from the database.
#[derive(Clone)]
pub struct StatsCollector {
    db: Database,
}

impl StatsCollector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Cards starting within the local days `start..=end`.
    pub async fn cards_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityCardEntity>> {
        let (from, _) = local_day_bounds(start);
        let (_, to) = local_day_bounds(end);
        self.db.cards_between(from, to).await
    }

    pub async fn hourly_efficiency(&self, day: NaiveDate) -> Result<Vec<HourEfficiency>> {
        Ok(hourly_efficiency(&self.db.cards_for_day(day).await?))
    }

    /// The seven days ending at `end`, oldest first.
    pub async fn weekly_trend(&self, end: NaiveDate) -> Result<Vec<DayTrend>> {
        let days: Vec<_> = days_between(end - Duration::days(TREND_DAYS - 1), end).collect();
        let cards = try_join_all(days.iter().map(|day| self.db.cards_for_day(*day))).await?;
        Ok(days
            .iter()
            .zip(cards)
            .map(|(day, cards)| {
                let (minutes, score) = weighted_score(&cards);
                DayTrend {
                    date: day.format("%m-%d").to_string(),
                    weekday: day.format("%a").to_string(),
                    minutes: round1(minutes),
                    score: round1(score),
                }
            })
            .collect())
    }
}

pub fn overview(cards: &[ActivityCardEntity]) -> Overview {
    let total: f64 = cards.iter().map(|v| v.duration_minutes()).sum();
    let deep_work: f64 = cards
        .iter()
        .filter(|v| v.productivity_score >= DEEP_WORK_SCORE)
        .map(|v| v.duration_minutes())
        .sum();
    Overview {
        total_minutes: total as i64,
        avg_productivity: round1(weighted_score(cards).1),
        deep_work_minutes: deep_work as i64,
        activity_count: cards.len(),
    }
}

/// Minutes per category, largest first.
pub fn category_distribution(cards: &[ActivityCardEntity]) -> Vec<CategoryShare> {
    let mut minutes: HashMap<Category, f64> = HashMap::new();
    for card in cards {
        *minutes.entry(card.category).or_default() += card.duration_minutes();
    }
    let mut shares: Vec<_> = minutes.into_iter().collect();
    shares.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    shares
        .into_iter()
        .map(|(category, minutes)| CategoryShare {
            name: category.to_string(),
            minutes: round1(minutes),
            color: category.color(),
        })
        .collect()
}

/// Weighted score for each local hour. A card counts fully towards the hour it starts in.
pub fn hourly_efficiency(cards: &[ActivityCardEntity]) -> Vec<HourEfficiency> {
    let mut hours = [(0f64, 0f64); 24];
    for card in cards {
        let hour = card.start_time.with_timezone(&Local).hour() as usize;
        let minutes = card.duration_minutes();
        hours[hour].0 += card.productivity_score * minutes;
        hours[hour].1 += minutes;
    }
    hours
        .iter()
        .enumerate()
        .map(|(hour, (score_sum, minutes))| HourEfficiency {
            hour: hour as u32,
            score: if *minutes > 0. {
                round1(score_sum / minutes)
            } else {
                0.
            },
            minutes: round1(*minutes),
        })
        .collect()
}

/// Applications by time spent according to the model, with their share of all application
/// time.
pub fn top_applications(cards: &[ActivityCardEntity], limit: usize) -> Vec<AppUsage> {
    let mut order: Vec<&str> = vec![];
    let mut minutes: HashMap<&str, f64> = HashMap::new();
    for site in cards.iter().flat_map(|v| &v.app_sites) {
        let entry = minutes.entry(&site.name).or_insert_with(|| {
            order.push(&site.name);
            0.
        });
        *entry += site.duration_seconds / 60.;
    }
    let total: f64 = minutes.values().sum();

    let mut apps: Vec<_> = order.into_iter().map(|v| (v, minutes[v])).collect();
    apps.sort_by(|a, b| b.1.total_cmp(&a.1));
    apps.truncate(limit);
    apps.into_iter()
        .map(|(name, minutes)| AppUsage {
            name: name.to_string(),
            minutes: round1(minutes),
            percentage: if total > 0. {
                round1(minutes / total * 100.)
            } else {
                0.
            },
        })
        .collect()
}

pub fn activities(cards: &[ActivityCardEntity]) -> Vec<ActivityRow> {
    let mut cards: Vec<_> = cards.iter().collect();
    cards.sort_by_key(|v| v.start_time);
    cards
        .into_iter()
        .map(|card| {
            let start = card.start_time.with_timezone(&Local);
            let end = card.end_time.with_timezone(&Local);
            ActivityRow {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
                date: start.format("%Y-%m-%d").to_string(),
                category: card.category,
                category_color: card.category.color(),
                title: card.title.clone(),
                summary: card.summary.clone(),
                score: card.productivity_score,
                minutes: round1(card.duration_minutes()),
                main_app: card.main_app().unwrap_or_default().to_string(),
                apps: card.app_sites.iter().map(|v| v.name.clone()).collect(),
            }
        })
        .collect()
}

/// `0m` below a minute, otherwise `2h 30m`, `2h` or `45m`.
pub fn format_minutes(minutes: i64) -> String {
    if minutes < 1 {
        return "0m".into();
    }
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// Total minutes and the duration weighted score. Cards without duration don't count.
fn weighted_score(cards: &[ActivityCardEntity]) -> (f64, f64) {
    let (weighted, minutes) = cards
        .iter()
        .map(|v| (v.productivity_score, v.duration_minutes()))
        .filter(|(_, minutes)| *minutes > 0.)
        .fold((0., 0.), |(weighted, total), (score, minutes)| {
            (weighted + score * minutes, total + minutes)
        });
    if minutes > 0. {
        (minutes, weighted / minutes)
    } else {
        (0., 0.)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.).round() / 10.
}
