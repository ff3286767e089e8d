use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};

use crate::utils::time::{from_db_time, local_day_bounds, to_db_time};

use super::{
    db::Database,
    entities::{ActivityCardEntity, AppSite, Distraction},
};

const CARD_COLUMNS: &str = "id, category, title, summary, start_time, end_time, productivity_score, app_sites, distractions";

fn conversion_error(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
}

fn row_to_card(row: &Row) -> Result<ActivityCardEntity, rusqlite::Error> {
    let category: String = row.get("category")?;
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let app_sites: String = row.get("app_sites")?;
    let distractions: String = row.get("distractions")?;
    Ok(ActivityCardEntity {
        id: row.get("id")?,
        category: category.parse().map_err(conversion_error)?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        start_time: from_db_time(&start_time).map_err(conversion_error)?,
        end_time: from_db_time(&end_time).map_err(conversion_error)?,
        productivity_score: row.get("productivity_score")?,
        app_sites: serde_json::from_str::<Vec<AppSite>>(&app_sites).map_err(conversion_error)?,
        distractions: serde_json::from_str::<Vec<Distraction>>(&distractions)
            .map_err(conversion_error)?,
    })
}

/// Shared by single inserts and by chunk completion, which runs inside a transaction.
pub(super) fn insert_card_with(
    conn: &Connection,
    chunk_id: Option<i64>,
    card: &ActivityCardEntity,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO cards (chunk_id, category, title, summary, start_time, end_time, productivity_score, app_sites, distractions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            chunk_id,
            card.category.as_str(),
            card.title,
            card.summary,
            to_db_time(card.start_time),
            to_db_time(card.end_time),
            card.productivity_score,
            serde_json::to_string(&card.app_sites)?,
            serde_json::to_string(&card.distractions)?,
            to_db_time(Utc::now()),
        ],
    )
    .with_context(|| format!("failed to insert card '{}'", card.title))?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    pub async fn insert_card(&self, card: ActivityCardEntity) -> Result<i64> {
        self.execute(move |conn| insert_card_with(conn, None, &card))
            .await
    }

    /// Cards starting within `[from, to)`, ordered by start.
    pub async fn cards_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ActivityCardEntity>> {
        self.execute(move |conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time, id"
            ))?;
            let cards = statement
                .query_map(params![to_db_time(from), to_db_time(to)], row_to_card)?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to load cards")?;
            Ok(cards)
        })
        .await
    }

    /// Cards of a calendar day in local time.
    pub async fn cards_for_day(&self, day: NaiveDate) -> Result<Vec<ActivityCardEntity>> {
        let (start, end) = local_day_bounds(day);
        self.cards_between(start, end).await
    }

    /// The most recent `limit` cards of `day_start..=before`, oldest first. Used to give the model
    /// context about what happened right before a chunk.
    pub async fn recent_cards_before(
        &self,
        day_start: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ActivityCardEntity>> {
        self.execute(move |conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE start_time >= ?1 AND end_time <= ?2
                 ORDER BY start_time DESC, id DESC
                 LIMIT ?3"
            ))?;
            let mut cards = statement
                .query_map(
                    params![to_db_time(day_start), to_db_time(before), limit as i64],
                    row_to_card,
                )?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to load context cards")?;
            cards.reverse();
            Ok(cards)
        })
        .await
    }

    pub async fn delete_card(&self, id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM cards WHERE id = ?1", params![id])
                .context("failed to delete card")?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::daemon::storage::entities::Category;

    fn card(title: &str, start: DateTime<Utc>, minutes: i64) -> ActivityCardEntity {
        ActivityCardEntity {
            id: None,
            category: Category::Work,
            title: title.into(),
            summary: "summary".into(),
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            app_sites: vec![AppSite {
                name: "Microsoft Word".into(),
                duration_seconds: (minutes * 60) as f64,
            }],
            distractions: vec![Distraction {
                description: "Checked chat".into(),
                timestamp: 30.,
                duration_seconds: 15.,
            }],
            productivity_score: 75.,
        }
    }

    #[tokio::test]
    async fn cards_round_trip_through_storage() -> Result<()> {
        let db = Database::open_in_memory()?;
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let original = card("Report", start, 30);
        let id = db.insert_card(original.clone()).await?;

        let stored = db.cards_between(start, start + Duration::hours(1)).await?;
        assert_eq!(stored, vec![ActivityCardEntity { id: Some(id), ..original }]);
        Ok(())
    }

    #[tokio::test]
    async fn range_is_half_open() -> Result<()> {
        let db = Database::open_in_memory()?;
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        db.insert_card(card("first", start, 10)).await?;
        db.insert_card(card("second", start + Duration::hours(1), 10))
            .await?;

        let cards = db.cards_between(start, start + Duration::hours(1)).await?;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "first");
        Ok(())
    }

    #[tokio::test]
    async fn recent_cards_are_limited_and_chronological() -> Result<()> {
        let db = Database::open_in_memory()?;
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        for i in 0..5 {
            db.insert_card(card(&format!("card {i}"), start + Duration::minutes(i * 10), 10))
                .await?;
        }
        // The last card ends after `before` and must not be used as context.
        let before = start + Duration::minutes(45);
        let cards = db.recent_cards_before(start, before, 3).await?;
        let titles = cards.iter().map(|v| v.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["card 1", "card 2", "card 3"]);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_cards() -> Result<()> {
        let db = Database::open_in_memory()?;
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        let id = db.insert_card(card("gone", start, 5)).await?;
        assert!(db.delete_card(id).await?);
        assert!(!db.delete_card(id).await?);
        assert!(db.cards_between(start, start + Duration::hours(1)).await?.is_empty());
        Ok(())
    }
}
