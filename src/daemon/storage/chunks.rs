use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::utils::time::{from_db_time, to_db_time};

use super::{
    cards::insert_card_with,
    db::Database,
    entities::{ActivityCardEntity, ChunkEntity, ChunkStatus, ObservationEntity},
};

/// What the recorder knows about a chunk when it closes it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub name: String,
    pub path: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub frame_count: u32,
}

const CHUNK_COLUMNS: &str =
    "id, name, path, start_time, end_time, frame_count, status, attempts, last_error";

fn conversion_error(e: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
}

fn row_to_chunk(row: &Row) -> Result<ChunkEntity, rusqlite::Error> {
    let path: String = row.get("path")?;
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let status: String = row.get("status")?;
    Ok(ChunkEntity {
        id: row.get("id")?,
        name: row.get("name")?,
        path: PathBuf::from(path),
        start_time: from_db_time(&start_time).map_err(conversion_error)?,
        end_time: from_db_time(&end_time).map_err(conversion_error)?,
        frame_count: row.get("frame_count")?,
        status: status.parse().map_err(conversion_error)?,
        attempts: row.get("attempts")?,
        last_error: row.get("last_error")?,
    })
}

fn select_chunk_by_name(conn: &Connection, name: &str) -> Result<Option<ChunkEntity>> {
    conn.query_row(
        &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE name = ?1"),
        params![name],
        row_to_chunk,
    )
    .optional()
    .with_context(|| format!("failed to load chunk {name}"))
}

impl Database {
    /// Inserts a chunk in `pending` state. Registering a chunk that already exists returns the
    /// stored row untouched, which makes re-queueing after a restart harmless.
    pub async fn register_chunk(&self, chunk: NewChunk) -> Result<ChunkEntity> {
        self.execute(move |conn| {
            if let Some(existing) = select_chunk_by_name(conn, &chunk.name)? {
                return Ok(existing);
            }
            let now = to_db_time(Utc::now());
            conn.execute(
                "INSERT INTO chunks (name, path, start_time, end_time, frame_count, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
                params![
                    chunk.name,
                    chunk.path.to_string_lossy().to_string(),
                    to_db_time(chunk.start_time),
                    to_db_time(chunk.end_time),
                    chunk.frame_count,
                    ChunkStatus::Pending.as_str(),
                    now,
                ],
            )
            .context("failed to insert chunk")?;
            select_chunk_by_name(conn, &chunk.name)?
                .with_context(|| format!("chunk {} vanished after insert", chunk.name))
        })
        .await
    }

    pub async fn chunk_by_name(&self, name: &str) -> Result<Option<ChunkEntity>> {
        let name = name.to_string();
        self.execute(move |conn| select_chunk_by_name(conn, &name))
            .await
    }

    pub async fn chunks_with_status(&self, status: ChunkStatus) -> Result<Vec<ChunkEntity>> {
        self.execute(move |conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE status = ?1 ORDER BY start_time"
            ))?;
            let chunks = statement
                .query_map(params![status.as_str()], row_to_chunk)?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to load chunks")?;
            Ok(chunks)
        })
        .await
    }

    /// Records a failed analysis and returns the updated row.
    pub async fn mark_chunk_failed(&self, chunk_id: i64, error: String) -> Result<ChunkEntity> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE chunks
                 SET status = ?1, attempts = attempts + 1, last_error = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    ChunkStatus::Failed.as_str(),
                    error,
                    to_db_time(Utc::now()),
                    chunk_id
                ],
            )
            .context("failed to mark chunk as failed")?;
            conn.query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
                params![chunk_id],
                row_to_chunk,
            )
            .context("failed to reload chunk")
        })
        .await
    }

    pub async fn mark_chunk_abandoned(&self, chunk_id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE chunks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    ChunkStatus::Abandoned.as_str(),
                    to_db_time(Utc::now()),
                    chunk_id
                ],
            )
            .context("failed to mark chunk as abandoned")?;
            Ok(())
        })
        .await
    }

    /// Stores the result of an analysis. Observations, cards and the status change are written
    /// in one transaction so a crash never leaves a half analyzed chunk behind. Previous results
    /// of the chunk are replaced.
    pub async fn complete_chunk(
        &self,
        chunk_id: i64,
        observations: Vec<ObservationEntity>,
        cards: Vec<ActivityCardEntity>,
    ) -> Result<Vec<i64>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM observations WHERE chunk_id = ?1",
                params![chunk_id],
            )?;
            tx.execute("DELETE FROM cards WHERE chunk_id = ?1", params![chunk_id])?;

            for observation in &observations {
                tx.execute(
                    "INSERT INTO observations (chunk_id, start_ts, end_ts, text, app_name, window_title)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        chunk_id,
                        observation.start_ts,
                        observation.end_ts,
                        observation.text,
                        observation.app_name,
                        observation.window_title,
                    ],
                )
                .context("failed to insert observation")?;
            }

            let mut ids = Vec::with_capacity(cards.len());
            for card in &cards {
                ids.push(insert_card_with(&tx, Some(chunk_id), card)?);
            }

            tx.execute(
                "UPDATE chunks SET status = ?1, last_error = NULL, updated_at = ?2 WHERE id = ?3",
                params![
                    ChunkStatus::Analyzed.as_str(),
                    to_db_time(Utc::now()),
                    chunk_id
                ],
            )?;
            tx.commit().context("failed to commit chunk analysis")?;
            Ok(ids)
        })
        .await
    }

    pub async fn observations_for_chunk(&self, chunk_id: i64) -> Result<Vec<ObservationEntity>> {
        self.execute(move |conn| {
            let mut statement = conn.prepare(
                "SELECT start_ts, end_ts, text, app_name, window_title
                 FROM observations WHERE chunk_id = ?1 ORDER BY start_ts",
            )?;
            let observations = statement
                .query_map(params![chunk_id], |row| {
                    Ok(ObservationEntity {
                        start_ts: row.get(0)?,
                        end_ts: row.get(1)?,
                        text: row.get(2)?,
                        app_name: row.get(3)?,
                        window_title: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(observations)
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

    fn new_chunk(name: &str) -> NewChunk {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        NewChunk {
            name: name.into(),
            path: PathBuf::from("/tmp/chunks").join(name),
            start_time: start,
            end_time: start + Duration::seconds(60),
            frame_count: 60,
        }
    }

    fn card(start: DateTime<Utc>) -> ActivityCardEntity {
        ActivityCardEntity {
            id: None,
            category: Category::Coding,
            title: "Writing storage layer".into(),
            summary: "".into(),
            start_time: start,
            end_time: start + Duration::seconds(60),
            app_sites: vec![],
            distractions: vec![],
            productivity_score: 90.,
        }
    }

    #[tokio::test]
    async fn register_is_idempotent() -> Result<()> {
        let db = Database::open_in_memory()?;
        let first = db.register_chunk(new_chunk("a")).await?;
        let second = db.register_chunk(new_chunk("a")).await?;
        assert_eq!(first, second);
        assert_eq!(first.status, ChunkStatus::Pending);
        assert_eq!(first.attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failures_are_counted() -> Result<()> {
        let db = Database::open_in_memory()?;
        let chunk = db.register_chunk(new_chunk("a")).await?;
        db.mark_chunk_failed(chunk.id, "timeout".into()).await?;
        let failed = db.mark_chunk_failed(chunk.id, "timeout again".into()).await?;
        assert_eq!(failed.status, ChunkStatus::Failed);
        assert_eq!(failed.attempts, 2);
        assert_eq!(failed.last_error.as_deref(), Some("timeout again"));

        assert_eq!(db.chunks_with_status(ChunkStatus::Failed).await?.len(), 1);
        db.mark_chunk_abandoned(chunk.id).await?;
        assert!(db.chunks_with_status(ChunkStatus::Failed).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn completing_replaces_previous_results() -> Result<()> {
        let db = Database::open_in_memory()?;
        let chunk = db.register_chunk(new_chunk("a")).await?;
        let observation = ObservationEntity {
            start_ts: 0.,
            end_ts: 60.,
            text: "Editing code".into(),
            app_name: Some("Visual Studio Code".into()),
            window_title: None,
        };

        db.complete_chunk(
            chunk.id,
            vec![observation.clone()],
            vec![card(chunk.start_time)],
        )
        .await?;
        let ids = db
            .complete_chunk(chunk.id, vec![observation.clone()], vec![card(chunk.start_time)])
            .await?;

        assert_eq!(ids.len(), 1);
        assert_eq!(db.observations_for_chunk(chunk.id).await?, vec![observation]);
        let cards = db
            .cards_between(chunk.start_time, chunk.end_time + Duration::hours(1))
            .await?;
        assert_eq!(cards.len(), 1);
        let stored = db.chunk_by_name("a").await?.unwrap();
        assert_eq!(stored.status, ChunkStatus::Analyzed);
        Ok(())
    }
}
