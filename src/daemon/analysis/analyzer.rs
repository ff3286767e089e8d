use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::{
    config::AnalysisConfig,
    daemon::{
        chunk::{reader::ChunkReader, remove_chunk_dir, ClosedChunk},
        storage::{
            db::Database,
            entities::{ActivityCardEntity, Category, ChunkEntity, ChunkStatus},
        },
    },
    llm::{window_context::apply_window_records, LlmError, LlmProvider},
    utils::time::local_day_bounds,
};

use super::module::ChunkProcessor;

const AWAY_TITLE: &str = "Away from computer";
const AWAY_SUMMARY: &str = "No keyboard or mouse activity was detected.";

/// Analyzes chunks with an [LlmProvider] and stores the result.
pub struct ChunkAnalyzer<L: LlmProvider> {
    db: Database,
    llm: L,
    config: AnalysisConfig,
}

impl<L: LlmProvider> ChunkAnalyzer<L> {
    pub fn new(db: Database, llm: L, config: AnalysisConfig) -> Self {
        Self { db, llm, config }
    }

    /// Returns the amount of stored cards.
    async fn analyze(&self, chunk: &ClosedChunk, entity: &ChunkEntity) -> Result<usize> {
        let reader = ChunkReader::open(&chunk.path);
        let samples = reader.window_samples().await?;
        let duration = chunk.duration_secs();

        if !samples.is_empty() && samples.iter().all(|v| v.afk) {
            debug!("Chunk {} is idle, skipping the model", chunk.name);
            self.db
                .complete_chunk(entity.id, vec![], vec![away_card(chunk)])
                .await?;
            return Ok(1);
        }

        let frames = reader.sample_frames(self.config.max_frames).await?;
        let mut observations = self
            .llm
            .transcribe(frames, duration, samples.clone())
            .await?;
        apply_window_records(&mut observations, &samples, duration);

        let (day_start, _) = local_day_bounds(chunk.start.with_timezone(&Local).date_naive());
        let context = self
            .db
            .recent_cards_before(day_start, chunk.start, self.config.context_cards)
            .await?;

        let cards: Vec<_> = self
            .llm
            .generate_cards(observations.clone(), context, chunk.start, chunk.end)
            .await?
            .into_iter()
            .map(ActivityCardEntity::normalized)
            .collect();
        let count = cards.len();
        self.db
            .complete_chunk(entity.id, observations, cards)
            .await?;
        Ok(count)
    }

    /// Bookkeeping after a failed analysis. The original error is returned.
    async fn record_failure(
        &self,
        chunk: &ClosedChunk,
        entity: &ChunkEntity,
        error: anyhow::Error,
    ) -> Result<()> {
        let updated = self
            .db
            .mark_chunk_failed(entity.id, format!("{error:#}"))
            .await?;

        // Nothing can succeed until a key is configured, so these chunks are kept.
        let missing_key = matches!(
            error.downcast_ref::<LlmError>(),
            Some(LlmError::MissingApiKey)
        );
        if !missing_key && updated.attempts >= self.config.max_attempts {
            warn!(
                "Abandoning chunk {} after {} attempts",
                chunk.name, updated.attempts
            );
            self.db.mark_chunk_abandoned(entity.id).await?;
            remove_chunk_dir(&chunk.path).await?;
        }
        Err(error)
    }
}

impl<L: LlmProvider> ChunkProcessor for ChunkAnalyzer<L> {
    async fn process(&mut self, chunk: ClosedChunk) -> Result<()> {
        let entity = self.db.register_chunk((&chunk).into()).await?;
        if matches!(entity.status, ChunkStatus::Analyzed | ChunkStatus::Abandoned) {
            debug!("Chunk {} was already handled", chunk.name);
            return remove_chunk_dir(&chunk.path).await;
        }

        match self.analyze(&chunk, &entity).await {
            Ok(count) => {
                info!("Stored {count} cards for chunk {}", chunk.name);
                remove_chunk_dir(&chunk.path).await
            }
            Err(e) => self.record_failure(&chunk, &entity, e).await,
        }
    }

    async fn retry_failed(&mut self) -> Result<()> {
        let failed = self.db.chunks_with_status(ChunkStatus::Failed).await?;
        if !failed.is_empty() {
            info!("Retrying {} failed chunks", failed.len());
        }
        for entity in failed {
            if !tokio::fs::try_exists(&entity.path).await.unwrap_or(false) {
                warn!("Files of chunk {} are gone, abandoning it", entity.name);
                self.db.mark_chunk_abandoned(entity.id).await?;
                continue;
            }
            let name = entity.name.clone();
            if let Err(e) = self.process(closed_from_entity(entity)).await {
                warn!("Retry of chunk {name} failed: {e:?}");
            }
        }
        Ok(())
    }
}

fn closed_from_entity(entity: ChunkEntity) -> ClosedChunk {
    ClosedChunk {
        name: entity.name,
        path: entity.path,
        start: entity.start_time,
        end: entity.end_time,
        frame_count: entity.frame_count,
    }
}

fn away_card(chunk: &ClosedChunk) -> ActivityCardEntity {
    ActivityCardEntity {
        id: None,
        category: Category::Rest,
        title: AWAY_TITLE.into(),
        summary: AWAY_SUMMARY.into(),
        start_time: chunk.start,
        end_time: chunk.end,
        app_sites: vec![],
        distractions: vec![],
        productivity_score: 0.,
    }
    .normalized()
}
