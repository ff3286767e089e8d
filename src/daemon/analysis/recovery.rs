use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::daemon::{
    chunk::{
        remove_chunk_dir,
        scan::{recover_unclosed, scan_chunk_dir, ChunkScan},
        ClosedChunk,
    },
    storage::{db::Database, entities::ChunkStatus},
};

/// Collects chunks that still need analysis after a restart.
///
/// Chunks interrupted mid recording are closed first. Directories of chunks that are already
/// analyzed or abandoned are removed. Chunks that are still pending or failed but whose files are
/// gone are abandoned.
pub async fn recover_chunks(root: &Path, db: &Database) -> Result<Vec<ClosedChunk>> {
    let mut backlog = vec![];
    for scan in scan_chunk_dir(root).await? {
        let chunk = match scan {
            ChunkScan::Closed(chunk) => chunk,
            ChunkScan::Unclosed(path) => match recover_unclosed(&path).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to recover chunk {path:?}: {e:?}");
                    continue;
                }
            },
        };

        match db.chunk_by_name(&chunk.name).await? {
            Some(entity)
                if matches!(entity.status, ChunkStatus::Analyzed | ChunkStatus::Abandoned) =>
            {
                remove_chunk_dir(&chunk.path).await?;
            }
            _ => backlog.push(chunk),
        }
    }

    for status in [ChunkStatus::Pending, ChunkStatus::Failed] {
        for entity in db.chunks_with_status(status).await? {
            if !tokio::fs::try_exists(&entity.path).await.unwrap_or(false) {
                warn!("Files of chunk {} are gone, abandoning it", entity.name);
                db.mark_chunk_abandoned(entity.id).await?;
            }
        }
    }

    if !backlog.is_empty() {
        info!("Recovered {} chunks for analysis", backlog.len());
    }
    Ok(backlog)
}
