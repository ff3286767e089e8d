use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

use crate::utils::time::chunk_name;

use super::{
    frame_file_name, remove_chunk_dir, ChunkManifest, ClosedChunk, WindowSample, MANIFEST_FILE,
    WINDOWS_FILE,
};

/// Appends frames and window samples to a chunk that is being recorded.
pub struct ChunkWriter {
    name: String,
    path: PathBuf,
    start: DateTime<Utc>,
    frame_count: u32,
    windows: File,
}

impl ChunkWriter {
    pub async fn create(root: &Path, start: DateTime<Utc>) -> Result<Self> {
        let name = chunk_name(start);
        let path = root.join(&name);
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("failed to create chunk directory {}", path.display()))?;
        let windows = File::options()
            .create(true)
            .append(true)
            .open(path.join(WINDOWS_FILE))
            .await?;
        debug!("Opened chunk {name}");
        Ok(Self {
            name,
            path,
            start,
            frame_count: 0,
            windows,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let path = self.path.join(frame_file_name(self.frame_count));
        tokio::fs::write(&path, jpeg)
            .await
            .with_context(|| format!("failed to write frame {}", path.display()))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Each sample is flushed right away, an interrupted chunk keeps everything but the last line
    /// at worst.
    pub async fn append_window(&mut self, sample: &WindowSample) -> Result<()> {
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');
        self.windows.write_all(&line).await?;
        self.windows.flush().await?;
        Ok(())
    }

    /// Writes the manifest. The manifest is written to a temporary file first and renamed, so a
    /// manifest is either complete or absent.
    pub async fn close(mut self, end: DateTime<Utc>) -> Result<ClosedChunk> {
        self.windows.flush().await?;
        write_manifest(
            &self.path,
            &ChunkManifest {
                start: self.start,
                end,
                frame_count: self.frame_count,
            },
        )
        .await?;
        debug!("Closed chunk {} with {} frames", self.name, self.frame_count);
        Ok(ClosedChunk {
            name: self.name,
            path: self.path,
            start: self.start,
            end,
            frame_count: self.frame_count,
        })
    }

    pub async fn discard(self) -> Result<()> {
        drop(self.windows);
        remove_chunk_dir(&self.path).await
    }
}

pub(super) async fn write_manifest(dir: &Path, manifest: &ChunkManifest) -> Result<()> {
    let temporary = dir.join(format!("{MANIFEST_FILE}.tmp"));
    tokio::fs::write(&temporary, serde_json::to_vec(manifest)?).await?;
    tokio::fs::rename(&temporary, dir.join(MANIFEST_FILE)).await?;
    Ok(())
}
