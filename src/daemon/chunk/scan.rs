use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use super::{
    reader::ChunkReader, remove_chunk_dir, writer::write_manifest, ChunkManifest, ClosedChunk,
};

#[derive(Debug, PartialEq)]
pub enum ChunkScan {
    Closed(ClosedChunk),
    /// Recording stopped before the chunk got its manifest.
    Unclosed(PathBuf),
}

/// Lists chunk directories under `root` in chronological order.
pub async fn scan_chunk_dir(root: &Path) -> Result<Vec<ChunkScan>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    let mut directories = vec![];
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            directories.push(entry.path());
        }
    }
    directories.sort();

    let mut result = vec![];
    for path in directories {
        let reader = ChunkReader::open(&path);
        if !reader.has_manifest().await {
            result.push(ChunkScan::Unclosed(path));
            continue;
        }
        match reader.manifest().await {
            Ok(manifest) => result.push(ChunkScan::Closed(closed_from_manifest(&path, manifest))),
            Err(e) => {
                warn!("Treating chunk with unreadable manifest as unclosed: {e:?}");
                result.push(ChunkScan::Unclosed(path));
            }
        }
    }
    Ok(result)
}

fn closed_from_manifest(path: &Path, manifest: ChunkManifest) -> ClosedChunk {
    ClosedChunk {
        name: chunk_dir_name(path),
        path: path.to_path_buf(),
        start: manifest.start,
        end: manifest.end,
        frame_count: manifest.frame_count,
    }
}

fn chunk_dir_name(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Closes a chunk left behind by an interrupted recorder. The end is taken from the last window
/// sample, or from the modification time of the last frame when there are no samples. Chunks
/// without frames are deleted and `None` is returned.
pub async fn recover_unclosed(path: &Path) -> Result<Option<ClosedChunk>> {
    let reader = ChunkReader::open(path);
    let name = chunk_dir_name(path);
    let frames = reader.frame_paths().await?;
    let start = NaiveDateTime::parse_from_str(&name, "%Y%m%dT%H%M%SZ")
        .map(|v| v.and_utc())
        .ok();

    let (Some(start), Some(last_frame)) = (start, frames.last()) else {
        info!("Discarding unrecoverable chunk {path:?}");
        remove_chunk_dir(path).await?;
        return Ok(None);
    };

    let samples = reader.window_samples().await?;
    let end = match samples.last() {
        Some(sample) => start + chrono::Duration::milliseconds((sample.timestamp * 1000.) as i64),
        None => {
            let modified = tokio::fs::metadata(last_frame).await?.modified()?;
            DateTime::<Utc>::from(modified)
        }
    }
    .max(start);

    let manifest = ChunkManifest {
        start,
        end,
        frame_count: frames.len() as u32,
    };
    write_manifest(path, &manifest).await?;
    debug!("Recovered chunk {name} ending at {end}");
    Ok(Some(closed_from_manifest(path, manifest)))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::daemon::chunk::{writer::ChunkWriter, WindowSample};

    #[tokio::test]
    async fn scan_distinguishes_closed_and_unclosed() -> Result<()> {
        let dir = tempdir()?;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut closed = ChunkWriter::create(dir.path(), start).await?;
        closed.append_frame(b"x").await?;
        let closed = closed.close(start + Duration::seconds(60)).await?;

        let mut open = ChunkWriter::create(dir.path(), start + Duration::seconds(60)).await?;
        open.append_frame(b"y").await?;
        let open_path = open.path().to_path_buf();
        drop(open);

        let scans = scan_chunk_dir(dir.path()).await?;
        assert_eq!(
            scans,
            vec![ChunkScan::Closed(closed), ChunkScan::Unclosed(open_path)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_root_is_empty() -> Result<()> {
        let dir = tempdir()?;
        assert!(scan_chunk_dir(&dir.path().join("nothing")).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn recovery_uses_last_window_sample() -> Result<()> {
        let dir = tempdir()?;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut writer = ChunkWriter::create(dir.path(), start).await?;
        writer.append_frame(b"x").await?;
        writer
            .append_window(&WindowSample {
                timestamp: 42.,
                app_name: "Slack".into(),
                window_title: String::new(),
                afk: false,
            })
            .await?;
        let path = writer.path().to_path_buf();
        drop(writer);

        let recovered = recover_unclosed(&path).await?.unwrap();
        assert_eq!(recovered.start, start);
        assert_eq!(recovered.end, start + Duration::seconds(42));
        assert_eq!(recovered.frame_count, 1);
        assert!(ChunkReader::open(&path).has_manifest().await);
        Ok(())
    }

    #[tokio::test]
    async fn recovery_discards_empty_chunks() -> Result<()> {
        let dir = tempdir()?;
        let writer = ChunkWriter::create(dir.path(), Utc::now()).await?;
        let path = writer.path().to_path_buf();
        drop(writer);

        assert!(recover_unclosed(&path).await?.is_none());
        assert!(!path.exists());
        Ok(())
    }
}
