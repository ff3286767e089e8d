use std::{io::ErrorKind, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use tracing::warn;

use super::{is_frame_file, ChunkManifest, WindowSample, MANIFEST_FILE, WINDOWS_FILE};

/// Read access to a chunk directory.
pub struct ChunkReader {
    path: PathBuf,
}

impl ChunkReader {
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub async fn manifest(&self) -> Result<ChunkManifest> {
        let path = self.path.join(MANIFEST_FILE);
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("corrupted manifest {}", path.display()))
    }

    pub async fn has_manifest(&self) -> bool {
        tokio::fs::try_exists(self.path.join(MANIFEST_FILE))
            .await
            .unwrap_or(false)
    }

    /// Window samples in recording order. A missing file means no samples.
    pub async fn window_samples(&self) -> Result<Vec<WindowSample>> {
        let path = self.path.join(WINDOWS_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut samples = vec![];
        for line in content.lines().filter(|v| !v.trim().is_empty()) {
            match serde_json::from_str::<WindowSample>(line) {
                Ok(v) => samples.push(v),
                Err(e) => {
                    // The last line may be cut off when the daemon was killed mid write.
                    warn!("Skipping corrupted window sample in {path:?} {line}: {e}")
                }
            }
        }
        Ok(samples)
    }

    /// Frame files sorted by capture order.
    pub async fn frame_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .with_context(|| format!("failed to list chunk {}", self.path.display()))?;
        let mut frames = vec![];
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if is_frame_file(&name.to_string_lossy()) {
                frames.push(entry.path());
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Loads up to `max` frames spread evenly over the chunk.
    pub async fn sample_frames(&self, max: usize) -> Result<Vec<Vec<u8>>> {
        let frames = self.frame_paths().await?;
        let mut sampled = Vec::new();
        for index in sample_indices(frames.len(), max) {
            let path = &frames[index];
            match tokio::fs::read(path).await {
                Ok(bytes) if !bytes.is_empty() => sampled.push(bytes),
                Ok(_) => warn!("Skipping empty frame {path:?}"),
                Err(e) => warn!("Skipping unreadable frame {path:?}: {e}"),
            }
        }
        Ok(sampled)
    }
}

/// Picks `i * total / max` for `i` in `0..max`. Every frame is used when there are fewer than
/// `max` of them.
pub fn sample_indices(total: usize, max: usize) -> Vec<usize> {
    if total <= max {
        return (0..total).collect();
    }
    let mut indices: Vec<usize> = (0..max).map(|i| i * total / max).collect();
    indices.dedup();
    indices
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn corrupted_window_lines_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let valid = |timestamp: f64| {
            serde_json::to_string(&WindowSample {
                timestamp,
                app_name: "Firefox".into(),
                window_title: "Docs".into(),
                afk: false,
            })
        };
        std::fs::write(
            dir.path().join(WINDOWS_FILE),
            format!("{}\n{{\"timestamp\":\n\n{}\n", valid(0.)?, valid(1.)?),
        )?;

        let samples = ChunkReader::open(dir.path()).window_samples().await?;

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp, 1.);
        Ok(())
    }

    #[tokio::test]
    async fn missing_window_file_has_no_samples() -> Result<()> {
        let dir = tempdir()?;
        assert!(ChunkReader::open(dir.path()).window_samples().await?.is_empty());
        Ok(())
    }

    #[test]
    fn sampling_spreads_over_the_chunk() {
        assert_eq!(sample_indices(60, 8), vec![0, 7, 15, 22, 30, 37, 45, 52]);
        assert_eq!(sample_indices(9, 8), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn sampling_small_chunks_takes_everything() {
        assert_eq!(sample_indices(3, 8), vec![0, 1, 2]);
        assert!(sample_indices(0, 8).is_empty());
        assert!(sample_indices(10, 0).is_empty());
    }
}
