//! On-disk chunks.
//!
//! A chunk is a directory named after its UTC start that holds the captured frames
//! (`frame_00000.jpg`, ...), the window samples (`windows.jsonl`) and, once the chunk is closed,
//! `manifest.json`. A directory without a manifest was interrupted before it could be closed.

pub mod reader;
pub mod scan;
pub mod writer;

use std::{io::ErrorKind, path::{Path, PathBuf}};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::chunks::NewChunk;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const WINDOWS_FILE: &str = "windows.jsonl";
const FRAME_PREFIX: &str = "frame_";
const FRAME_EXTENSION: &str = ".jpg";

fn frame_file_name(index: u32) -> String {
    format!("{FRAME_PREFIX}{index:05}{FRAME_EXTENSION}")
}

fn is_frame_file(name: &str) -> bool {
    name.starts_with(FRAME_PREFIX) && name.ends_with(FRAME_EXTENSION)
}

/// Focused window at a moment of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    /// Seconds since the chunk start.
    pub timestamp: f64,
    pub app_name: String,
    #[serde(default)]
    pub window_title: String,
    #[serde(default)]
    pub afk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub frame_count: u32,
}

/// A chunk that is complete on disk and waits for analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedChunk {
    pub name: String,
    pub path: PathBuf,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub frame_count: u32,
}

impl ClosedChunk {
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds().max(0) as f64 / 1000.
    }
}

impl From<&ClosedChunk> for NewChunk {
    fn from(chunk: &ClosedChunk) -> Self {
        NewChunk {
            name: chunk.name.clone(),
            path: chunk.path.clone(),
            start_time: chunk.start,
            end_time: chunk.end,
            frame_count: chunk.frame_count,
        }
    }
}

/// Deletes a chunk directory. A directory that is already gone is not an error.
pub async fn remove_chunk_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Removed chunk {path:?}");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
