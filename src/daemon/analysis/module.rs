use std::future::Future;

use anyhow::Result;

use crate::daemon::chunk::ClosedChunk;

/// Turns closed chunks into timeline entries. The daemon uses
/// [ChunkAnalyzer](super::analyzer::ChunkAnalyzer), tests substitute simpler processors.
pub trait ChunkProcessor {
    fn process(&mut self, chunk: ClosedChunk) -> impl Future<Output = Result<()>>;

    /// Runs chunks whose earlier analysis failed again.
    fn retry_failed(&mut self) -> impl Future<Output = Result<()>>;
}
