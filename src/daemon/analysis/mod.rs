use std::time::Duration;

use anyhow::Result;
use module::ChunkProcessor;
use tokio::{sync::mpsc::UnboundedReceiver, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::chunk::ClosedChunk;

pub mod analyzer;
pub mod module;
pub mod recovery;

/// Receives closed chunks from the recorder and analyzes them one at a time. Chunks that failed
/// earlier are retried every `retry_interval`.
pub struct AnalysisModule<Processor> {
    receiver: UnboundedReceiver<ClosedChunk>,
    processor: Processor,
    shutdown: CancellationToken,
    retry_interval: Duration,
    backlog: Vec<ClosedChunk>,
}

impl<P: ChunkProcessor> AnalysisModule<P> {
    pub fn new(
        receiver: UnboundedReceiver<ClosedChunk>,
        processor: P,
        shutdown: CancellationToken,
        retry_interval: Duration,
    ) -> Self {
        Self {
            receiver,
            processor,
            shutdown,
            retry_interval,
            backlog: vec![],
        }
    }

    /// Chunks found on disk at startup. They are analyzed before anything the recorder sends.
    pub fn with_backlog(mut self, backlog: Vec<ClosedChunk>) -> Self {
        self.backlog = backlog;
        self
    }

    pub async fn run(mut self) -> Result<()> {
        for chunk in std::mem::take(&mut self.backlog) {
            if self.shutdown.is_cancelled() {
                info!("Leaving remaining recovered chunks for the next start");
                break;
            }
            self.process(chunk).await;
        }

        let mut retry = tokio::time::interval_at(
            Instant::now() + self.retry_interval,
            self.retry_interval,
        );
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut stopping = false;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled(), if !stopping => {
                    info!("Analysis is stopping");
                    stopping = true;
                }
                message = self.receiver.recv() => {
                    let Some(chunk) = message else {
                        break;
                    };
                    if stopping {
                        // Closed chunks stay on disk and are recovered on the next start.
                        debug!("Shutting down, leaving chunk {} for later", chunk.name);
                        continue;
                    }
                    self.process(chunk).await;
                }
                _ = retry.tick(), if !stopping => {
                    if let Err(e) = self
                        .processor
                        .retry_failed()
                        .instrument(info_span!("Retrying failed chunks"))
                        .await
                    {
                        error!("Failed to retry chunks {e:?}");
                    }
                }
            }
        }

        self.receiver.close();
        Ok(())
    }

    async fn process(&mut self, chunk: ClosedChunk) {
        let name = chunk.name.clone();
        debug!("Analyzing chunk {name}");
        match self
            .processor
            .process(chunk)
            .instrument(info_span!("Analyzing chunk", chunk = %name))
            .await
        {
            Ok(()) => info!("Analyzed chunk {name}"),
            Err(e) => warn!("Failed to analyze chunk {name}: {e:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{module::ChunkProcessor, AnalysisModule};
    use crate::daemon::chunk::ClosedChunk;

    #[derive(Clone, Default)]
    struct RecordingProcessor {
        processed: Arc<Mutex<Vec<String>>>,
        retries: Arc<Mutex<u32>>,
    }

    impl ChunkProcessor for RecordingProcessor {
        async fn process(&mut self, chunk: ClosedChunk) -> Result<()> {
            self.processed.lock().unwrap().push(chunk.name.clone());
            if chunk.name == "broken" {
                return Err(anyhow!("model is down"));
            }
            Ok(())
        }

        async fn retry_failed(&mut self) -> Result<()> {
            *self.retries.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn chunk(name: &str) -> ClosedChunk {
        ClosedChunk {
            name: name.into(),
            path: PathBuf::from(name),
            start: Utc::now(),
            end: Utc::now(),
            frame_count: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn processes_backlog_then_messages_and_retries() -> Result<()> {
        let processor = RecordingProcessor::default();
        let (sender, receiver) = mpsc::unbounded_channel();
        let module = AnalysisModule::new(
            receiver,
            processor.clone(),
            CancellationToken::new(),
            Duration::from_secs(300),
        )
        .with_backlog(vec![chunk("recovered")]);

        let (result, _) = tokio::join!(module.run(), async move {
            sender.send(chunk("broken")).unwrap();
            sender.send(chunk("fresh")).unwrap();
            tokio::time::sleep(Duration::from_secs(650)).await;
        });
        result?;

        assert_eq!(
            *processor.processed.lock().unwrap(),
            vec!["recovered", "broken", "fresh"]
        );
        assert_eq!(*processor.retries.lock().unwrap(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_after_shutdown_are_left_for_recovery() -> Result<()> {
        let processor = RecordingProcessor::default();
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let module = AnalysisModule::new(
            receiver,
            processor.clone(),
            shutdown.clone(),
            Duration::from_secs(300),
        );

        let (result, _) = tokio::join!(module.run(), async move {
            sender.send(chunk("before")).unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.cancel();
            tokio::time::sleep(Duration::from_secs(1)).await;
            sender.send(chunk("after")).unwrap();
            tokio::time::sleep(Duration::from_secs(1000)).await;
        });
        result?;

        assert_eq!(*processor.processed.lock().unwrap(), vec!["before"]);
        assert_eq!(*processor.retries.lock().unwrap(), 0);
        Ok(())
    }
}
