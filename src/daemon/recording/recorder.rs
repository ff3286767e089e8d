use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::RecordingConfig,
    daemon::chunk::{writer::ChunkWriter, ClosedChunk, WindowSample},
    screen_api::{
        encode::{encode_frame, FrameEncoding},
        ScreenCapturer,
    },
    utils::clock::Clock,
    window_api::{
        names::{friendly_app_name, UNKNOWN_APP},
        WindowManager,
    },
};

use super::afk::AfkEvaluator;

#[derive(Debug, Clone, Copy)]
pub struct RecorderSettings {
    pub frame_interval: Duration,
    pub chunk_duration: Duration,
    pub encoding: FrameEncoding,
}

impl From<&RecordingConfig> for RecorderSettings {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            chunk_duration: config.chunk_duration(),
            encoding: config.into(),
        }
    }
}

/// Records the screen and the focused window into chunks and hands every closed chunk over to
/// analysis.
pub struct RecordingModule {
    next: mpsc::UnboundedSender<ClosedChunk>,
    window_manager: Box<dyn WindowManager>,
    capturer: Arc<Mutex<Box<dyn ScreenCapturer>>>,
    shutdown: CancellationToken,
    afk_evaluator: AfkEvaluator,
    settings: RecorderSettings,
    chunk_root: PathBuf,
    time_provider: Box<dyn Clock>,
    current: Option<ChunkWriter>,
}

impl RecordingModule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        next: mpsc::UnboundedSender<ClosedChunk>,
        window_manager: Box<dyn WindowManager>,
        capturer: Box<dyn ScreenCapturer>,
        shutdown: CancellationToken,
        afk_evaluator: AfkEvaluator,
        settings: RecorderSettings,
        chunk_root: PathBuf,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            window_manager,
            capturer: Arc::new(Mutex::new(capturer)),
            shutdown,
            afk_evaluator,
            settings,
            chunk_root,
            time_provider,
            current: None,
        }
    }

    /// Executes the recording loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        loop {
            tick_point += self.settings.frame_interval;

            self.tick()
                .instrument(info_span!("Recording tick"))
                .await?;

            tokio::select! {
                // Dropping the module drops the sender which stops the analysis module once it
                // drains the queue.
                _ = self.shutdown.cancelled() => {
                    return self.finish().await
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }
        }
    }

    /// Only fails when analysis can no longer receive chunks.
    async fn tick(&mut self) -> Result<()> {
        let now = self.time_provider.time();

        let expired = self
            .current
            .as_ref()
            .is_some_and(|v| elapsed_secs(v.start(), now) >= self.settings.chunk_duration.as_secs_f64());
        if expired {
            if let Some(writer) = self.current.take() {
                self.close_chunk(writer, now).await?;
            }
        }

        if self.current.is_none() {
            match ChunkWriter::create(&self.chunk_root, now).await {
                Ok(writer) => self.current = Some(writer),
                Err(e) => {
                    error!("Failed to open chunk {e:?}");
                    return Ok(());
                }
            }
        }

        let afk = match self.window_manager.get_idle_time() {
            Ok(idle) => self.afk_evaluator.is_afk(idle),
            Err(e) => {
                warn!("Failed to get idle time {e:?}");
                false
            }
        };
        let window = self
            .window_manager
            .get_active_window_data()
            .inspect_err(|e| warn!("Failed to get active window {e:?}"))
            .ok();

        let frame = if afk { None } else { self.capture_frame().await };

        let Some(writer) = self.current.as_mut() else {
            return Ok(());
        };

        if let Some(frame) = frame {
            if let Err(e) = writer.append_frame(&frame).await {
                error!("Failed to store frame {e:?}");
            }
        }

        let sample = WindowSample {
            timestamp: elapsed_secs(writer.start(), now),
            app_name: window
                .as_ref()
                .map(|v| friendly_app_name(&v.process_name))
                .unwrap_or_else(|| UNKNOWN_APP.to_string()),
            window_title: window
                .as_ref()
                .map(|v| v.window_title.to_string())
                .unwrap_or_default(),
            afk,
        };
        debug!("Sampled {sample:?}");
        if let Err(e) = writer.append_window(&sample).await {
            error!("Failed to store window sample {e:?}");
        }
        Ok(())
    }

    /// Captures and encodes a frame on the blocking pool. Failures are logged and skip the frame.
    async fn capture_frame(&self) -> Option<Vec<u8>> {
        let capturer = self.capturer.clone();
        let encoding = self.settings.encoding;
        let result = tokio::task::spawn_blocking(move || {
            let image = capturer
                .lock()
                .map_err(|_| anyhow!("screen capturer is poisoned"))?
                .capture()?;
            encode_frame(image, encoding)
        })
        .await;

        match result {
            Ok(Ok(frame)) => Some(frame),
            Ok(Err(e)) => {
                warn!("Failed to capture frame {e:?}");
                None
            }
            Err(e) => {
                error!("Capture task failed {e:?}");
                None
            }
        }
    }

    async fn close_chunk(&mut self, writer: ChunkWriter, end: DateTime<Utc>) -> Result<()> {
        let chunk = match writer.close(end).await {
            Ok(chunk) => chunk,
            Err(e) => {
                // Left without a manifest, startup recovery picks it up.
                error!("Failed to close chunk {e:?}");
                return Ok(());
            }
        };
        info!(
            "Closed chunk {} with {} frames",
            chunk.name, chunk.frame_count
        );
        self.next
            .send(chunk)
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    async fn finish(mut self) -> Result<()> {
        let Some(writer) = self.current.take() else {
            return Ok(());
        };
        if writer.frame_count() == 0 {
            debug!("Discarding chunk without frames");
            return writer.discard().await;
        }
        let now = self.time_provider.time();
        self.close_chunk(writer, now).await
    }
}

fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds().max(0) as f64 / 1000.
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use image::RgbaImage;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        daemon::chunk::reader::ChunkReader,
        screen_api::MockScreenCapturer,
        utils::{clock::TestClock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowManager},
    };

    fn settings() -> RecorderSettings {
        RecorderSettings {
            frame_interval: Duration::from_millis(200),
            chunk_duration: Duration::from_secs(1),
            encoding: FrameEncoding {
                max_width: 8,
                max_height: 8,
                quality: 70,
            },
        }
    }

    fn window_manager(idle_ms: u32) -> MockWindowManager {
        let mut manager = MockWindowManager::new();
        manager.expect_get_idle_time().returning(move || Ok(idle_ms));
        manager.expect_get_active_window_data().returning(|| {
            Ok(ActiveWindowData {
                window_title: "main.rs - dayflow".into(),
                process_name: "/usr/bin/code".into(),
            })
        });
        manager
    }

    async fn record_for(
        manager: MockWindowManager,
        capturer: MockScreenCapturer,
        duration: Duration,
        root: PathBuf,
    ) -> Result<Vec<ClosedChunk>> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let recorder = RecordingModule::new(
            sender,
            Box::new(manager),
            Box::new(capturer),
            shutdown.clone(),
            AfkEvaluator::from_seconds(120),
            settings(),
            root,
            Box::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap(),
            )),
        );

        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(duration).await;
                shutdown.cancel()
            },
            recorder.run(),
        );
        result?;

        let mut chunks = vec![];
        while let Ok(chunk) = receiver.try_recv() {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    #[tokio::test]
    async fn records_time_boxed_chunks() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let mut capturer = MockScreenCapturer::new();
        capturer
            .expect_capture()
            .returning(|| Ok(RgbaImage::new(16, 16)));

        let chunks = record_for(
            window_manager(0),
            capturer,
            Duration::from_millis(2500),
            dir.path().to_path_buf(),
        )
        .await?;

        // Two time-boxed chunks and the partial one closed on shutdown.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].name, "20180704T000000Z");
        assert_eq!(chunks[1].name, "20180704T000001Z");
        for chunk in &chunks {
            assert!(chunk.frame_count > 0);
            let reader = ChunkReader::open(&chunk.path);
            assert_eq!(reader.manifest().await?.frame_count, chunk.frame_count);
            let samples = reader.window_samples().await?;
            assert_eq!(samples.len() as u32, chunk.frame_count);
            assert_eq!(samples[0].app_name, "Visual Studio Code");
            assert!(!samples[0].afk);
        }
        assert!(chunks[0].duration_secs() >= 1.);
        Ok(())
    }

    #[tokio::test]
    async fn afk_time_is_sampled_without_frames() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let mut capturer = MockScreenCapturer::new();
        capturer.expect_capture().never();

        let chunks = record_for(
            window_manager(10 * 60 * 1000),
            capturer,
            Duration::from_millis(1500),
            dir.path().to_path_buf(),
        )
        .await?;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].frame_count, 0);
        let samples = ChunkReader::open(&chunks[0].path).window_samples().await?;
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|v| v.afk));
        // The chunk open during shutdown had no frames and was removed.
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn capture_failures_do_not_stop_recording() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let mut capturer = MockScreenCapturer::new();
        let mut calls = 0;
        capturer.expect_capture().returning(move || {
            calls += 1;
            if calls % 2 == 0 {
                Err(anyhow!("display went away"))
            } else {
                Ok(RgbaImage::new(4, 4))
            }
        });

        let chunks = record_for(
            window_manager(0),
            capturer,
            Duration::from_millis(900),
            dir.path().to_path_buf(),
        )
        .await?;

        assert_eq!(chunks.len(), 1);
        let samples = ChunkReader::open(&chunks[0].path).window_samples().await?;
        assert!(chunks[0].frame_count > 0);
        assert!((chunks[0].frame_count as usize) < samples.len());
        Ok(())
    }

    #[tokio::test]
    async fn undrained_analysis_does_not_stall_recording() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let mut capturer = MockScreenCapturer::new();
        capturer
            .expect_capture()
            .returning(|| Ok(RgbaImage::new(4, 4)));
        // Nothing ever reads from the receiver.
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let recorder = RecordingModule::new(
            sender,
            Box::new(window_manager(0)),
            Box::new(capturer),
            shutdown.clone(),
            AfkEvaluator::from_seconds(120),
            RecorderSettings {
                frame_interval: Duration::from_millis(100),
                chunk_duration: Duration::from_secs(1),
                ..settings()
            },
            dir.path().to_path_buf(),
            Box::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap(),
            )),
        );

        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                shutdown.cancel()
            },
            tokio::time::timeout(Duration::from_secs(4), recorder.run()),
        );
        result??;

        let mut queued = 0;
        while receiver.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 3);
        let mut samples = 0;
        for entry in fs::read_dir(dir.path())? {
            samples += ChunkReader::open(&entry?.path()).window_samples().await?.len();
        }
        assert!(samples >= 20, "only {samples} samples were recorded");
        Ok(())
    }
}
