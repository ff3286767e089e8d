use std::path::{Path, PathBuf};

use analysis::{analyzer::ChunkAnalyzer, recovery::recover_chunks, AnalysisModule};
use anyhow::{Context, Result};
use chunk::ClosedChunk;
use fs4::tokio::AsyncFileExt;
use recording::{
    afk::AfkEvaluator,
    recorder::{RecorderSettings, RecordingModule},
};
use storage::db::Database;
use tokio::{fs::File, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::{AnalysisConfig, Config, RecordingConfig},
    llm::{client::OpenAiProvider, LlmProvider},
    screen_api::{GenericScreenCapturer, ScreenCapturer},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{chunks_path, database_path},
    },
    window_api::{GenericWindowManager, WindowManager},
};

pub mod analysis;
pub mod args;
pub mod chunk;
pub mod recording;
pub mod shutdown;
pub mod storage;

const LOCK_FILE: &str = "daemon.lock";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    let dir = std::path::absolute(&dir)?;
    let config = Config::load(&dir)?;
    let _lock = lock_daemon(&dir).await?;
    std::env::set_current_dir("/")?;

    let db = Database::open(database_path(&dir))?;
    let chunk_root = chunks_path(&dir);
    let backlog = recover_chunks(&chunk_root, &db).await?;

    if config.api.api_key.is_empty() {
        warn!("No API key is configured, chunks will wait until one is set");
    }

    // Recording never waits on analysis.
    let (sender, receiver) = mpsc::unbounded_channel::<ClosedChunk>();
    let shutdown_token = CancellationToken::new();

    let recorder = create_recorder(
        sender,
        GenericWindowManager::new()?,
        GenericScreenCapturer::new()?,
        &shutdown_token,
        &config.recording,
        chunk_root,
        DefaultClock,
    );

    let llm = OpenAiProvider::new(config.api.clone(), config.analysis.clone())?;
    let analysis =
        create_analysis(receiver, db, llm, &shutdown_token, &config.analysis).with_backlog(backlog);

    info!("Daemon started in {dir:?}");
    let (_, recording_result, analysis_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = recorder.run().await;
            // Nothing else is useful once recording stops.
            shutdown_token.cancel();
            result
        },
        analysis.run(),
    );

    if let Err(recording_result) = recording_result {
        error!("Recording module got an error {:?}", recording_result);
    }

    if let Err(analysis_result) = analysis_result {
        error!("Analysis module got an error {:?}", analysis_result);
    }

    info!("Daemon stopped");
    Ok(())
}

/// Only one daemon may record into a directory. A second one waits until the first exits.
async fn lock_daemon(dir: &Path) -> Result<File> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(LOCK_FILE);
    let file = File::options()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!("Acquiring {path:?}");
    file.lock_exclusive()
        .with_context(|| format!("failed to lock {}", path.display()))?;
    Ok(file)
}

fn create_recorder(
    sender: mpsc::UnboundedSender<ClosedChunk>,
    manager: impl WindowManager + 'static,
    capturer: impl ScreenCapturer + 'static,
    shutdown_token: &CancellationToken,
    config: &RecordingConfig,
    chunk_root: PathBuf,
    clock: impl Clock,
) -> RecordingModule {
    RecordingModule::new(
        sender,
        Box::new(manager),
        Box::new(capturer),
        shutdown_token.clone(),
        AfkEvaluator::from_seconds(config.afk_threshold_secs),
        config.into(),
        chunk_root,
        Box::new(clock),
    )
}

fn create_analysis<L: LlmProvider>(
    receiver: mpsc::UnboundedReceiver<ClosedChunk>,
    db: Database,
    llm: L,
    shutdown_token: &CancellationToken,
    config: &AnalysisConfig,
) -> AnalysisModule<ChunkAnalyzer<L>> {
    AnalysisModule::new(
        receiver,
        ChunkAnalyzer::new(db, llm, config.clone()),
        shutdown_token.clone(),
        config.retry_interval(),
    )
}

#[cfg(test)]
mod daemon_tests {
    use std::{fs, time::Duration};

    use anyhow::Result;
    use chrono::{DateTime, TimeZone, Utc};
    use image::RgbaImage;
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        config::{AnalysisConfig, RecordingConfig},
        daemon::{
            chunk::ClosedChunk,
            create_analysis, create_recorder,
            storage::{
                db::Database,
                entities::{ActivityCardEntity, Category, ChunkStatus, ObservationEntity},
            },
        },
        llm::MockLlmProvider,
        screen_api::MockScreenCapturer,
        utils::{clock::TestClock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowManager},
    };

    fn test_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap()
    }

    fn card(start: DateTime<Utc>, end: DateTime<Utc>) -> ActivityCardEntity {
        ActivityCardEntity {
            id: None,
            category: Category::Coding,
            title: "Smoke testing".into(),
            summary: String::new(),
            start_time: start,
            end_time: end,
            app_sites: vec![],
            distractions: vec![],
            productivity_score: 90.,
        }
    }

    /// Records for a few seconds with one second chunks. Time isn't warped, so this takes as long
    /// as it records.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut window_manager = MockWindowManager::new();
        window_manager.expect_get_idle_time().returning(|| Ok(0));
        window_manager
            .expect_get_active_window_data()
            .returning(|| {
                Ok(ActiveWindowData {
                    window_title: "test".into(),
                    process_name: "C:\\Program Files\\Test\\test.exe".into(),
                })
            });
        let mut capturer = MockScreenCapturer::new();
        capturer
            .expect_capture()
            .returning(|| Ok(RgbaImage::new(32, 32)));

        let mut llm = MockLlmProvider::new();
        llm.expect_transcribe().returning(|_, duration, _| {
            Ok(vec![ObservationEntity {
                start_ts: 0.,
                end_ts: duration,
                text: "Testing".into(),
                app_name: None,
                window_title: None,
            }])
        });
        llm.expect_generate_cards()
            .returning(|_, _, start, end| Ok(vec![card(start, end)]));

        let dir = tempdir()?;
        let chunk_root = dir.path().join("chunks");
        let db = Database::open_in_memory()?;
        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::unbounded_channel::<ClosedChunk>();

        let recording = RecordingConfig {
            frame_interval_ms: 200,
            chunk_duration_secs: 1,
            ..Default::default()
        };
        let recorder = create_recorder(
            sender,
            window_manager,
            capturer,
            &shutdown_token,
            &recording,
            chunk_root.clone(),
            TestClock::starting_at(test_start()),
        );
        let analysis = create_analysis(
            receiver,
            db.clone(),
            llm,
            &shutdown_token,
            &AnalysisConfig::default(),
        );

        let (_, recording_result, analysis_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                shutdown_token.cancel()
            },
            recorder.run(),
            analysis.run(),
        );
        recording_result?;
        analysis_result?;

        let analyzed = db.chunks_with_status(ChunkStatus::Analyzed).await?;
        assert_eq!(analyzed.len(), 2);
        let cards = db
            .cards_between(test_start(), test_start() + chrono::Duration::minutes(1))
            .await?;
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].start_time, analyzed[0].start_time);

        // The chunk closed during shutdown waits on disk for the next start.
        let left = fs::read_dir(&chunk_root)?.collect::<Vec<_>>();
        assert_eq!(left.len(), 1);

        Ok(())
    }
}
