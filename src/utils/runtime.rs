use anyhow::Result;

/// The daemon spends most of its time waiting on timers and the API, one thread is enough.
/// Capture and encoding go through `spawn_blocking`.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
