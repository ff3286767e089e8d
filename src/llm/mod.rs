//! Communication with the vision model.
//!
//! A chunk is analyzed in two calls. [LlmProvider::transcribe] turns sampled frames into
//! observations, then [LlmProvider::generate_cards] merges observations into activity cards.

pub mod client;
pub mod parse;
pub mod prompts;
pub mod retry;
pub mod window_context;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::daemon::{
    chunk::WindowSample,
    storage::entities::{ActivityCardEntity, ObservationEntity},
};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key is not configured, set DAYFLOW_API_KEY")]
    MissingApiKey,
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to connect to the API server")]
    Connect(#[source] reqwest::Error),
    #[error("API request timed out")]
    Timeout(#[source] reqwest::Error),
    #[error("API request failed")]
    Request(#[source] reqwest::Error),
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(e)
        } else if e.is_connect() {
            LlmError::Connect(e)
        } else {
            LlmError::Request(e)
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Describes what happened in the frames of a chunk. `samples` are the window samples of the
    /// same chunk and are only used as a hint for the model.
    async fn transcribe(
        &self,
        frames: Vec<Vec<u8>>,
        duration_secs: f64,
        samples: Vec<WindowSample>,
    ) -> Result<Vec<ObservationEntity>, LlmError>;

    /// Groups observations of the chunk spanning `start..end` into cards. `context_cards` are
    /// earlier cards of the day, oldest first.
    async fn generate_cards(
        &self,
        observations: Vec<ObservationEntity>,
        context_cards: Vec<ActivityCardEntity>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityCardEntity>, LlmError>;

    /// Sends a trivial request and returns a human readable description of the result.
    async fn test_connection(&self) -> Result<String, LlmError>;
}
