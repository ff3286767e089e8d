use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use super::LlmError;

const MAX_ERROR_BODY: usize = 500;

/// Sends a request, retrying transient failures with exponential backoff.
///
/// - 429: waits 2s, 4s, 8s, ...
/// - 5xx, timeouts and connection errors: waits 1s, 2s, 4s, ...
/// - other statuses fail right away
///
/// `max_attempts` below 1 still sends the request once.
pub async fn send_with_retry<F>(
    client: &Client,
    build_request: F,
    max_attempts: u32,
    context: &str,
) -> Result<Response, LlmError>
where
    F: Fn(&Client) -> RequestBuilder,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let (error, delay) = match build_request(client).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let error = status_error(response).await;
                if status == StatusCode::TOO_MANY_REQUESTS {
                    (error, backoff(attempt + 1))
                } else if status.is_server_error() {
                    (error, backoff(attempt))
                } else {
                    warn!("{context}: non-retriable error ({status})");
                    return Err(error);
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() => (LlmError::from(e), backoff(attempt)),
            Err(e) => {
                warn!("{context}: request failed: {e}");
                return Err(e.into());
            }
        };

        attempt += 1;
        if attempt >= max_attempts {
            warn!("{context}: failed after {max_attempts} attempts: {error}");
            return Err(error);
        }
        warn!("{context}: {error}, retrying in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

fn backoff(exponent: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(exponent))
}

async fn status_error(response: Response) -> LlmError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if let Some((index, _)) = body.char_indices().nth(MAX_ERROR_BODY) {
        body.truncate(index);
    }
    LlmError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn connection_refused_is_reported_after_attempts() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = send_with_retry(
            &client,
            |c| {
                counter.fetch_add(1, Ordering::SeqCst);
                c.get("http://127.0.0.1:1/")
            },
            1,
            "refused",
        )
        .await;

        assert!(matches!(result, Err(LlmError::Connect(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_sends_once() {
        let client = Client::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = send_with_retry(
            &client,
            |c| {
                counter.fetch_add(1, Ordering::SeqCst);
                c.get("http://127.0.0.1:1/")
            },
            0,
            "zero",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
