use anyhow::Result;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: usize = 2;
const BASE_DELAY_MS: u64 = 250;

/// Sends a request built by `make_request`, retrying on transport errors,
/// 429 and 5xx with a linear backoff. Other failures surface immediately.
pub async fn send_with_retry<F>(service: &str, mut make_request: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    for attempt in 0..=MAX_RETRIES {
        match make_request().send().await {
            Ok(response) => {
                if response.status().is_success() {
                    return Ok(response);
                }

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    tracing::debug!("{} returned {}, retrying", service, status);
                    sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1))).await;
                    continue;
                }

                anyhow::bail!("{} API error ({}): {}", service, status, body);
            }
            Err(err) => {
                if attempt < MAX_RETRIES {
                    sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1))).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }

    anyhow::bail!("{} request failed after retries", service);
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
