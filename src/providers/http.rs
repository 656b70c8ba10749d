use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// JSON-over-HTTPS client shared by every adapter: status classification and
/// bounded retries on rate limits, overloads and network failures.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("http client: {e}")))?;
        Ok(Self { client, retry })
    }

    pub async fn post_json<B: Serialize>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
    ) -> Result<Value, ProviderError> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| ProviderError::Decode(format!("encoding request: {e}")))?;
        self.post_bytes(url, headers, bytes).await
    }

    /// POST an already-encoded JSON body. Used when headers depend on the exact
    /// bytes sent (request signing).
    pub async fn post_bytes(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Value, ProviderError> {
        let mut attempt = 0;
        loop {
            debug!(%url, attempt, "sending provider request");
            match self.send_once(url, headers, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(error = %e, attempt, ?delay, "provider request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(status, error_message(&text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::Decode(format!("{e}: {}", truncate(&text, 200))))
    }
}

/// `error.message` from a JSON error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate(body, 500).to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(
            Duration::from_secs(5),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(10),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn retries_overloaded_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({"error": {"message": "overloaded"}})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let value = client()
            .post_json(
                &format!("{}/v1/messages", server.uri()),
                &[("x-api-key", "k".to_string())],
                &json!({}),
            )
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
            )
            .mount(&server)
            .await;

        let err = client()
            .post_json(&server.uri(), &[], &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Authentication(ref m) if m == "bad key"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }
}
