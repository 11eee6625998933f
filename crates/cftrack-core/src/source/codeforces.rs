//! HTTP client for the public Codeforces API.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::payload::{parse_envelope, parse_rating_history, parse_submissions};
use super::{ExternalRatingChange, JudgeSource, SourceError, SourceResult, SubmissionPage};
use crate::config::{SyncSettings, MAX_PAGE_SIZE};

/// Paced `reqwest` client for `user.status` and `user.rating`.
///
/// Requests issued through one client are spaced at least
/// `min_request_interval` apart; the judge throttles anonymous callers that
/// go faster.
pub struct CodeforcesClient {
    base_url: String,
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl CodeforcesClient {
    pub fn new(settings: &SyncSettings) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("cftrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| SourceError::InvalidRequest(error.to_string()))?;

        Ok(Self {
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            client,
            min_interval: settings.min_request_interval(),
            last_request: Mutex::new(None),
        })
    }

    /// Wait until the next request is allowed, then claim the slot.
    async fn throttle(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    async fn call(&self, method: &str, query: &[(&str, String)]) -> SourceResult<serde_json::Value> {
        self.throttle().await;

        let url = format!("{}/{method}", self.base_url);
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        parse_envelope(status.as_u16(), &body)
    }
}

fn transport_error(error: reqwest::Error) -> SourceError {
    if error.is_decode() {
        SourceError::InvalidPayload(error.to_string())
    } else {
        SourceError::Unavailable(error.to_string())
    }
}

fn require_handle(handle: &str) -> SourceResult<&str> {
    let handle = handle.trim();
    if handle.is_empty() {
        return Err(SourceError::InvalidRequest(
            "handle must not be empty".to_string(),
        ));
    }
    Ok(handle)
}

impl JudgeSource for CodeforcesClient {
    async fn fetch_submission_page(
        &self,
        handle: &str,
        start: u32,
        count: u32,
    ) -> SourceResult<SubmissionPage> {
        let handle = require_handle(handle)?;
        if start == 0 {
            return Err(SourceError::InvalidRequest(
                "start is 1-based".to_string(),
            ));
        }
        if count == 0 || count > MAX_PAGE_SIZE {
            return Err(SourceError::InvalidRequest(format!(
                "count must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let result = self
            .call(
                "user.status",
                &[
                    ("handle", handle.to_string()),
                    ("from", start.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;

        let parsed = parse_submissions(result)?;
        Ok(SubmissionPage {
            fetched: parsed.fetched(),
            items: parsed.items,
        })
    }

    async fn fetch_rating_history(&self, handle: &str) -> SourceResult<Vec<ExternalRatingChange>> {
        let handle = require_handle(handle)?;
        let result = self
            .call("user.rating", &[("handle", handle.to_string())])
            .await?;
        Ok(parse_rating_history(result)?.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client(min_request_interval_ms: u64) -> CodeforcesClient {
        CodeforcesClient::new(&SyncSettings {
            api_base_url: "http://127.0.0.1:9/api/".to_string(),
            min_request_interval_ms,
            ..SyncSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        assert_eq!(client(0).base_url, "http://127.0.0.1:9/api");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn throttle_spaces_requests() {
        let client = client(60);
        let started = Instant::now();
        client.throttle().await;
        client.throttle().await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_out_of_range_pages_without_network() {
        let client = client(0);

        let error = client.fetch_submission_page("tourist", 0, 10).await.unwrap_err();
        assert!(matches!(error, SourceError::InvalidRequest(_)));

        let error = client
            .fetch_submission_page("tourist", 1, MAX_PAGE_SIZE + 1)
            .await
            .unwrap_err();
        assert!(matches!(error, SourceError::InvalidRequest(_)));

        let error = client.fetch_rating_history("  ").await.unwrap_err();
        assert!(matches!(error, SourceError::InvalidRequest(_)));
    }

    fn local_client(addr: std::net::SocketAddr) -> CodeforcesClient {
        CodeforcesClient::new(&SyncSettings {
            api_base_url: format!("http://{addr}/api"),
            request_timeout_secs: 1,
            min_request_interval_ms: 0,
            ..SyncSettings::default()
        })
        .unwrap()
    }

    /// Accept one connection, read the request, answer with `response`.
    async fn serve_once(response: String) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0_u8; 4096];
            let _ = socket.read(&mut buffer).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        addr
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn silent_server_times_out_as_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let started = Instant::now();
        let error = local_client(addr)
            .fetch_rating_history("tourist")
            .await
            .unwrap_err();

        assert!(matches!(error, SourceError::Unavailable(_)), "{error:?}");
        assert!(error.is_unavailable());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_envelope_surfaces_judge_comment() {
        let body = r#"{"status":"FAILED","comment":"handle: User with handle x not found"}"#;
        let addr = serve_once(format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let error = local_client(addr)
            .fetch_submission_page("x", 1, 10)
            .await
            .unwrap_err();

        assert_eq!(
            error,
            SourceError::Api("handle: User with handle x not found".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ok_envelope_yields_parsed_page() {
        let body = r#"{"status":"OK","result":[{"id":7,"creationTimeSeconds":1700000000,"problem":{"contestId":1900,"index":"A"},"verdict":"OK"},{"id":0}]}"#;
        let addr = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let page = local_client(addr)
            .fetch_submission_page("tourist", 1, 10)
            .await
            .unwrap();

        assert_eq!(page.fetched, 2);
        assert_eq!(page.latest_id(), Some(7));
    }
}
