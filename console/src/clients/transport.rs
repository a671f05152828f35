use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, trace};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::TransportError;
use crate::config::HostConfig;
use crate::error::Error;

/// How a streamed request ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The host closed the response body.
    Completed,
    /// The chunk observer asked to stop reading.
    Stopped,
}

/// HTTP client bound to the inference host's base URL.
///
/// Single-shot calls are bounded by a fixed request timeout. Streamed calls
/// have no overall limit; instead every wait for the next chunk is bounded
/// by the idle timeout, so a pull that keeps sending progress never times out.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl Transport {
    pub fn new(config: &HostConfig) -> Result<Self, Error> {
        let base_url = config.parsed_base_url()?;

        // No client-wide timeout: it would also cut off long pulls
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;

        debug!("Inference host: {}", base_url);

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout(),
            idle_timeout: config.stream_idle_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request_builder(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidPath {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder)
    }

    /// Issue a single-shot request and return the response body as text.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, TransportError> {
        let limit = self.request_timeout;
        debug!("{} {}", method, path);

        // reqwest's per-request timeout covers sending and reading the body
        let request = self.request_builder(method, path, body)?.timeout(limit);
        let response = guard(cancel, None, request.send())
            .await?
            .map_err(|e| TransportError::from_reqwest(e, Some(limit)))?;

        let status = response.status();
        let text = guard(cancel, None, response.text())
            .await?
            .map_err(|e| TransportError::from_reqwest(e, Some(limit)))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_message(&text),
            });
        }

        Ok(text)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let text = self.request(Method::GET, path, None, None).await?;
        decode(&text)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, TransportError> {
        let text = self.request(Method::POST, path, Some(body), None).await?;
        decode(&text)
    }

    /// Issue a request whose response is read incrementally.
    ///
    /// `on_chunk` is called after every received chunk with the *entire*
    /// response text accumulated so far, and may return
    /// `ControlFlow::Break(())` to stop reading. A multi-byte character split
    /// across chunks is held back until it is complete.
    pub async fn stream<F>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        cancel: Option<&CancellationToken>,
        mut on_chunk: F,
    ) -> Result<StreamEnd, TransportError>
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let idle = self.idle_timeout;
        debug!("{} {} (streaming)", method, path);

        let request = self.request_builder(method, path, body)?;
        let response = guard(cancel, Some(idle), request.send())
            .await?
            .map_err(|e| TransportError::from_reqwest(e, Some(idle)))?;

        let status = response.status();
        if !status.is_success() {
            let text = guard(cancel, Some(idle), response.text())
                .await?
                .unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_message(&text),
            });
        }

        let mut chunks = response.bytes_stream();
        let mut text = Utf8Accumulator::default();

        loop {
            // Every chunk restarts the idle timer
            let next = guard(cancel, Some(idle), chunks.next()).await?;
            let chunk = match next {
                Some(chunk) => chunk.map_err(|e| TransportError::from_reqwest(e, Some(idle)))?,
                None => {
                    debug!("Stream closed after {} bytes", text.as_str().len());
                    return Ok(StreamEnd::Completed);
                }
            };

            trace!("Received chunk of {} bytes", chunk.len());
            text.push(&chunk);

            if on_chunk(text.as_str()).is_break() {
                debug!("Stream observer stopped reading");
                return Ok(StreamEnd::Stopped);
            }
        }
    }
}

/// Await `fut`, giving up when `cancel` fires or `limit` elapses.
async fn guard<F: Future>(
    cancel: Option<&CancellationToken>,
    limit: Option<Duration>,
    fut: F,
) -> Result<F::Output, TransportError> {
    let limited = async {
        match limit {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| TransportError::Timeout { after }),
            None => Ok(fut.await),
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = limited => result,
        },
        None => limited.await,
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
}

/// The host reports failures as `{"error": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Response text built from raw byte chunks.
#[derive(Debug, Default)]
struct Utf8Accumulator {
    text: String,
    /// Trailing bytes of an incomplete character
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid_len]));

                    match e.error_len() {
                        // Incomplete character at the end, wait for more bytes
                        None => {
                            self.pending.drain(..valid_len);
                            return;
                        }
                        Some(invalid_len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_len + invalid_len);
                        }
                    }
                }
            }
        }
    }

    fn as_str(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer, idle_timeout_secs: u64) -> Transport {
        let config = HostConfig {
            base_url: server.uri(),
            request_timeout_secs: 2,
            connect_timeout_secs: 2,
            stream_idle_timeout_secs: idle_timeout_secs,
        };
        Transport::new(&config).unwrap()
    }

    #[test]
    fn test_utf8_accumulator_holds_back_split_characters() {
        let mut text = Utf8Accumulator::default();
        let bytes = "{\"status\":\"téléchargement\"}".as_bytes();
        // Split inside the two-byte 'é'
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        text.push(&bytes[..split]);
        assert_eq!(text.as_str(), "{\"status\":\"t");

        text.push(&bytes[split..]);
        assert_eq!(text.as_str(), "{\"status\":\"téléchargement\"}");
    }

    #[test]
    fn test_utf8_accumulator_replaces_invalid_bytes() {
        let mut text = Utf8Accumulator::default();
        text.push(b"ok\xFFok");
        assert_eq!(text.as_str(), "ok\u{FFFD}ok");
    }

    #[test]
    fn test_error_message_prefers_host_error_field() {
        assert_eq!(
            error_message(r#"{"error":"model 'nope' not found"}"#),
            "model 'nope' not found"
        );
        assert_eq!(error_message(" 404 page not found\n"), "404 page not found");
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{ "name": "phi3:latest", "digest": "abc" }]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server, 5);
        let value: Value = transport.get_json("api/tags").await.unwrap();
        assert_eq!(value["models"][0]["name"], "phi3:latest");
    }

    #[tokio::test]
    async fn test_status_error_carries_host_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/show"))
            .and(body_json(serde_json::json!({ "model": "nope" })))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "error": "model 'nope' not found" })),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server, 5);
        let err = transport
            .post_json::<Value>("api/show", &serde_json::json!({ "model": "nope" }))
            .await
            .unwrap_err();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "model 'nope' not found");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_passes_accumulated_text() {
        let server = MockServer::start().await;
        let body = "{\"status\":\"pulling manifest\"}\n{\"status\":\"success\"}\n";
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let transport = transport_for(&server, 5);
        let mut last_text = String::new();
        let end = transport
            .stream(Method::POST, "api/pull", None, None, |text| {
                last_text = text.to_string();
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(last_text, body);
    }

    #[tokio::test]
    async fn test_stream_observer_can_stop_reading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"success\"}\n"))
            .mount(&server)
            .await;

        let transport = transport_for(&server, 5);
        let mut calls = 0;
        let end = transport
            .stream(Method::POST, "api/pull", None, None, |_| {
                calls += 1;
                ControlFlow::Break(())
            })
            .await
            .unwrap();

        assert_eq!(end, StreamEnd::Stopped);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_stream_cancelled_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"status\":\"success\"}\n")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server, 5);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = transport
            .stream(Method::POST, "api/pull", None, Some(&token), |_| {
                ControlFlow::Continue(())
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stream_idle_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"status\":\"success\"}\n")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server, 1);
        let err = transport
            .stream(Method::POST, "api/pull", None, None, |_| {
                ControlFlow::Continue(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) is closed on test machines
        let config = HostConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..HostConfig::default()
        };
        let transport = Transport::new(&config).unwrap();

        let err = transport.get_json::<Value>("api/tags").await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)), "{:?}", err);
    }
}
