//! LLM provider adapter.
//!
//! Translates between the orchestrator's provider-agnostic conversation
//! history and each vendor's wire format, and classifies vendor errors into
//! the shared [`conduit_types::ErrorKind`] taxonomy.

pub mod claude;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod translate;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;

use std::future::Future;
use std::pin::Pin;
use std::sync::OnceLock;
use std::time::Duration;

use conduit_types::{ConversationItem, ErrorKind, ToolSpec};

/// Connection timeout for API requests.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum bytes for an SSE buffer before aborting (4 MiB). Guards against
/// unbounded growth from a misbehaving or malicious server.
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Maximum bytes read from an error response body (32 KiB).
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared HTTP client for all provider requests: no request timeout (SSE
/// streams run for extended periods), redirects disabled, HTTPS only.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .https_only(true)
            .build()
            .expect("build shared HTTP client")
    })
}

/// HTTP client with a total request timeout, for non-streaming calls such
/// as local compaction.
pub fn http_client_with_timeout(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("build HTTP client with timeout")
}

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;
    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }
            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }
    found.then_some(data)
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            return format!("{}...(truncated)", String::from_utf8_lossy(&body));
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Whether and how the provider should expose web search for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WebSearchMode {
    #[default]
    Off,
    Cached,
    Live,
}

/// A request to an LLM provider, built from the orchestrator's current
/// history and enabled tool specs.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub history: Vec<ConversationItem>,
    pub tool_specs: Vec<ToolSpec>,
    pub base_instructions: String,
    pub developer_instructions: String,
    pub user_instructions: String,
    pub previous_response_id: Option<String>,
    pub web_search_mode: WebSearchMode,
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Why the provider stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A completed LLM turn: the items to append to history, why it stopped,
/// token usage, and (for providers with server-side state) a response id
/// to carry forward as `previous_response_id`.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub items: Vec<ConversationItem>,
    pub finish_reason: FinishReason,
    pub token_usage: TokenUsage,
    pub response_id: Option<String>,
}

/// A provider-adapter failure, carrying enough to classify into an
/// [`ErrorKind`] without re-parsing the underlying transport error.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("response decode error: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Maps an HTTP status plus message to the shared error taxonomy:
    /// 400/401/403/404/422 are fatal, 408/409/5xx are transient, 429 is
    /// `api_limit`, and any message mentioning context-length overflow is
    /// `context_overflow` regardless of status.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        let message = self.message_for_classification();
        if mentions_context_overflow(message) {
            return ErrorKind::ContextOverflow;
        }
        match self {
            Self::Http { status, .. } => classify_http_status(*status),
            Self::Transport(msg) | Self::Decode(msg) => {
                if msg.to_lowercase().contains("rate limit") {
                    ErrorKind::ApiLimit
                } else {
                    ErrorKind::Transient
                }
            }
        }
    }

    fn message_for_classification(&self) -> &str {
        match self {
            Self::Http { message, .. } | Self::Transport(message) | Self::Decode(message) => {
                message
            }
        }
    }
}

fn mentions_context_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context_length") || lower.contains("maximum context length")
}

fn classify_http_status(status: u16) -> ErrorKind {
    match status {
        400 | 401 | 403 | 404 | 422 => ErrorKind::Fatal,
        429 => ErrorKind::ApiLimit,
        408 | 409 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Transient,
    }
}

/// Future type returned by [`LlmProvider::complete`]; boxed so the trait
/// stays object-safe and callers can hold a `Box<dyn LlmProvider>`.
pub type CompleteFut<'a> = Pin<Box<dyn Future<Output = Result<LlmResponse, ProviderError>> + Send + 'a>>;

/// A vendor-agnostic LLM backend. The orchestrator never branches on
/// provider identity beyond picking one `dyn LlmProvider` at session start.
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn complete<'a>(&'a self, request: &'a LlmRequest) -> CompleteFut<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_statuses_per_table() {
        for status in [400, 401, 403, 404, 422] {
            assert_eq!(classify_http_status(status), ErrorKind::Fatal);
        }
        for status in [408, 409, 500, 502, 503] {
            assert_eq!(classify_http_status(status), ErrorKind::Transient);
        }
        assert_eq!(classify_http_status(429), ErrorKind::ApiLimit);
    }

    #[test]
    fn context_overflow_message_wins_regardless_of_status() {
        let err = ProviderError::Http {
            status: 400,
            message: "maximum context length exceeded".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ContextOverflow);
    }

    #[test]
    fn non_http_rate_limit_message_classifies_as_api_limit() {
        let err = ProviderError::Transport("rate limit hit, backoff".to_string());
        assert_eq!(err.kind(), ErrorKind::ApiLimit);
    }

    #[test]
    fn non_http_generic_transport_error_is_transient() {
        let err = ProviderError::Transport("connection reset".to_string());
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn sse_event_boundary_prefers_earliest_delimiter() {
        let buf = b"data: a\n\ndata: b\r\n\r\n".to_vec();
        let (pos, len) = find_sse_event_boundary(&buf).unwrap();
        assert_eq!(&buf[..pos], b"data: a");
        assert_eq!(len, 2);
    }

    #[test]
    fn extracts_multiline_sse_data() {
        let event = "event: message\ndata: line one\ndata: line two\n";
        assert_eq!(extract_sse_data(event), Some("line one\nline two".to_string()));
    }

    #[test]
    fn extract_sse_data_returns_none_without_data_field() {
        assert_eq!(extract_sse_data("event: ping\n"), None);
    }
}
