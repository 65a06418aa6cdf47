use thiserror::Error;

/// Input rejected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("請輸入 YouTube 網址")]
    Empty,
    #[error("請輸入有效的 YouTube 網址")]
    Unrecognized,
}

/// Job submission failed. Always surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("下載失敗: {message}")]
    Rejected { status: u16, message: String },
    #[error("網路錯誤: {0}")]
    Transport(String),
}

/// A single poll attempt failed. Logged and retried on the next tick, never
/// escalated to a job error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientPollError {
    #[error("progress endpoint answered with status {0}")]
    Status(u16),
    #[error("progress request failed: {0}")]
    Transport(String),
    #[error("progress response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid backend url {url}: {source}")]
    InvalidBackend {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// The proxy could not reach the network for a forwarded request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("offline")]
    Offline,
    #[error("upstream request failed: {0}")]
    Request(String),
}

/// Eager population of a cache generation failed; nothing was stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallError {
    #[error("failed to fetch {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: NetworkError,
    },
    #[error("failed to fetch {path}: status {status}")]
    Status { path: String, status: u16 },
    #[error("{path} is larger than the {limit} byte cache entry limit")]
    TooLarge { path: String, limit: usize },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("artifact request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
