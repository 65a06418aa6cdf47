use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical watch-page URL for a single video. Only produced by
/// [`crate::normalize::recognize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobTarget(String);

impl JobTarget {
    pub(crate) fn from_canonical(url: String) -> Self {
        JobTarget(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-issued identifier for one download job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        JobHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Audio,
    Video,
}

pub struct QualityOption {
    pub token: &'static str,
    pub label: &'static str,
}

/// Presented in descending preference order.
pub static AUDIO_QUALITIES: [QualityOption; 5] = [
    QualityOption { token: "320", label: "最佳品質 (320 kbps)" },
    QualityOption { token: "256", label: "高品質 (256 kbps)" },
    QualityOption { token: "192", label: "標準品質 (192 kbps)" },
    QualityOption { token: "128", label: "一般品質 (128 kbps)" },
    QualityOption { token: "96", label: "低品質 (96 kbps)" },
];

pub static VIDEO_QUALITIES: [QualityOption; 7] = [
    QualityOption { token: "best", label: "最佳品質 (Best)" },
    QualityOption { token: "2160p", label: "4K (2160p)" },
    QualityOption { token: "1440p", label: "2K (1440p)" },
    QualityOption { token: "1080p", label: "Full HD (1080p)" },
    QualityOption { token: "720p", label: "HD (720p)" },
    QualityOption { token: "480p", label: "SD (480p)" },
    QualityOption { token: "360p", label: "低品質 (360p)" },
];

impl DownloadKind {
    pub fn qualities(self) -> &'static [QualityOption] {
        match self {
            DownloadKind::Audio => &AUDIO_QUALITIES,
            DownloadKind::Video => &VIDEO_QUALITIES,
        }
    }

    pub fn default_quality(self) -> &'static str {
        match self {
            DownloadKind::Audio => "192",
            DownloadKind::Video => "best",
        }
    }

    /// Heading of the quality selector for this kind.
    pub fn group_label(self) -> &'static str {
        match self {
            DownloadKind::Audio => "音訊品質",
            DownloadKind::Video => "影片品質",
        }
    }
}

/// Built fresh from the current selection on every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    kind: DownloadKind,
    quality: &'static str,
}

impl DownloadOptions {
    /// Returns `None` when `quality` is not one of the tokens offered for `kind`.
    pub fn new(kind: DownloadKind, quality: &str) -> Option<Self> {
        kind.qualities()
            .iter()
            .find(|q| q.token == quality)
            .map(|q| DownloadOptions { kind, quality: q.token })
    }

    pub fn with_default_quality(kind: DownloadKind) -> Self {
        DownloadOptions {
            kind,
            quality: kind.default_quality(),
        }
    }

    pub fn kind(&self) -> DownloadKind {
        self.kind
    }

    pub fn quality(&self) -> &'static str {
        self.quality
    }
}

/// Display metadata returned by `POST /api/info`. The backend passes
/// through whatever the extractor reported, so any field may be null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct InfoRequest<'a> {
    pub url: &'a str,
}

#[derive(Serialize, Debug)]
pub struct SubmitRequest<'a> {
    pub url: &'a str,
    #[serde(rename = "type")]
    pub kind: DownloadKind,
    pub quality: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct SubmitResponse {
    pub task_id: JobHandle,
}

#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wire form of `GET /api/progress/{task_id}`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RawProgress {
    pub status: String,
    pub progress: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
}

/// One polled status report for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressSnapshot {
    Preparing,
    Downloading {
        progress: Option<String>,
        speed: Option<String>,
        eta: Option<String>,
    },
    Processing,
    Completed { title: Option<String> },
    Error { message: Option<String> },
    /// Status this client does not know; polling continues.
    Other(String),
}

impl ProgressSnapshot {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressSnapshot::Completed { .. } | ProgressSnapshot::Error { .. })
    }
}

impl From<RawProgress> for ProgressSnapshot {
    fn from(raw: RawProgress) -> Self {
        match raw.status.as_str() {
            "preparing" => ProgressSnapshot::Preparing,
            "downloading" => ProgressSnapshot::Downloading {
                progress: raw.progress,
                speed: raw.speed,
                eta: raw.eta,
            },
            "processing" => ProgressSnapshot::Processing,
            "completed" => ProgressSnapshot::Completed { title: raw.title },
            "error" => ProgressSnapshot::Error { message: raw.error },
            _ => ProgressSnapshot::Other(raw.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_tolerates_null_and_missing_fields() {
        let metadata: Metadata =
            serde_json::from_str(r#"{"title":"x","uploader":null,"thumbnail":null}"#).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("x"));
        assert!(metadata.uploader.is_none());
        assert!(metadata.thumbnail.is_none());

        let metadata: Metadata = serde_json::from_str(r#"{"title":null}"#).unwrap();
        assert_eq!(metadata, Metadata::default());
    }

    #[test]
    fn options_reject_tokens_from_the_other_kind() {
        assert!(DownloadOptions::new(DownloadKind::Audio, "256").is_some());
        assert!(DownloadOptions::new(DownloadKind::Audio, "1080p").is_none());
        assert!(DownloadOptions::new(DownloadKind::Video, "320").is_none());
        assert_eq!(
            DownloadOptions::with_default_quality(DownloadKind::Video).quality(),
            "best"
        );
    }

    #[test]
    fn submit_request_uses_type_field() {
        let body = SubmitRequest {
            url: "https://www.youtube.com/watch?v=abc123",
            kind: DownloadKind::Audio,
            quality: "256",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["quality"], "256");
    }

    #[test]
    fn progress_statuses_map_to_snapshots() {
        let raw: RawProgress = serde_json::from_str(
            r#"{"status":"downloading","progress":"42.0%","speed":"1.2MB/s","eta":"00:10"}"#,
        )
        .unwrap();
        assert_eq!(
            ProgressSnapshot::from(raw),
            ProgressSnapshot::Downloading {
                progress: Some("42.0%".into()),
                speed: Some("1.2MB/s".into()),
                eta: Some("00:10".into()),
            }
        );

        let raw: RawProgress = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        let snapshot = ProgressSnapshot::from(raw);
        assert_eq!(snapshot, ProgressSnapshot::Other("queued".into()));
        assert!(!snapshot.is_terminal());

        let raw: RawProgress =
            serde_json::from_str(r#"{"status":"error","error":"boom"}"#).unwrap();
        assert!(ProgressSnapshot::from(raw).is_terminal());
    }
}
