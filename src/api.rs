use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{RetrievalError, SubmissionError, TransientPollError};
use crate::models::{
    DownloadOptions, ErrorResponse, InfoRequest, JobHandle, JobTarget, Metadata,
    ProgressSnapshot, RawProgress, SubmitRequest, SubmitResponse,
};

/// Client-side contract against the download service.
///
/// Every call resolves to a value: network failures are folded into the
/// return type at this boundary and never propagate as panics or
/// unrelated errors.
pub trait Backend: Send + Sync + 'static {
    /// Best effort. `None` on any failure.
    fn fetch_info(&self, target: &JobTarget) -> impl Future<Output = Option<Metadata>> + Send;

    fn submit(
        &self,
        target: &JobTarget,
        options: &DownloadOptions,
    ) -> impl Future<Output = Result<JobHandle, SubmissionError>> + Send;

    fn poll(
        &self,
        handle: &JobHandle,
    ) -> impl Future<Output = Result<ProgressSnapshot, TransientPollError>> + Send;

    /// Location that serves the finished artifact for `handle`.
    fn retrieval_url(&self, handle: &JobHandle) -> String;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base: &Url) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: &Url) -> Self {
        HttpBackend {
            client,
            base: base.as_str().trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Streams the finished artifact into `dir`, naming it after the
    /// `Content-Disposition` filename when the backend sends one.
    pub async fn download_artifact(
        &self,
        handle: &JobHandle,
        dir: &Path,
    ) -> Result<PathBuf, RetrievalError> {
        let mut response = self
            .client
            .get(self.retrieval_url(handle))
            .send()
            .await?
            .error_for_status()?;

        let name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| handle.to_string());

        let path = dir.join(name);

        log::info!("[{}] saving artifact to {:?}", handle, path);

        let mut file = fs::File::create(&path).await?;

        if let Err(err) = write_body(&mut response, &mut file).await {
            drop(file);
            log::warn!("[{}] artifact transfer failed: {}", handle, err);
            let _ = fs::remove_file(&path).await;
            return Err(err);
        }

        Ok(path)
    }
}

async fn write_body(
    response: &mut reqwest::Response,
    file: &mut fs::File,
) -> Result<(), RetrievalError> {
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
    }

    file.flush().await?;

    Ok(())
}

impl Backend for HttpBackend {
    async fn fetch_info(&self, target: &JobTarget) -> Option<Metadata> {
        let response = self
            .client
            .post(self.endpoint("/api/info"))
            .json(&InfoRequest {
                url: target.as_str(),
            })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                log::warn!("metadata request for {} failed: {}", target, err);
                return None;
            }
        };

        if !response.status().is_success() {
            log::debug!(
                "no metadata for {}: status {}",
                target,
                response.status().as_u16()
            );
            return None;
        }

        match response.json::<Metadata>().await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                log::warn!("metadata for {} could not be decoded: {}", target, err);
                None
            }
        }
    }

    async fn submit(
        &self,
        target: &JobTarget,
        options: &DownloadOptions,
    ) -> Result<JobHandle, SubmissionError> {
        let response = self
            .client
            .post(self.endpoint("/api/download"))
            .json(&SubmitRequest {
                url: target.as_str(),
                kind: options.kind(),
                quality: options.quality(),
            })
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            return response
                .json::<SubmitResponse>()
                .await
                .map(|body| body.task_id)
                .map_err(|e| SubmissionError::Transport(e.to_string()));
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned(),
        };

        Err(SubmissionError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn poll(&self, handle: &JobHandle) -> Result<ProgressSnapshot, TransientPollError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/progress/{handle}")))
            .send()
            .await
            .map_err(|e| TransientPollError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransientPollError::Status(response.status().as_u16()));
        }

        response
            .json::<RawProgress>()
            .await
            .map(ProgressSnapshot::from)
            .map_err(|e| TransientPollError::Decode(e.to_string()))
    }

    fn retrieval_url(&self, handle: &JobHandle) -> String {
        self.endpoint(&format!("/api/download/{handle}"))
    }
}

fn filename_from_disposition(header: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).expect("static regex")
    });

    let raw = re.captures(header)?.get(1)?.as_str();
    let decoded = percent_decode(raw);

    // never let the server pick a directory
    Path::new(&decoded)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

fn percent_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", raw.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| raw.to_owned())
}
