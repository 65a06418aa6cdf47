//! Interaction state for one client session: URL input, metadata preview,
//! a single active download job and the progress panel that tracks it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::Backend;
use crate::config::ControllerConfig;
use crate::error::{ClientError, ClipboardError};
use crate::models::{DownloadOptions, JobHandle, Metadata, ProgressSnapshot};
use crate::normalize::{recognize, validate};
use crate::poller::{PollEvent, Poller};
use crate::progress::{render, ProgressView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Idle,
    InfoLoaded,
    Submitting,
    InProgress,
    Completed,
    Error,
}

/// Rendering surface driven by the [`Controller`].
pub trait View {
    fn set_input(&mut self, url: &str);
    fn show_metadata(&mut self, metadata: &Metadata);
    fn set_progress_visible(&mut self, visible: bool);
    fn render_progress(&mut self, progress: &ProgressView);
    /// Bar at 0 %, label back to preparing, detail cleared.
    fn reset_progress(&mut self);
    fn set_submit_enabled(&mut self, enabled: bool);
    /// Shows the result-download control bound to `url`, or hides it.
    fn set_retrieval(&mut self, url: Option<&str>);
    fn show_message(&mut self, message: &str);
}

pub trait Clipboard {
    fn read_text(&self) -> impl Future<Output = Result<String, ClipboardError>>;
}

/// A completed job handed out for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    pub handle: JobHandle,
    pub url: String,
}

#[derive(Debug)]
enum Event {
    Poll { generation: u64, event: PollEvent },
    ResetControls { generation: u64 },
    ClearPanel { generation: u64 },
}

struct ActiveJob {
    handle: JobHandle,
    poller: Option<Poller>,
    retrieved: bool,
}

pub struct Controller<B: Backend, V: View> {
    backend: Arc<B>,
    view: V,
    config: ControllerConfig,
    state: UiState,
    input: String,
    active: Option<ActiveJob>,
    /// Bumped on every submission; events tagged with an older value are stale.
    generation: u64,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
}

impl<B: Backend, V: View> Controller<B, V> {
    pub fn new(backend: Arc<B>, view: V, config: ControllerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Controller {
            backend,
            view,
            config,
            state: UiState::Idle,
            input: String::new(),
            active: None,
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn active_handle(&self) -> Option<&JobHandle> {
        self.active.as_ref().map(|job| &job.handle)
    }

    /// Page-load auto-detect: a recognised URL on the clipboard fills the
    /// input and loads its metadata. Clipboard failures are ignored.
    pub async fn on_load(&mut self, clipboard: &impl Clipboard) {
        match clipboard.read_text().await {
            Ok(text) if recognize(&text).is_some() => {
                self.set_input(&text);
                self.load_info(&text).await;
            }
            Ok(_) => {}
            Err(err) => log::debug!("clipboard auto-detect skipped: {}", err),
        }
    }

    /// Paste action: clipboard text replaces the input, metadata is fetched
    /// when it is a recognised URL.
    pub async fn paste(&mut self, clipboard: &impl Clipboard) {
        match clipboard.read_text().await {
            Ok(text) if !text.is_empty() => {
                self.set_input(&text);
                if recognize(&text).is_some() {
                    self.load_info(&text).await;
                }
            }
            Ok(_) => {}
            Err(err) => log::warn!("{}, falling back to manual input", err),
        }
    }

    /// Input lost focus with `raw` in it.
    pub async fn blur(&mut self, raw: &str) {
        self.input = raw.to_owned();

        let trimmed = raw.trim();
        if !trimmed.is_empty() && recognize(trimmed).is_some() {
            self.load_info(trimmed).await;
        }
    }

    async fn load_info(&mut self, raw: &str) {
        let Some(target) = recognize(raw) else {
            return;
        };

        if target.as_str() != raw {
            log::info!("normalized {} to {}", raw, target);
            self.set_input(target.as_str());
        }

        match self.backend.fetch_info(&target).await {
            Some(metadata) => {
                self.view.show_metadata(&metadata);
                if self.state == UiState::Idle {
                    self.state = UiState::InfoLoaded;
                }
            }
            None => log::debug!("no metadata for {}, keeping current preview", target),
        }
    }

    fn set_input(&mut self, text: &str) {
        self.input = text.to_owned();
        self.view.set_input(text);
    }

    /// Validates `raw`, starts a job and begins polling it. Any job already
    /// being tracked is abandoned first.
    pub async fn submit(
        &mut self,
        raw: &str,
        options: DownloadOptions,
    ) -> Result<JobHandle, ClientError> {
        let target = match validate(raw) {
            Ok(target) => target,
            Err(err) => {
                self.view.show_message(&err.to_string());
                return Err(err.into());
            }
        };

        self.set_input(target.as_str());
        self.stop_polling();
        self.active = None;
        self.generation += 1;

        self.state = UiState::Submitting;
        self.view.set_progress_visible(true);
        self.view.set_retrieval(None);
        self.view.set_submit_enabled(false);
        self.view.reset_progress();

        match self.backend.submit(&target, &options).await {
            Ok(handle) => {
                log::info!(
                    "[{}] submitted {} ({:?}, {})",
                    handle,
                    target,
                    options.kind(),
                    options.quality()
                );
                self.start_polling(handle.clone());
                self.state = UiState::InProgress;
                Ok(handle)
            }
            Err(err) => {
                log::warn!("submission of {} failed: {}", target, err);
                self.view.show_message(&err.to_string());
                self.state = UiState::Error;
                self.reset_controls();
                Err(err.into())
            }
        }
    }

    fn start_polling(&mut self, handle: JobHandle) {
        let generation = self.generation;
        let tx = self.tx.clone();

        let poller = Poller::spawn(
            self.backend.clone(),
            handle.clone(),
            self.config.poll_interval,
            self.config.max_poll_duration,
            move |event| tx.send(Event::Poll { generation, event }).is_ok(),
        );

        self.active = Some(ActiveJob {
            handle,
            poller: Some(poller),
            retrieved: false,
        });
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.active.as_mut().and_then(|job| job.poller.take()) {
            poller.cancel();
        }
    }

    /// Hands out the completed job's artifact location once, then resets
    /// the controls after the retrieval delay.
    pub fn retrieve(&mut self) -> Option<Retrieval> {
        if self.state != UiState::Completed {
            return None;
        }

        let job = self.active.as_mut().filter(|job| !job.retrieved)?;
        job.retrieved = true;

        let retrieval = Retrieval {
            url: self.backend.retrieval_url(&job.handle),
            handle: job.handle.clone(),
        };

        self.schedule(
            self.config.retrieval_reset_delay,
            Event::ResetControls {
                generation: self.generation,
            },
        );

        Some(retrieval)
    }

    /// Re-enables submission, forgets the job and clears the panel after
    /// the error delay.
    fn reset_controls(&mut self) {
        self.stop_polling();
        self.active = None;
        self.view.set_submit_enabled(true);

        self.schedule(
            self.config.error_reset_delay,
            Event::ClearPanel {
                generation: self.generation,
            },
        );
    }

    fn schedule(&self, delay: Duration, event: Event) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    fn fail_job(&mut self, message: String) {
        self.view.show_message(&message);
        self.state = UiState::Error;
        self.reset_controls();
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Poll { generation, .. }
            | Event::ResetControls { generation }
            | Event::ClearPanel { generation }
                if generation != self.generation =>
            {
                log::debug!("dropping stale event from generation {}", generation);
            }
            Event::Poll { event, .. } => self.apply_poll(event),
            Event::ResetControls { .. } => self.reset_controls(),
            Event::ClearPanel { .. } => {
                self.view.set_progress_visible(false);
                self.view.reset_progress();
                self.view.set_retrieval(None);
                self.state = UiState::Idle;
            }
        }
    }

    fn apply_poll(&mut self, event: PollEvent) {
        if self.state != UiState::InProgress {
            return;
        }

        let snapshot = match event {
            PollEvent::Snapshot(snapshot) => snapshot,
            PollEvent::TimedOut => {
                self.fail_job("下載失敗: 輪詢逾時".to_owned());
                return;
            }
        };

        self.view.render_progress(&render(&snapshot));

        match snapshot {
            ProgressSnapshot::Completed { .. } => {
                self.stop_polling();
                self.state = UiState::Completed;

                if let Some(job) = &self.active {
                    log::info!("[{}] completed", job.handle);
                    let url = self.backend.retrieval_url(&job.handle);
                    self.view.set_retrieval(Some(&url));
                }
            }
            ProgressSnapshot::Error { message } => {
                let message = message.unwrap_or_else(|| "未知錯誤".to_owned());
                if let Some(job) = &self.active {
                    log::warn!("[{}] job failed: {}", job.handle, message);
                }
                self.fail_job(format!("下載失敗: {message}"));
            }
            _ => {}
        }
    }

    /// Waits for the next poll result or timer and applies it.
    pub async fn next_event(&mut self) -> UiState {
        if let Some(event) = self.rx.recv().await {
            self.apply(event);
        }
        self.state
    }

    /// Drives the active job until it leaves the in-progress state.
    pub async fn run_until_settled(&mut self) -> UiState {
        while matches!(self.state, UiState::Submitting | UiState::InProgress) {
            self.next_event().await;
        }
        self.state
    }

    /// Processes events until the controller is back to idle. Only returns
    /// once a reset is pending, e.g. after an error or a retrieval.
    pub async fn run_until_idle(&mut self) -> UiState {
        while self.state != UiState::Idle {
            self.next_event().await;
        }
        self.state
    }
}
