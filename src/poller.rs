use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::Backend;
use crate::models::{JobHandle, ProgressSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Snapshot(ProgressSnapshot),
    /// The configured maximum polling duration elapsed without a terminal
    /// snapshot.
    TimedOut,
}

/// Repeating progress query for one job. Dropping it cancels the loop.
pub struct Poller {
    cancel: CancellationToken,
}

impl Poller {
    /// Polls `handle` every `interval` and hands each snapshot to `emit`. The
    /// loop ends after a terminal snapshot, on cancellation, when `emit`
    /// reports the receiver gone, or once `max_duration` has passed.
    pub fn spawn<B, F>(
        backend: Arc<B>,
        handle: JobHandle,
        interval: Duration,
        max_duration: Option<Duration>,
        emit: F,
    ) -> Poller
    where
        B: Backend,
        F: FnMut(PollEvent) -> bool + Send + 'static,
    {
        let cancel = CancellationToken::new();
        tokio::spawn(run(
            backend,
            handle,
            interval,
            max_duration,
            cancel.clone(),
            emit,
        ));

        Poller { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<B, F>(
    backend: Arc<B>,
    handle: JobHandle,
    interval: Duration,
    max_duration: Option<Duration>,
    cancel: CancellationToken,
    mut emit: F,
) where
    B: Backend,
    F: FnMut(PollEvent) -> bool + Send + 'static,
{
    let started = Instant::now();
    let mut ticker = time::interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::debug!("[{}] poller: started", handle);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("[{}] poller: cancelled", handle);
                return;
            }
            _ = ticker.tick() => {}
        }

        if let Some(max) = max_duration {
            if started.elapsed() >= max {
                log::warn!("[{}] poller: gave up after {:?}", handle, max);
                emit(PollEvent::TimedOut);
                return;
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("[{}] poller: cancelled while a request was in flight", handle);
                return;
            }
            result = backend.poll(&handle) => result,
        };

        match result {
            Ok(snapshot) => {
                let terminal = snapshot.is_terminal();

                if !emit(PollEvent::Snapshot(snapshot)) {
                    log::debug!("[{}] poller: receiver gone", handle);
                    return;
                }

                if terminal {
                    log::debug!("[{}] poller: reached terminal state", handle);
                    return;
                }
            }
            Err(err) => {
                log::warn!("[{}] poller: {}, retrying on next tick", handle, err);
            }
        }
    }
}
