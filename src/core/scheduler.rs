//! Debounced, mutually exclusive rebuild scheduling.
//!
//! The scheduler knows nothing about file systems: callers feed it
//! [`RebuildTrigger::trigger`] calls and it runs the rebuild job once per
//! quiet period. All rebuilds execute on one worker task, so two rebuilds
//! never overlap; triggers that arrive while a rebuild is running re-arm the
//! timer and yield exactly one follow-up rebuild.
use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

/// Default quiet period between the last event and a rebuild.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Cheap handle used to request a rebuild from any thread.
#[derive(Debug, Clone)]
pub struct RebuildTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl RebuildTrigger {
    /// Request a rebuild. Ignored once the scheduler has stopped.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

pub struct RebuildScheduler {
    trigger: RebuildTrigger,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl RebuildScheduler {
    /// Start the worker task. `job` runs on the blocking pool.
    pub fn spawn<F>(debounce: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_worker(rx, debounce, Arc::new(job), cancel.clone()));

        Self {
            trigger: RebuildTrigger { tx },
            cancel,
            worker: Some(worker),
        }
    }

    pub fn trigger(&self) {
        self.trigger.trigger();
    }

    pub fn trigger_handle(&self) -> RebuildTrigger {
        self.trigger.clone()
    }

    /// Cancel any pending rebuild and wait for the worker to stop.
    ///
    /// A rebuild already running completes first; none starts afterwards.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!("Rebuild worker terminated abnormally: {}", e);
            }
        }
    }
}

impl Drop for RebuildScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker<F>(
    mut events: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    job: Arc<F>,
    cancel: CancellationToken,
) where
    F: Fn() + Send + Sync + 'static,
{
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(()) => deadline = Some(Instant::now() + debounce),
                None => break,
            },
            _ = timer => {
                deadline = None;
                let job = job.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
                    tracing::error!("Rebuild job panicked: {}", e);
                }
            }
        }
    }

    tracing::debug!("Rebuild worker stopped");
}
