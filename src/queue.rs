use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

type Job = BoxFuture<'static, anyhow::Result<()>>;

/// Single-concurrency FIFO job runner.
///
/// Everything that touches the codec's virtual filesystem or lifecycle goes
/// through here: jobs run strictly in push order, at most one at a time, and
/// a job never starts before its predecessor has fully settled. The handle
/// is cheap to clone; all clones feed the same driver task.
///
/// Failure policy: a job that rejects (or panics on a device protocol
/// assertion) records the first error and drops the not-yet-started backlog;
/// the error surfaces from the next `flush`. The queue keeps accepting new
/// jobs afterwards so the cancel path can still enqueue its compensation
/// work.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
    cancel: CancellationToken,
}

struct QueueInner {
    state: Mutex<QueueState>,
    wake: Notify,
    idle_tx: watch::Sender<bool>,
}

struct QueueState {
    jobs: VecDeque<Job>,
    error: Option<Arc<anyhow::Error>>,
}

impl JobQueue {
    /// Spawns the driver task; must be called within a tokio runtime.
    pub fn new() -> Self {
        let (idle_tx, _) = watch::channel(true);
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                error: None,
            }),
            wake: Notify::new(),
            idle_tx,
        });
        let cancel = CancellationToken::new();

        let inner_clone = Arc::clone(&inner);
        let cancel_clone = cancel.clone();
        tokio::spawn(async move { Self::drive(inner_clone, cancel_clone).await });

        Self { inner, cancel }
    }

    async fn drive(inner: Arc<QueueInner>, cancel: CancellationToken) {
        loop {
            let job = {
                let mut state = inner.state.lock().unwrap();
                match state.jobs.pop_front() {
                    Some(job) => {
                        inner.idle_tx.send_replace(false);
                        Some(job)
                    }
                    None => {
                        inner.idle_tx.send_replace(true);
                        None
                    }
                }
            };

            match job {
                Some(job) => {
                    let result = match AssertUnwindSafe(job).catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => Err(anyhow::anyhow!(
                            "job panicked: {}",
                            panic_message(panic.as_ref())
                        )),
                    };
                    if let Err(e) = result {
                        log::error!("queued job failed, dropping backlog: {:#}", e);
                        let mut state = inner.state.lock().unwrap();
                        state.jobs.clear();
                        if state.error.is_none() {
                            state.error = Some(Arc::new(e));
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = inner.wake.notified() => {}
                    }
                }
            }
        }
    }

    /// Appends a job to the tail of the queue.
    pub fn push<F>(&self, job: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.state.lock().unwrap().jobs.push_back(Box::pin(job));
        self.inner.wake.notify_one();
    }

    /// Resolves once every job enqueued before this call (including ones
    /// pushed while the queue was draining) has completed, then reports the
    /// first job error recorded so far, if any.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.wait_idle().await;
        let error = self.inner.state.lock().unwrap().error.clone();
        match error {
            Some(e) => Err(anyhow::anyhow!("{:#}", e)),
            None => Ok(()),
        }
    }

    /// Drops every job that has not started yet, then waits for the
    /// currently-executing job (if any) to finish. In-flight work is never
    /// interrupted: tearing a job down mid-flight could leave the codec's
    /// device state inconsistent.
    pub async fn clear(&self) {
        self.inner.state.lock().unwrap().jobs.clear();
        self.wait_idle().await;
    }

    /// Waits until the driver has nothing running and nothing queued.
    async fn wait_idle(&self) {
        let mut rx = self.inner.idle_tx.subscribe();
        loop {
            let idle = *rx.borrow_and_update();
            if idle && self.inner.state.lock().unwrap().jobs.is_empty() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stops the driver task. Queued jobs that have not started will never
    /// run.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
