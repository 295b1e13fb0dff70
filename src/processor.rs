use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::args::ProcessorArgs;
use crate::codec::{Codec, CodecExit, CodecRequest};
use crate::input::InputDevice;
use crate::output::OutputDevice;
use crate::queue::JobQueue;
use crate::sink::OutputSink;

type CodecTask = Arc<Mutex<Option<JoinHandle<anyhow::Result<CodecExit>>>>>;
type SharedDrain = Shared<BoxFuture<'static, Result<(), Arc<anyhow::Error>>>>;

/// Orchestrates one codec run over the emulated devices.
///
/// Construction wires an input and an output device into a fresh codec
/// invocation and enqueues "boot the codec" as the very first job; the job
/// resolves once the codec reports its filesystem mounted, while the run
/// itself keeps going on the blocking pool. All later interaction with the
/// devices goes through the job queue, so external calls never race the
/// codec's setup.
///
/// Lifecycle: `write` chunks while active, then either `close` (graceful
/// drain: seal input, flush the queue, check the codec's exit, wait for the
/// output device to close, close the sink) or `cancel` (drop queued work,
/// mark the input canceled, force-close the output device, then the same
/// drain tail). The drain runs at most once; overlapping `close`/`cancel`
/// calls all await the same shared future, so the sink is closed exactly
/// once.
pub struct VideoProcessor {
    input: Arc<InputDevice>,
    output: Arc<OutputDevice>,
    jobs: JobQueue,
    codec_task: CodecTask,
    shutdown: Mutex<Option<SharedDrain>>,
}

impl VideoProcessor {
    /// Must be called within a tokio runtime (spawns the queue driver).
    pub fn new(codec: Arc<dyn Codec>, sink: Box<dyn OutputSink>, args: ProcessorArgs) -> Self {
        let input = Arc::new(InputDevice::new());
        let output = Arc::new(OutputDevice::new(sink));
        let jobs = JobQueue::new();
        let codec_task: CodecTask = Arc::new(Mutex::new(None));

        let command = args.command();
        let output_path = args.output_path();
        log::info!("starting codec: {}", command.join(" "));

        let input_clone = Arc::clone(&input);
        let output_clone = Arc::clone(&output);
        let codec_task_clone = Arc::clone(&codec_task);
        jobs.push(async move {
            let (ready_tx, ready_rx) = oneshot::channel();
            let request = CodecRequest {
                args: command,
                input: input_clone,
                output: output_clone,
                output_path,
                ready: ready_tx,
            };
            let handle = tokio::task::spawn_blocking(move || codec.run(request));
            *codec_task_clone.lock().unwrap() = Some(handle);
            // Resolves at "engine booted"; the codec's processing loop keeps
            // running beyond this job.
            ready_rx
                .await
                .map_err(|_| anyhow::anyhow!("codec exited before completing initialization"))?;
            Ok(())
        });

        Self {
            input,
            output,
            jobs,
            codec_task,
            shutdown: Mutex::new(None),
        }
    }

    /// Enqueues a chunk for absorption into the input device. Fire and
    /// forget; backpressure is implicit in the queue's drain order. Failures
    /// surface from `close`/`cancel`.
    pub fn write(&self, chunk: Bytes) {
        let input = Arc::clone(&self.input);
        self.jobs.push(async move {
            input.push(chunk);
            Ok(())
        });
    }

    /// Seals the input and drains to completion: resolves once the codec has
    /// consumed everything, closed its output, and the external sink has
    /// been closed.
    pub async fn close(&self) -> anyhow::Result<()> {
        let drain = self.begin_shutdown(true);
        drain.await.map_err(|e| anyhow::anyhow!("{:#}", e))
    }

    /// Aborts processing: drops queued work, lets the in-flight job finish,
    /// signals the codec to unwind, and tears down to a closed sink.
    pub async fn cancel(&self) -> anyhow::Result<()> {
        let drain = self.begin_shutdown(false);
        drain.await.map_err(|e| anyhow::anyhow!("{:#}", e))
    }

    /// Builds the drain future on first use; later (or concurrent) callers
    /// get the same shared future regardless of graceful/cancel, so teardown
    /// happens at most once.
    fn begin_shutdown(&self, graceful: bool) -> SharedDrain {
        let mut slot = self.shutdown.lock().unwrap();
        if let Some(drain) = slot.as_ref() {
            return drain.clone();
        }

        let input = Arc::clone(&self.input);
        let output = Arc::clone(&self.output);
        let jobs = self.jobs.clone();
        let codec_task = Arc::clone(&self.codec_task);

        let drain = async move {
            if graceful {
                let input = Arc::clone(&input);
                jobs.push(async move {
                    input.end_push();
                    Ok(())
                });
            } else {
                // Two-phase cancel: abandon queued absorb work, let the
                // in-flight job finish, then flip the devices.
                jobs.clear().await;
                let input = Arc::clone(&input);
                let output_compensate = Arc::clone(&output);
                jobs.push(async move {
                    input.cancel();
                    // The codec's forced-exit path is not guaranteed to
                    // reach the device's close callback, and the codec
                    // thread may still be mid-write.
                    output_compensate.force_close();
                    Ok(())
                });
            }

            jobs.flush().await?;

            // Join the codec before awaiting the closed signal so a codec
            // that died without closing its output cannot hang the drain.
            let handle = codec_task.lock().unwrap().take();
            if let Some(handle) = handle {
                let exit = handle
                    .await
                    .map_err(|e| anyhow::anyhow!("codec task failed: {e}"))??;
                if !exit.is_success() {
                    anyhow::bail!("codec exited with status {}", exit.status);
                }
                if exit.aborted {
                    log::debug!("codec forced exit with success status");
                    // A forced exit can skip the device's close callback
                    // even at end-of-input, not only under cancellation.
                    output.close();
                }
            }

            output.wait_closed().await;
            output.close_sink()?;
            Ok(())
        };

        let drain: BoxFuture<'static, Result<(), Arc<anyhow::Error>>> =
            Box::pin(async move { drain.await.map_err(Arc::new) });
        let drain = drain.shared();
        *slot = Some(drain.clone());
        drain
    }
}

impl Drop for VideoProcessor {
    fn drop(&mut self) {
        self.jobs.stop();
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;
