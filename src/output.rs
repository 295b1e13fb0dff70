use std::io::SeekFrom;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::watch;

use crate::sink::OutputSink;

/// Emulated writable character device forwarding produced bytes to an
/// external sink.
///
/// Tracks the write cursor mirrored from every write/seek, exposes a
/// one-shot closed signal that any number of callers can await, and
/// enforces the seek policy: absolute seeks only, and only when the sink
/// supports random access. Non-seekable sinks must be paired with encoder
/// arguments that never emit a seek (see `args::mp4_args`).
pub struct OutputDevice {
    sink: Mutex<Box<dyn OutputSink>>,
    seekable: bool,
    state: Mutex<OutputState>,
    closed_tx: watch::Sender<bool>,
}

struct OutputState {
    position: u64,
    closed: bool,
    // Force-closed by cancellation: late codec writes are dropped instead
    // of being treated as protocol violations.
    discarding: bool,
    sink_closed: bool,
}

impl OutputDevice {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            seekable: sink.seekable(),
            sink: Mutex::new(sink),
            state: Mutex::new(OutputState {
                position: 0,
                closed: false,
                discarding: false,
                sink_closed: false,
            }),
            closed_tx,
        }
    }

    pub fn seekable(&self) -> bool {
        self.seekable
    }

    /// Forwards `data` to the sink at the current cursor and returns the
    /// number of bytes written (always `data.len()`; the sink buffers
    /// internally).
    ///
    /// If `position` is given it must equal the cursor: this device does not
    /// support combined seek-and-write, callers seek first and write after.
    pub fn write(&self, data: &[u8], position: Option<u64>) -> anyhow::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            // The codec thread is not serialized by the job queue: it may
            // already hold bytes from a read that raced a force-close.
            // Those are dropped; a write past a normal close is still a
            // protocol violation.
            assert!(state.discarding, "write after output device closed");
            return Ok(data.len());
        }
        if let Some(position) = position {
            assert_eq!(
                position, state.position,
                "output device does not support combined seek-and-write"
            );
        }
        self.sink
            .lock()
            .unwrap()
            .write(Bytes::copy_from_slice(data))?;
        state.position += data.len() as u64;
        Ok(data.len())
    }

    /// Moves the cursor. Only `SeekFrom::Start` is supported, and only when
    /// the sink is seekable; anything else is a protocol violation by the
    /// codec configuration.
    pub fn seek(&self, target: SeekFrom) -> anyhow::Result<u64> {
        let SeekFrom::Start(position) = target else {
            panic!("output device only supports absolute seeks, got {target:?}");
        };

        let mut state = self.state.lock().unwrap();
        if state.closed {
            assert!(state.discarding, "seek after output device closed");
            state.position = position;
            return Ok(position);
        }
        assert!(self.seekable, "seek on a non-seekable output sink");
        if position != state.position {
            self.sink.lock().unwrap().seek(position)?;
            state.position = position;
        }
        Ok(position)
    }

    /// Signals the one-shot closed event. Idempotent: a force-close and the
    /// codec's own shutdown may both land here.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        self.closed_tx.send_replace(true);
    }

    /// Close driven by cancellation rather than by the codec closing its
    /// file descriptor. The codec thread may still be mid-write when this
    /// lands, so later writes and seeks are dropped instead of asserting.
    pub fn force_close(&self) {
        self.state.lock().unwrap().discarding = true;
        self.close();
    }

    /// Resolves once `close` has been called; immediately if it already has.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Closes the external sink. At most one close reaches the sink, no
    /// matter how often this is called.
    pub fn close_sink(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.sink_closed {
            return Ok(());
        }
        state.sink_closed = true;
        self.sink.lock().unwrap().close()
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
