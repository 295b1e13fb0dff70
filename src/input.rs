use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::{Buf, Bytes};
use tokio::sync::oneshot;

/// Readiness code delivered to the codec's poll-for-readable hook.
/// The numeric values match the device protocol: 1 = readable, 0 = canceled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Canceled = 0,
    Readable = 1,
}

/// Emulated readable character device fed by asynchronous, chunked input.
///
/// Chunks are delivered to the codec strictly in push order, consumed from
/// the front (whole or partial via `Buf::advance`). The codec side blocks in
/// `wait_readable` until data arrives, input ends, or the device is
/// canceled; at most one waiter may be parked at a time.
pub struct InputDevice {
    state: Mutex<InputState>,
}

struct InputState {
    chunks: VecDeque<Bytes>,
    read_pos: u64,
    ended: bool,
    canceled: bool,
    waiter: Option<oneshot::Sender<Readiness>>,
}

impl InputDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InputState {
                chunks: VecDeque::new(),
                read_pos: 0,
                ended: false,
                canceled: false,
                waiter: None,
            }),
        }
    }

    /// Appends a chunk to the tail of the pending queue and wakes a parked
    /// reader, if any. Pushing after `end_push` is a protocol violation.
    pub fn push(&self, chunk: Bytes) {
        let mut state = self.state.lock().unwrap();
        assert!(!state.ended, "push after input device ended");
        state.chunks.push_back(chunk);
        Self::fire_waiter(&mut state);
    }

    /// Seals the device: no further chunks may be pushed. A parked reader is
    /// woken so the codec can observe EOF.
    pub fn end_push(&self) {
        let mut state = self.state.lock().unwrap();
        state.ended = true;
        Self::fire_waiter(&mut state);
    }

    /// Marks the device canceled. Subsequent readiness checks report
    /// `Canceled` regardless of pending data, signaling the codec to unwind.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.canceled = true;
        Self::fire_waiter(&mut state);
    }

    /// Copies bytes from the front of the pending queue into `buf`.
    ///
    /// `position` must equal the device's read cursor; reads are not
    /// seekable. Returns 0 at EOF (ended with nothing pending). Never
    /// blocks; the codec calls this only after `wait_readable` reported
    /// `Readable`.
    pub fn read(&self, buf: &mut [u8], position: u64) -> usize {
        let mut state = self.state.lock().unwrap();
        assert_eq!(
            position, state.read_pos,
            "input device does not support seeking reads"
        );

        let mut copied = 0;
        while copied < buf.len() {
            let Some(front) = state.chunks.front_mut() else {
                break;
            };
            let n = front.len().min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&front[..n]);
            copied += n;
            if n == front.len() {
                state.chunks.pop_front();
            } else {
                front.advance(n);
            }
        }
        state.read_pos += copied as u64;
        copied
    }

    /// Blocks the calling thread until the device is readable, ended, or
    /// canceled, and returns the readiness code.
    ///
    /// This is the codec-facing half of the readiness protocol: at most one
    /// waiter may be parked (the codec never polls concurrently), and every
    /// registration is answered exactly once, either immediately or on the
    /// next `push`/`end_push`/`cancel`. Must be called from a blocking
    /// context, never from an async task.
    pub fn wait_readable(&self) -> Readiness {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if let Some(readiness) = Self::readiness(&state) {
                return readiness;
            }
            assert!(
                state.waiter.is_none(),
                "input device readiness waiter already registered"
            );
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            rx
        };
        rx.blocking_recv()
            .expect("input device dropped with a parked readiness waiter")
    }

    fn readiness(state: &InputState) -> Option<Readiness> {
        if state.canceled {
            Some(Readiness::Canceled)
        } else if !state.chunks.is_empty() || state.ended {
            Some(Readiness::Readable)
        } else {
            None
        }
    }

    fn fire_waiter(state: &mut InputState) {
        if state.waiter.is_some() {
            let readiness = Self::readiness(state)
                .expect("waiter fired without a state change making the device ready");
            if let Some(waiter) = state.waiter.take() {
                // Receiver dropped means the codec thread is already gone.
                let _ = waiter.send(readiness);
            }
        }
    }
}

impl Default for InputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;
