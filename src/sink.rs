use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

/// External ordered (and optionally seekable) byte sink the output device
/// forwards into. Writes land at the sink's current position; `seek` is only
/// called when `seekable` returns true.
pub trait OutputSink: Send + 'static {
    fn seekable(&self) -> bool;
    fn write(&mut self, data: Bytes) -> anyhow::Result<()>;
    fn seek(&mut self, position: u64) -> anyhow::Result<u64>;
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Seekable sink over a plain file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("create output file {:?}: {}", path.as_ref(), e)
        })?;
        Ok(Self { file })
    }
}

impl OutputSink for FileSink {
    fn seekable(&self) -> bool {
        true
    }

    fn write(&mut self, data: Bytes) -> anyhow::Result<()> {
        self.file.write_all(&data)?;
        Ok(())
    }

    fn seek(&mut self, position: u64) -> anyhow::Result<u64> {
        Ok(self.file.seek(SeekFrom::Start(position))?)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory sink with configurable seekability. Hands out a shared handle
/// so the produced bytes (and the close count) can be inspected after the
/// sink itself has been moved into a processor.
pub struct BufferSink {
    seekable: bool,
    shared: BufferHandle,
}

#[derive(Clone)]
pub struct BufferHandle {
    inner: Arc<Mutex<BufferState>>,
}

#[derive(Default)]
pub struct BufferState {
    pub data: Vec<u8>,
    pub position: u64,
    pub closes: u32,
}

impl BufferSink {
    pub fn new(seekable: bool) -> Self {
        Self {
            seekable,
            shared: BufferHandle {
                inner: Arc::new(Mutex::new(BufferState::default())),
            },
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.shared.clone()
    }
}

impl BufferHandle {
    pub fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.inner.lock().unwrap()
    }
}

impl OutputSink for BufferSink {
    fn seekable(&self) -> bool {
        self.seekable
    }

    fn write(&mut self, data: Bytes) -> anyhow::Result<()> {
        let mut state = self.shared.lock();
        let position = state.position as usize;
        let end = position + data.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[position..end].copy_from_slice(&data);
        state.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, position: u64) -> anyhow::Result<u64> {
        let mut state = self.shared.lock();
        state.position = position;
        Ok(position)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.shared.lock().closes += 1;
        Ok(())
    }
}
