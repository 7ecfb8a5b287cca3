use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{VideoFormat, VideoSink, VideoSinkFactory};
use crate::error::Result;
use crate::frame::Frame;

/// What a memory sink saw over its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub format: VideoFormat,
    pub frames: u64,
    pub closed: bool,
    pub aborted: bool,
}

/// Sink factory that keeps no pixels, only per-sink bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct MemorySinkFactory {
    records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every sink created so far, in creation order.
    pub fn records(&self) -> Vec<SinkRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl VideoSinkFactory for MemorySinkFactory {
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoSink>> {
        let slot = {
            let mut records = self
                .records
                .lock()
                .map_err(|_| crate::error::RecorderError::VideoSink("sink registry poisoned".into()))?;
            records.push(SinkRecord {
                path: path.to_path_buf(),
                format,
                frames: 0,
                closed: false,
                aborted: false,
            });
            records.len() - 1
        };
        log::debug!("MemorySink: created {}", path.display());
        Ok(Box::new(MemorySink {
            records: Arc::clone(&self.records),
            slot,
            format,
            frames: 0,
        }))
    }
}

struct MemorySink {
    records: Arc<Mutex<Vec<SinkRecord>>>,
    slot: usize,
    format: VideoFormat,
    frames: u64,
}

impl MemorySink {
    fn update(&self, f: impl FnOnce(&mut SinkRecord)) {
        if let Ok(mut records) = self.records.lock() {
            if let Some(record) = records.get_mut(self.slot) {
                f(record);
            }
        }
    }
}

impl VideoSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.format.check(frame)?;
        self.frames += 1;
        let frames = self.frames;
        self.update(|record| record.frames = frames);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn close(self: Box<Self>) -> Result<u64> {
        self.update(|record| record.closed = true);
        Ok(self.frames)
    }

    fn abort(self: Box<Self>) {
        self.update(|record| record.aborted = true);
    }
}
