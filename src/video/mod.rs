//! Per-camera video sinks.
//!
//! A sink is created lazily from the first frame of an episode, so its layout
//! always matches what the camera actually delivers. Frames with a different
//! layout are rejected, never resized. A sink's file only counts as complete
//! after `close` succeeds; `abort` discards it.

mod ffmpeg;
mod memory;

use std::path::Path;
use std::str::FromStr;

use crate::error::{RecorderError, Result};
use crate::frame::Frame;

pub use ffmpeg::FfmpegSinkFactory;
pub use memory::{MemorySinkFactory, SinkRecord};

/// Extension of encoded episode videos.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Immutable layout of one sink.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub fps: u32,
}

impl VideoFormat {
    pub fn of(frame: &Frame, fps: u32) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            channels: frame.channels,
            fps,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Reject frames whose layout differs from this format.
    pub fn check(&self, frame: &Frame) -> Result<()> {
        if frame.shape() != (self.width, self.height, self.channels) {
            return Err(RecorderError::FrameMismatch {
                expected: format!("{}x{}x{}", self.width, self.height, self.channels),
                got: format!("{}x{}x{}", frame.width, frame.height, frame.channels),
            });
        }
        Ok(())
    }
}

pub trait VideoSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    fn frames_written(&self) -> u64;

    /// Flush and finalize the stream. Returns the number of frames written.
    fn close(self: Box<Self>) -> Result<u64>;

    /// Stop without finalizing; any partial output is removed.
    fn abort(self: Box<Self>);
}

pub trait VideoSinkFactory {
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoSink>>;
}

/// Video sink backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoBackend {
    Ffmpeg,
    Memory,
}

impl VideoBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoBackend::Ffmpeg => "ffmpeg",
            VideoBackend::Memory => "memory",
        }
    }
}

impl FromStr for VideoBackend {
    type Err = RecorderError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(VideoBackend::Ffmpeg),
            "memory" | "null" => Ok(VideoBackend::Memory),
            other => Err(RecorderError::Config(format!(
                "unknown video backend '{other}' (expected ffmpeg or memory)"
            ))),
        }
    }
}
