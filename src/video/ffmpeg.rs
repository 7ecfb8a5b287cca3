//! FFmpeg-backed video sink.
//!
//! Raw frames are piped into an `ffmpeg` child process which encodes them into
//! an MP4 container. Output goes to `<path>.part` and is renamed to `<path>`
//! only after ffmpeg exits successfully.

use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use super::{VideoFormat, VideoSink, VideoSinkFactory};
use crate::error::{RecorderError, Result};
use crate::frame::Frame;

const DEFAULT_BINARY: &str = "ffmpeg";
/// MPEG-4 Part 2, the `mp4v` fourcc.
const DEFAULT_CODEC: &str = "mpeg4";
/// Bytes of ffmpeg diagnostics kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Clone, Debug)]
pub struct FfmpegSinkFactory {
    binary: String,
    codec: String,
}

impl FfmpegSinkFactory {
    pub fn new(binary: impl Into<String>, codec: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            codec: codec.into(),
        }
    }
}

impl Default for FfmpegSinkFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY, DEFAULT_CODEC)
    }
}

fn input_pixel_format(channels: u8) -> Result<&'static str> {
    match channels {
        1 => Ok("gray"),
        3 => Ok("rgb24"),
        4 => Ok("rgba"),
        other => Err(RecorderError::VideoSink(format!(
            "unsupported channel count {other}"
        ))),
    }
}

/// Read ffmpeg's stderr until it closes so a noisy encoder never stalls on a
/// full pipe. Only the last `STDERR_TAIL_BYTES` are kept.
fn drain_stderr(mut stderr: ChildStderr) -> std::io::Result<JoinHandle<Vec<u8>>> {
    std::thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                match stderr.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                        }
                    }
                }
            }
            tail
        })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl VideoSinkFactory for FfmpegSinkFactory {
    fn create(&self, path: &Path, format: VideoFormat) -> Result<Box<dyn VideoSink>> {
        let pix_fmt = input_pixel_format(format.channels)?;
        let partial = partial_path(path);

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-hide_banner")
            .arg("-loglevel").arg("error")
            .arg("-y")
            .arg("-f").arg("rawvideo")
            .arg("-pix_fmt").arg(pix_fmt)
            .arg("-s").arg(format!("{}x{}", format.width, format.height))
            .arg("-r").arg(format.fps.to_string())
            .arg("-i").arg("pipe:0")
            .arg("-c:v").arg(&self.codec)
            .arg("-pix_fmt").arg("yuv420p")
            .arg("-f").arg("mp4")
            .arg(&partial)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| {
            RecorderError::VideoSink(format!("failed to spawn {}: {}", self.binary, err))
        })?;
        let (Some(stdin), Some(stderr)) = (child.stdin.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RecorderError::VideoSink("ffmpeg pipes unavailable".to_string()));
        };
        let stderr_tail = match drain_stderr(stderr) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecorderError::VideoSink(format!(
                    "failed to start ffmpeg stderr reader: {err}"
                )));
            }
        };

        log::debug!(
            "FfmpegSink: encoding {}x{}x{} @ {} fps into {}",
            format.width,
            format.height,
            format.channels,
            format.fps,
            path.display()
        );

        Ok(Box::new(FfmpegSink {
            format,
            final_path: path.to_path_buf(),
            partial_path: partial,
            child: Some(child),
            stdin: Some(BufWriter::with_capacity(format.frame_bytes().max(8192) * 2, stdin)),
            stderr_tail: Some(stderr_tail),
            frames: 0,
        }))
    }
}

struct FfmpegSink {
    format: VideoFormat,
    final_path: PathBuf,
    partial_path: PathBuf,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_tail: Option<JoinHandle<Vec<u8>>>,
    frames: u64,
}

impl FfmpegSink {
    /// Kill a still-running encoder and reap it.
    fn kill(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr_tail.take() {
            let _ = handle.join();
        }
    }

    fn stderr_text(&mut self) -> String {
        self.stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|tail| String::from_utf8_lossy(&tail).trim().to_string())
            .unwrap_or_default()
    }

    fn discard_partial(&self) {
        if let Err(err) = std::fs::remove_file(&self.partial_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "FfmpegSink: failed to remove {}: {}",
                    self.partial_path.display(),
                    err
                );
            }
        }
    }
}

impl VideoSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.format.check(frame)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::VideoSink("sink already closed".to_string()))?;
        stdin.write_all(frame.pixels()).map_err(|err| {
            RecorderError::VideoSink(format!(
                "write frame {} to {}: {}",
                self.frames,
                self.final_path.display(),
                err
            ))
        })?;
        self.frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn close(mut self: Box<Self>) -> Result<u64> {
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        // stdin is dropped here, closing the pipe; ffmpeg then finalizes the container.
        let Some(mut child) = self.child.take() else {
            return Err(RecorderError::VideoSink("sink already closed".to_string()));
        };
        let status = match (flushed, child.wait()) {
            (Ok(()), Ok(status)) => status,
            (Err(err), _) | (_, Err(err)) => {
                let _ = child.kill();
                let _ = child.wait();
                let stderr = self.stderr_text();
                self.discard_partial();
                return Err(RecorderError::VideoSink(format!(
                    "finalize {}: {} {}",
                    self.final_path.display(),
                    err,
                    stderr
                )));
            }
        };
        let stderr = self.stderr_text();
        if !status.success() {
            self.discard_partial();
            return Err(RecorderError::VideoSink(format!(
                "ffmpeg exited with {} for {}: {}",
                status,
                self.final_path.display(),
                stderr
            )));
        }
        if !stderr.is_empty() {
            log::debug!("FfmpegSink: {}: {}", self.final_path.display(), stderr);
        }
        std::fs::rename(&self.partial_path, &self.final_path)?;
        Ok(self.frames)
    }

    fn abort(mut self: Box<Self>) {
        self.kill();
        self.discard_partial();
        log::warn!("FfmpegSink: aborted {}", self.final_path.display());
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Neither closed nor aborted: the output is incomplete.
        if self.child.is_some() {
            self.kill();
            self.discard_partial();
        }
    }
}
