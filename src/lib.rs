//! Episode Recorder
//!
//! Records time-synchronized demonstrations from one or more cameras into an
//! episodic dataset for robot-learning pipelines.
//!
//! # Architecture
//!
//! Control flow: cameras → episode tick loop → per-camera video sinks plus an
//! in-memory row buffer → dataset writer (once per episode).
//!
//! - Every tick reads one frame from every camera; a tick with any failed
//!   read is discarded for all cameras, so videos stay aligned.
//! - Video sinks are created from the first complete tick of an episode.
//! - Ticks are paced to the target fps with no catch-up.
//! - An episode ends at `min_frames`, at `ceil(duration * fps)` frames, or
//!   when its drop budget runs out.
//! - Episode logs are append-only; `info.json` is rewritten on every run.
//!
//! # Module Structure
//!
//! - `camera`: Camera sources (synthetic, V4L2), the camera rig, probing
//! - `video`: Video sinks (ffmpeg, in-memory)
//! - `recorder`: The per-episode recording loop
//! - `dataset`: Directory layout, Parquet frame tables, JSONL logs
//! - `pacing`: Tick scheduler and clocks
//! - `config`: Layered run configuration
//! - `session`: Run orchestration

pub mod camera;
pub mod config;
pub mod dataset;
pub mod error;
pub mod frame;
pub mod pacing;
pub mod recorder;
pub mod session;
pub mod video;

pub use camera::{
    probe_cameras, CameraBackend, CameraRig, CameraSource, CaptureSettings, FailurePlan,
    ProbeResult, SyntheticCamera,
};
#[cfg(feature = "camera-v4l2")]
pub use camera::V4l2Camera;
pub use config::{ConfigOverrides, RecordConfig};
pub use dataset::{
    append_record, episode_name, write_episode_table, DatasetLayout, DatasetWriter, EpisodeRecord,
    EpisodeRow, EpisodeStatsRecord, InfoRecord, TaskRecord,
};
pub use error::{RecorderError, Result};
pub use frame::{parse_camera_specs, CameraSpec, Frame};
pub use pacing::{max_frames, Clock, ManualClock, SystemClock, TickScheduler};
pub use recorder::{EpisodeOutcome, EpisodePlan, EpisodeRecorder, RecorderState, StopReason};
pub use session::{EpisodeSummary, PrepareReport, Session};
pub use video::{
    FfmpegSinkFactory, MemorySinkFactory, SinkRecord, VideoBackend, VideoFormat, VideoSink,
    VideoSinkFactory,
};
