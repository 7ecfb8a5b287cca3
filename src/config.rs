use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{CameraBackend, CaptureSettings};
use crate::error::{RecorderError, Result};
use crate::frame::{ensure_unique_names, parse_camera_specs, CameraSpec};
use crate::pacing::max_frames;
use crate::recorder::EpisodePlan;
use crate::video::VideoBackend;

const DEFAULT_EPISODES: u64 = 10;
const DEFAULT_DURATION_S: f64 = 10.0;
const DEFAULT_MIN_FRAMES: u64 = 50;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TASK: &str = "Custom task";
const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
const DEFAULT_VIDEO_CODEC: &str = "mpeg4";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RecordConfigFile {
    out_dir: Option<PathBuf>,
    task: Option<String>,
    cameras: Option<Vec<String>>,
    camera_backend: Option<CameraBackend>,
    capture: Option<CaptureConfigFile>,
    episodes: Option<EpisodesConfigFile>,
    video: Option<VideoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EpisodesConfigFile {
    count: Option<u64>,
    duration_s: Option<f64>,
    min_frames: Option<u64>,
    max_dropped_ticks: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    backend: Option<VideoBackend>,
    ffmpeg_bin: Option<String>,
    codec: Option<String>,
}

/// Values given on the command line; they win over the file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub episodes: Option<u64>,
    pub duration_s: Option<f64>,
    pub min_frames: Option<u64>,
    pub fps: Option<u32>,
    pub cameras: Vec<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub task: Option<String>,
    pub camera_backend: Option<String>,
    pub video_backend: Option<String>,
    pub ffmpeg_bin: Option<String>,
    pub max_dropped_ticks: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RecordConfig {
    pub out_dir: PathBuf,
    pub episodes: u64,
    pub duration_s: f64,
    pub min_frames: u64,
    pub fps: u32,
    pub cameras: Vec<CameraSpec>,
    pub width: u32,
    pub height: u32,
    pub task: String,
    pub camera_backend: CameraBackend,
    pub video_backend: VideoBackend,
    pub ffmpeg_bin: String,
    pub video_codec: String,
    /// Discarded ticks tolerated per episode; `None` means `max_frames`.
    pub max_dropped_ticks: Option<u64>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::new(),
            episodes: DEFAULT_EPISODES,
            duration_s: DEFAULT_DURATION_S,
            min_frames: DEFAULT_MIN_FRAMES,
            fps: DEFAULT_FPS,
            cameras: vec![CameraSpec::default()],
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            task: DEFAULT_TASK.to_string(),
            camera_backend: CameraBackend::V4l2,
            video_backend: VideoBackend::Ffmpeg,
            ffmpeg_bin: DEFAULT_FFMPEG_BIN.to_string(),
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            max_dropped_ticks: None,
        }
    }
}

impl RecordConfig {
    /// Defaults, then the JSON config file (`--config` or `RECORDER_CONFIG`),
    /// then `RECORDER_*` environment variables, then command-line overrides.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let config_path = overrides.config_path.clone().or_else(|| {
            std::env::var("RECORDER_CONFIG")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
        });
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RecordConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(out_dir) = file.out_dir {
            cfg.out_dir = out_dir;
        }
        if let Some(task) = file.task {
            cfg.task = task;
        }
        if let Some(cameras) = file.cameras {
            cfg.cameras = cameras
                .iter()
                .map(|spec| CameraSpec::parse(spec))
                .collect::<Result<_>>()?;
        }
        if let Some(backend) = file.camera_backend {
            cfg.camera_backend = backend;
        }
        if let Some(capture) = file.capture {
            cfg.width = capture.width.unwrap_or(cfg.width);
            cfg.height = capture.height.unwrap_or(cfg.height);
            cfg.fps = capture.fps.unwrap_or(cfg.fps);
        }
        if let Some(episodes) = file.episodes {
            cfg.episodes = episodes.count.unwrap_or(cfg.episodes);
            cfg.duration_s = episodes.duration_s.unwrap_or(cfg.duration_s);
            cfg.min_frames = episodes.min_frames.unwrap_or(cfg.min_frames);
            cfg.max_dropped_ticks = episodes.max_dropped_ticks.or(cfg.max_dropped_ticks);
        }
        if let Some(video) = file.video {
            cfg.video_backend = video.backend.unwrap_or(cfg.video_backend);
            cfg.ffmpeg_bin = video.ffmpeg_bin.unwrap_or(cfg.ffmpeg_bin);
            cfg.video_codec = video.codec.unwrap_or(cfg.video_codec);
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(out_dir) = env_value("RECORDER_OUT_DIR") {
            self.out_dir = PathBuf::from(out_dir);
        }
        if let Some(episodes) = env_parsed("RECORDER_EPISODES")? {
            self.episodes = episodes;
        }
        if let Some(duration) = env_parsed("RECORDER_DURATION")? {
            self.duration_s = duration;
        }
        if let Some(min_frames) = env_parsed("RECORDER_MIN_FRAMES")? {
            self.min_frames = min_frames;
        }
        if let Some(fps) = env_parsed("RECORDER_FPS")? {
            self.fps = fps;
        }
        if let Some(width) = env_parsed("RECORDER_WIDTH")? {
            self.width = width;
        }
        if let Some(height) = env_parsed("RECORDER_HEIGHT")? {
            self.height = height;
        }
        if let Some(cameras) = env_value("RECORDER_CAMERAS") {
            let parsed = split_csv(&cameras);
            if !parsed.is_empty() {
                self.cameras = parsed
                    .iter()
                    .map(|spec| CameraSpec::parse(spec))
                    .collect::<Result<_>>()?;
            }
        }
        if let Some(task) = env_value("RECORDER_TASK") {
            self.task = task;
        }
        if let Some(backend) = env_value("RECORDER_CAMERA_BACKEND") {
            self.camera_backend = backend.parse()?;
        }
        if let Some(backend) = env_value("RECORDER_VIDEO_BACKEND") {
            self.video_backend = backend.parse()?;
        }
        if let Some(bin) = env_value("RECORDER_FFMPEG_BIN") {
            self.ffmpeg_bin = bin;
        }
        if let Some(codec) = env_value("RECORDER_VIDEO_CODEC") {
            self.video_codec = codec;
        }
        if let Some(budget) = env_parsed("RECORDER_MAX_DROPPED_TICKS")? {
            self.max_dropped_ticks = Some(budget);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(out_dir) = overrides.out_dir {
            self.out_dir = out_dir;
        }
        self.episodes = overrides.episodes.unwrap_or(self.episodes);
        self.duration_s = overrides.duration_s.unwrap_or(self.duration_s);
        self.min_frames = overrides.min_frames.unwrap_or(self.min_frames);
        self.fps = overrides.fps.unwrap_or(self.fps);
        self.width = overrides.width.unwrap_or(self.width);
        self.height = overrides.height.unwrap_or(self.height);
        if let Some(task) = overrides.task {
            self.task = task;
        }
        if !overrides.cameras.is_empty() {
            self.cameras = parse_camera_specs(&overrides.cameras)?;
        }
        if let Some(backend) = overrides.camera_backend {
            self.camera_backend = backend.parse()?;
        }
        if let Some(backend) = overrides.video_backend {
            self.video_backend = backend.parse()?;
        }
        if let Some(bin) = overrides.ffmpeg_bin {
            self.ffmpeg_bin = bin;
        }
        if overrides.max_dropped_ticks.is_some() {
            self.max_dropped_ticks = overrides.max_dropped_ticks;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.out_dir.as_os_str().is_empty() {
            return Err(config_error("an output directory is required"));
        }
        if self.fps == 0 {
            return Err(config_error("fps must be at least 1"));
        }
        if !self.duration_s.is_finite() || self.duration_s < 0.0 {
            return Err(config_error("duration must be a non-negative number of seconds"));
        }
        if self.min_frames == 0 {
            return Err(config_error("min_frames must be at least 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(config_error("frame width and height must be at least 1"));
        }
        if self.max_dropped_ticks == Some(0) {
            return Err(config_error("max_dropped_ticks must be at least 1"));
        }
        ensure_unique_names(&self.cameras)?;
        Ok(())
    }

    pub fn max_frames(&self) -> u64 {
        max_frames(self.duration_s, self.fps)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    pub fn episode_plan(&self, index: u64) -> EpisodePlan {
        let max_frames = self.max_frames();
        EpisodePlan {
            index,
            fps: self.fps,
            max_frames,
            min_frames: self.min_frames,
            max_dropped_ticks: self.max_dropped_ticks.unwrap_or(max_frames),
        }
    }
}

fn config_error(message: &str) -> RecorderError {
    RecorderError::Config(message.to_string())
}

fn read_config_file(path: &Path) -> Result<RecordConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RecorderError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| RecorderError::Config(format!("invalid config file {}: {}", path.display(), e)))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_value(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RecorderError::Config(format!("{key} has an invalid value '{value}'"))),
        None => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_out_dir() -> RecordConfig {
        RecordConfig {
            out_dir: PathBuf::from("dataset"),
            ..RecordConfig::default()
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = RecordConfig::default();
        assert_eq!(cfg.episodes, 10);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.min_frames, 50);
        assert_eq!(cfg.cameras, vec![CameraSpec::new("front", 0)]);
        assert_eq!((cfg.width, cfg.height), (640, 480));
        assert_eq!(cfg.task, "Custom task");
        assert_eq!(cfg.max_frames(), 300);
    }

    #[test]
    fn validation_requires_out_dir_and_cameras() {
        assert!(RecordConfig::default().validate().is_err());
        assert!(with_out_dir().validate().is_ok());

        let no_cameras = RecordConfig {
            cameras: Vec::new(),
            ..with_out_dir()
        };
        assert!(matches!(no_cameras.validate(), Err(RecorderError::Config(_))));
    }

    #[test]
    fn validation_rejects_zero_fps_and_min_frames() {
        assert!(RecordConfig { fps: 0, ..with_out_dir() }.validate().is_err());
        assert!(RecordConfig { min_frames: 0, ..with_out_dir() }.validate().is_err());
        assert!(RecordConfig { duration_s: -1.0, ..with_out_dir() }.validate().is_err());
    }

    #[test]
    fn file_sections_layer_over_defaults() -> anyhow::Result<()> {
        let file: RecordConfigFile = serde_json::from_str(
            r#"{
                "out_dir": "/tmp/ds",
                "cameras": ["front=0", "wrist=2"],
                "camera_backend": "synthetic",
                "capture": { "fps": 15 },
                "episodes": { "count": 3, "min_frames": 5 },
                "video": { "backend": "memory" }
            }"#,
        )?;
        let cfg = RecordConfig::from_file(file)?;
        assert_eq!(cfg.out_dir, PathBuf::from("/tmp/ds"));
        assert_eq!(cfg.cameras.len(), 2);
        assert_eq!(cfg.camera_backend, CameraBackend::Synthetic);
        assert_eq!(cfg.fps, 15);
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.episodes, 3);
        assert_eq!(cfg.min_frames, 5);
        assert_eq!(cfg.video_backend, VideoBackend::Memory);
        Ok(())
    }

    #[test]
    fn malformed_camera_in_file_is_rejected() {
        let file: RecordConfigFile =
            serde_json::from_str(r#"{ "cameras": ["front"] }"#).expect("json");
        assert!(RecordConfig::from_file(file).is_err());
    }

    #[test]
    fn episode_plan_defaults_drop_budget_to_max_frames() {
        let cfg = RecordConfig {
            duration_s: 1.0,
            ..with_out_dir()
        };
        let plan = cfg.episode_plan(4);
        assert_eq!(plan.index, 4);
        assert_eq!(plan.max_frames, 30);
        assert_eq!(plan.max_dropped_ticks, 30);
    }
}
