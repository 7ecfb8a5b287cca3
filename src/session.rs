//! Run orchestration.
//!
//! A `Session` owns everything that lives for a whole run: the dataset layout,
//! the sink factory, the clock and the camera rig. Episodes are recorded
//! strictly one after another; each is persisted before the next begins.
//! Teardown order is fixed: an episode's sinks are closed inside the recorder,
//! cameras are released last (also on error and on drop).

use crate::camera::{CameraRig, CameraSource};
use crate::config::RecordConfig;
use crate::dataset::{count_records, DatasetLayout, DatasetWriter, DEFAULT_TASK_INDEX};
use crate::error::{RecorderError, Result};
use crate::pacing::{Clock, SystemClock};
use crate::recorder::{EpisodeOutcome, EpisodeRecorder, StopReason};
use crate::video::{FfmpegSinkFactory, MemorySinkFactory, VideoBackend, VideoSinkFactory};

/// State of the output directory before recording starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepareReport {
    /// Episode records already present in `episodes.jsonl`.
    pub existing_episodes: usize,
    /// Whether `tasks.jsonl` was created by this run.
    pub task_written: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub index: u64,
    pub frames: u64,
    pub dropped_ticks: u64,
    pub stop_reason: StopReason,
}

impl From<&EpisodeOutcome> for EpisodeSummary {
    fn from(outcome: &EpisodeOutcome) -> Self {
        Self {
            index: outcome.index,
            frames: outcome.frame_count(),
            dropped_ticks: outcome.dropped_ticks,
            stop_reason: outcome.stop_reason,
        }
    }
}

pub fn sink_factory_for(config: &RecordConfig) -> Box<dyn VideoSinkFactory> {
    match config.video_backend {
        VideoBackend::Ffmpeg => Box::new(FfmpegSinkFactory::new(
            config.ffmpeg_bin.clone(),
            config.video_codec.clone(),
        )),
        VideoBackend::Memory => Box::new(MemorySinkFactory::new()),
    }
}

pub struct Session {
    config: RecordConfig,
    writer: DatasetWriter,
    sink_factory: Box<dyn VideoSinkFactory>,
    clock: Box<dyn Clock>,
    rig: Option<CameraRig>,
}

impl Session {
    pub fn new(config: RecordConfig) -> Self {
        let writer = DatasetWriter::new(DatasetLayout::new(config.out_dir.clone()));
        let sink_factory = sink_factory_for(&config);
        Self {
            config,
            writer,
            sink_factory,
            clock: Box::new(SystemClock),
            rig: None,
        }
    }

    pub fn with_sink_factory(mut self, factory: Box<dyn VideoSinkFactory>) -> Self {
        self.sink_factory = factory;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }

    pub fn layout(&self) -> &DatasetLayout {
        self.writer.layout()
    }

    /// Create the directory tree, rewrite `info.json` and record the task if
    /// no task log exists yet. Existing episode logs are left untouched.
    pub fn prepare(&self) -> Result<PrepareReport> {
        self.config.validate()?;
        let layout = self.layout();
        layout.create(&self.config.cameras)?;
        layout.write_info(self.config.fps)?;
        let task_written = layout.ensure_task(&self.config.task)?;
        let existing_episodes = count_records(&layout.episodes_path())?;
        if existing_episodes > 0 {
            log::warn!(
                "{} already holds {} episode records; new episodes are numbered from 0 and appended",
                layout.episodes_path().display(),
                existing_episodes
            );
        }
        log::info!(
            "dataset at {} (fps={}, cameras={})",
            layout.root().display(),
            self.config.fps,
            self.config
                .cameras
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(PrepareReport {
            existing_episodes,
            task_written,
        })
    }

    /// Open the configured cameras with the configured backend.
    pub fn open_cameras(&mut self) -> Result<()> {
        let settings = self.config.capture_settings();
        let sources = self
            .config
            .cameras
            .iter()
            .map(|spec| self.config.camera_backend.build(spec, settings))
            .collect::<Result<Vec<_>>>()?;
        self.open_cameras_with(sources)
    }

    /// Open an explicit set of sources, in order.
    pub fn open_cameras_with(&mut self, sources: Vec<Box<dyn CameraSource>>) -> Result<()> {
        self.release();
        self.rig = Some(CameraRig::open(sources)?);
        Ok(())
    }

    /// Record one episode and persist it. Nothing is appended to the logs if
    /// recording fails.
    pub fn record_episode(&mut self, index: u64) -> Result<EpisodeOutcome> {
        let rig = self
            .rig
            .as_mut()
            .ok_or_else(|| RecorderError::CameraNotOpen("<rig>".to_string()))?;
        let plan = self.config.episode_plan(index);
        let outcome = EpisodeRecorder::new(
            plan,
            self.writer.layout(),
            self.sink_factory.as_ref(),
            self.clock.as_ref(),
        )
        .record(rig)?;
        self.writer
            .persist_episode(index, &outcome.rows, &[DEFAULT_TASK_INDEX])?;
        Ok(outcome)
    }

    /// Record every configured episode, then release the cameras whatever the
    /// outcome.
    pub fn run(&mut self) -> Result<Vec<EpisodeSummary>> {
        let result = (0..self.config.episodes)
            .map(|index| {
                self.record_episode(index)
                    .map(|outcome| EpisodeSummary::from(&outcome))
            })
            .collect::<Result<Vec<_>>>();
        self.release();
        result
    }

    pub fn release(&mut self) {
        if let Some(mut rig) = self.rig.take() {
            rig.release();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
