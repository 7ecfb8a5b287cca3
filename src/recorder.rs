//! Episode recording loop.
//!
//! One `EpisodeRecorder` drives one episode through
//! `AwaitingFirstFrame -> Recording -> Finalized`:
//!
//! 1. Every tick reads one frame from each camera, in rig order.
//! 2. If any camera fails, the whole tick is discarded and counted as dropped.
//! 3. The first complete tick creates one video sink per camera, sized from
//!    that tick's frames.
//! 4. Each complete tick is written to every sink and appended to the row
//!    buffer as `(timestamp since episode start, frame index)`.
//! 5. The episode ends once `min_frames` rows exist, the `max_frames` budget
//!    is used up, or the drop budget is exhausted.
//! 6. Sinks are closed before the outcome is handed back for persistence.

use crate::camera::CameraRig;
use crate::dataset::{DatasetLayout, EpisodeRow};
use crate::error::{RecorderError, Result};
use crate::frame::Frame;
use crate::pacing::{Clock, TickScheduler};
use crate::video::{VideoFormat, VideoSink, VideoSinkFactory};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    AwaitingFirstFrame,
    Recording,
    Finalized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `min_frames` rows were recorded.
    MinFrames,
    /// `ceil(duration * fps)` rows were recorded.
    MaxFrames,
    /// Too many ticks were discarded because a camera failed to deliver.
    DropBudgetExhausted,
}

/// Per-episode limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpisodePlan {
    pub index: u64,
    pub fps: u32,
    pub max_frames: u64,
    pub min_frames: u64,
    pub max_dropped_ticks: u64,
}

#[derive(Clone, Debug)]
pub struct EpisodeOutcome {
    pub index: u64,
    pub rows: Vec<EpisodeRow>,
    pub dropped_ticks: u64,
    pub stop_reason: StopReason,
    /// Frames finalized per camera, in rig order. Empty if no tick succeeded.
    pub video_frames: Vec<(String, u64)>,
}

impl EpisodeOutcome {
    pub fn frame_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// Open video sinks of one episode, in rig order.
///
/// Sinks still held when this is dropped are aborted, so no writer outlives
/// its episode.
struct EpisodeSinks {
    sinks: Vec<(String, Box<dyn VideoSink>)>,
}

impl EpisodeSinks {
    fn empty() -> Self {
        Self { sinks: Vec::new() }
    }

    fn open(
        factory: &dyn VideoSinkFactory,
        layout: &DatasetLayout,
        episode: u64,
        fps: u32,
        frames: &[Frame],
    ) -> Result<Self> {
        let mut opened = Self::empty();
        for frame in frames {
            let path = layout.episode_video_path(&frame.camera, episode);
            let sink = factory.create(&path, VideoFormat::of(frame, fps))?;
            opened.sinks.push((frame.camera.clone(), sink));
        }
        Ok(opened)
    }

    fn write_all(&mut self, frames: &[Frame]) -> Result<()> {
        if frames.len() != self.sinks.len() {
            return Err(RecorderError::VideoSink(format!(
                "tick delivered {} frames for {} sinks",
                frames.len(),
                self.sinks.len()
            )));
        }
        for ((camera, sink), frame) in self.sinks.iter_mut().zip(frames) {
            if *camera != frame.camera {
                return Err(RecorderError::VideoSink(format!(
                    "frame from {} routed to sink of {}",
                    frame.camera, camera
                )));
            }
            sink.write(frame)?;
        }
        Ok(())
    }

    /// Close every sink. On the first failure the remaining sinks are aborted.
    fn close_all(&mut self) -> Result<Vec<(String, u64)>> {
        let mut closed = Vec::with_capacity(self.sinks.len());
        let mut sinks = std::mem::take(&mut self.sinks).into_iter();
        while let Some((camera, sink)) = sinks.next() {
            match sink.close() {
                Ok(frames) => closed.push((camera, frames)),
                Err(err) => {
                    for (_, rest) in sinks {
                        rest.abort();
                    }
                    return Err(err);
                }
            }
        }
        Ok(closed)
    }

    fn abort_all(&mut self) {
        for (_, sink) in self.sinks.drain(..) {
            sink.abort();
        }
    }
}

impl Drop for EpisodeSinks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

pub struct EpisodeRecorder<'a> {
    plan: EpisodePlan,
    layout: &'a DatasetLayout,
    sink_factory: &'a dyn VideoSinkFactory,
    clock: &'a dyn Clock,
    scheduler: TickScheduler,
    state: RecorderState,
}

impl<'a> EpisodeRecorder<'a> {
    pub fn new(
        plan: EpisodePlan,
        layout: &'a DatasetLayout,
        sink_factory: &'a dyn VideoSinkFactory,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            scheduler: TickScheduler::new(plan.fps),
            plan,
            layout,
            sink_factory,
            clock,
            state: RecorderState::AwaitingFirstFrame,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Run the episode to completion. On error every sink of the episode is
    /// aborted; cameras stay with the caller's rig.
    pub fn record(&mut self, rig: &mut CameraRig) -> Result<EpisodeOutcome> {
        let plan = self.plan;
        let drop_budget = plan.max_dropped_ticks.max(1);
        let mut sinks = EpisodeSinks::empty();
        let mut rows: Vec<EpisodeRow> = Vec::with_capacity(plan.max_frames.min(1 << 16) as usize);
        let mut frame_count = 0u64;
        let mut dropped_ticks = 0u64;

        log::info!(
            "episode {}: recording (max_frames={}, min_frames={}, fps={})",
            plan.index,
            plan.max_frames,
            plan.min_frames,
            plan.fps
        );

        let episode_start = self.clock.now();
        let stop_reason = loop {
            if frame_count >= plan.max_frames {
                break StopReason::MaxFrames;
            }
            let tick_start = self.clock.now();

            let Some(frames) = rig.read_all()? else {
                dropped_ticks += 1;
                if dropped_ticks >= drop_budget {
                    log::warn!(
                        "episode {}: {} ticks dropped, finalizing with {} frames",
                        plan.index,
                        dropped_ticks,
                        frame_count
                    );
                    break StopReason::DropBudgetExhausted;
                }
                self.scheduler.wait(self.clock, tick_start);
                continue;
            };

            if self.state == RecorderState::AwaitingFirstFrame {
                sinks = EpisodeSinks::open(
                    self.sink_factory,
                    self.layout,
                    plan.index,
                    plan.fps,
                    &frames,
                )?;
                self.state = RecorderState::Recording;
            }
            sinks.write_all(&frames)?;

            let timestamp = self
                .clock
                .now()
                .saturating_duration_since(episode_start)
                .as_secs_f64();
            rows.push(EpisodeRow {
                timestamp,
                frame: frame_count,
            });
            frame_count += 1;

            if frame_count >= plan.min_frames {
                break StopReason::MinFrames;
            }
            self.scheduler.wait(self.clock, tick_start);
        };

        self.state = RecorderState::Finalized;
        let video_frames = sinks.close_all()?;
        log::info!(
            "episode {}: finalized with {} frames ({} dropped ticks, {:?})",
            plan.index,
            frame_count,
            dropped_ticks,
            stop_reason
        );

        Ok(EpisodeOutcome {
            index: plan.index,
            rows,
            dropped_ticks,
            stop_reason,
            video_frames,
        })
    }
}
