use std::path::Path;

use arrow::array::{Array, Int64Array};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

use episode_recorder::{
    CameraSource, CameraSpec, CaptureSettings, EpisodeRecord, EpisodeStatsRecord, FailurePlan,
    InfoRecord, ManualClock, MemorySinkFactory, RecordConfig, RecorderError, Session, StopReason,
    SyntheticCamera, TaskRecord, VideoBackend, VideoFormat, VideoSink, VideoSinkFactory,
};

fn settings() -> CaptureSettings {
    CaptureSettings {
        width: 8,
        height: 6,
        fps: 30,
    }
}

fn config(out: &Path, cameras: Vec<CameraSpec>) -> RecordConfig {
    RecordConfig {
        out_dir: out.to_path_buf(),
        episodes: 1,
        duration_s: 1.0,
        min_frames: 50,
        fps: 30,
        cameras,
        width: 8,
        height: 6,
        task: "stack the blocks".to_string(),
        video_backend: VideoBackend::Memory,
        ..RecordConfig::default()
    }
}

fn session(config: RecordConfig, sinks: &MemorySinkFactory) -> Session {
    Session::new(config)
        .with_sink_factory(Box::new(sinks.clone()))
        .with_clock(Box::new(ManualClock::new()))
}

fn camera(name: &str, index: u32, failures: FailurePlan) -> Box<dyn CameraSource> {
    Box::new(SyntheticCamera::new(CameraSpec::new(name, index), settings()).with_failures(failures))
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    std::fs::read_to_string(path)
        .expect("read log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("parse line"))
        .collect()
}

fn table_frames(path: &Path) -> Vec<i64> {
    let file = std::fs::File::open(path).expect("open table");
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .expect("parquet reader")
        .build()
        .expect("build reader");
    let mut frames = Vec::new();
    for batch in reader {
        let batch = batch.expect("batch");
        let column = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("frame column");
        frames.extend(column.values().iter().copied());
    }
    frames
}

/// Memory sinks, except that the sink of `camera` fails on its `fail_on`-th write.
struct CrashingSinkFactory {
    inner: MemorySinkFactory,
    camera: &'static str,
    fail_on: u64,
}

struct CrashingSink {
    inner: Box<dyn VideoSink>,
    fail_on: u64,
    writes: u64,
}

impl VideoSinkFactory for CrashingSinkFactory {
    fn create(&self, path: &Path, format: VideoFormat) -> episode_recorder::Result<Box<dyn VideoSink>> {
        let inner = self.inner.create(path, format)?;
        let camera_dir = format!("observation.images.{}", self.camera);
        let is_target = path
            .parent()
            .and_then(|parent| parent.file_name())
            .is_some_and(|name| name == camera_dir.as_str());
        if !is_target {
            return Ok(inner);
        }
        Ok(Box::new(CrashingSink {
            inner,
            fail_on: self.fail_on,
            writes: 0,
        }))
    }
}

impl VideoSink for CrashingSink {
    fn write(&mut self, frame: &episode_recorder::Frame) -> episode_recorder::Result<()> {
        self.writes += 1;
        if self.writes == self.fail_on {
            return Err(RecorderError::VideoSink("encoder crashed".to_string()));
        }
        self.inner.write(frame)
    }

    fn frames_written(&self) -> u64 {
        self.inner.frames_written()
    }

    fn close(self: Box<Self>) -> episode_recorder::Result<u64> {
        self.inner.close()
    }

    fn abort(self: Box<Self>) {
        self.inner.abort()
    }
}

#[test]
fn single_camera_episode_stops_at_max_frames() {
    let dir = TempDir::new().expect("tempdir");
    let sinks = MemorySinkFactory::new();
    let mut session = session(config(dir.path(), vec![CameraSpec::default()]), &sinks);

    let report = session.prepare().expect("prepare");
    assert_eq!(report.existing_episodes, 0);
    assert!(report.task_written);

    session
        .open_cameras_with(vec![camera("front", 0, FailurePlan::Never)])
        .expect("open");
    let outcome = session.record_episode(0).expect("record");
    session.release();

    assert_eq!(outcome.frame_count(), 30);
    assert_eq!(outcome.stop_reason, StopReason::MaxFrames);

    let layout = session.layout();
    let info: InfoRecord =
        serde_json::from_str(&std::fs::read_to_string(layout.info_path()).expect("info"))
            .expect("info json");
    assert_eq!(info, InfoRecord { fps: 30, video: true });

    let tasks: Vec<TaskRecord> = read_jsonl(&layout.tasks_path());
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task, "stack the blocks");

    let episodes: Vec<EpisodeRecord> = read_jsonl(&layout.episodes_path());
    assert_eq!(
        episodes,
        vec![EpisodeRecord {
            episode_index: 0,
            episode_length: 30,
            tasks: vec![0],
        }]
    );
    assert_eq!(table_frames(&layout.episode_table_path(0)), (0..30).collect::<Vec<_>>());

    let records = sinks.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].frames, 30);
    assert!(records[0].closed);
    assert_eq!(records[0].path, layout.episode_video_path("front", 0));
}

#[test]
fn min_frames_ends_episode_early() {
    let dir = TempDir::new().expect("tempdir");
    let sinks = MemorySinkFactory::new();
    let cfg = RecordConfig {
        min_frames: 5,
        ..config(dir.path(), vec![CameraSpec::default()])
    };
    let mut session = session(cfg, &sinks);
    session.prepare().expect("prepare");
    session
        .open_cameras_with(vec![camera("front", 0, FailurePlan::Never)])
        .expect("open");

    let outcome = session.record_episode(0).expect("record");
    assert_eq!(outcome.frame_count(), 5);
    assert_eq!(outcome.stop_reason, StopReason::MinFrames);

    let stats: Vec<EpisodeStatsRecord> = read_jsonl(&session.layout().episodes_stats_path());
    assert_eq!(stats[0].stats.length, 5);
}

#[test]
fn failing_camera_yields_empty_episode() {
    let dir = TempDir::new().expect("tempdir");
    let sinks = MemorySinkFactory::new();
    let mut session = session(config(dir.path(), vec![CameraSpec::default()]), &sinks);
    session.prepare().expect("prepare");
    session
        .open_cameras_with(vec![camera("front", 0, FailurePlan::Always)])
        .expect("open");

    let outcome = session.record_episode(0).expect("record");
    assert_eq!(outcome.frame_count(), 0);
    assert_eq!(outcome.stop_reason, StopReason::DropBudgetExhausted);
    assert!(sinks.records().is_empty());

    let layout = session.layout();
    assert!(table_frames(&layout.episode_table_path(0)).is_empty());
    let episodes: Vec<EpisodeRecord> = read_jsonl(&layout.episodes_path());
    assert_eq!(episodes[0].episode_length, 0);
    let stats: Vec<EpisodeStatsRecord> = read_jsonl(&layout.episodes_stats_path());
    assert_eq!(stats[0].stats.length, 0);
}

#[test]
fn discarded_tick_keeps_cameras_aligned() {
    let dir = TempDir::new().expect("tempdir");
    let sinks = MemorySinkFactory::new();
    let cameras = vec![CameraSpec::new("front", 0), CameraSpec::new("wrist", 1)];
    let cfg = RecordConfig {
        min_frames: 5,
        ..config(dir.path(), cameras)
    };
    let mut session = session(cfg, &sinks);
    session.prepare().expect("prepare");
    session
        .open_cameras_with(vec![
            camera("front", 0, FailurePlan::Never),
            camera("wrist", 1, FailurePlan::on_reads([3])),
        ])
        .expect("open");

    let outcome = session.record_episode(0).expect("record");
    assert_eq!(outcome.frame_count(), 5);
    assert_eq!(outcome.dropped_ticks, 1);
    assert_eq!(
        outcome.video_frames,
        vec![("front".to_string(), 5), ("wrist".to_string(), 5)]
    );
    let frames: Vec<u64> = outcome.rows.iter().map(|row| row.frame).collect();
    assert_eq!(frames, vec![0, 1, 2, 3, 4]);

    let records = sinks.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.frames == 5 && r.closed));
}

#[test]
fn rerun_appends_to_existing_logs() {
    let dir = TempDir::new().expect("tempdir");
    for (run, task) in ["first task", "second task"].into_iter().enumerate() {
        let sinks = MemorySinkFactory::new();
        let cfg = RecordConfig {
            episodes: 2,
            min_frames: 3,
            task: task.to_string(),
            ..config(dir.path(), vec![CameraSpec::default()])
        };
        let mut session = session(cfg, &sinks);
        let report = session.prepare().expect("prepare");
        assert_eq!(report.existing_episodes, run * 2);
        assert_eq!(report.task_written, run == 0);
        session
            .open_cameras_with(vec![camera("front", 0, FailurePlan::Never)])
            .expect("open");
        let summaries = session.run().expect("run");
        assert_eq!(summaries.len(), 2);
    }

    let dir_path = dir.path();
    let episodes: Vec<EpisodeRecord> = read_jsonl(&dir_path.join("meta/episodes.jsonl"));
    let indices: Vec<u64> = episodes.iter().map(|e| e.episode_index).collect();
    assert_eq!(indices, vec![0, 1, 0, 1]);

    let tasks: Vec<TaskRecord> = read_jsonl(&dir_path.join("meta/tasks.jsonl"));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task, "first task");
}

#[test]
fn camera_open_failure_is_fatal_and_writes_no_episode() {
    let dir = TempDir::new().expect("tempdir");
    let sinks = MemorySinkFactory::new();
    let cameras = vec![CameraSpec::new("front", 0), CameraSpec::new("side", 4)];
    let mut session = session(config(dir.path(), cameras), &sinks);
    session.prepare().expect("prepare");

    let missing = SyntheticCamera::new(CameraSpec::new("side", 4), settings()).unavailable();
    let err = session
        .open_cameras_with(vec![camera("front", 0, FailurePlan::Never), Box::new(missing)])
        .expect_err("open must fail");
    assert!(matches!(err, RecorderError::CameraOpen { index: 4, .. }));

    assert!(session.record_episode(0).is_err());
    assert!(!session.layout().episodes_path().exists());
    assert!(sinks.records().is_empty());
}

#[test]
fn sink_failure_aborts_episode_without_metadata() {
    let dir = TempDir::new().expect("tempdir");
    let memory = MemorySinkFactory::new();
    let factory = CrashingSinkFactory {
        inner: memory.clone(),
        camera: "wrist",
        fail_on: 3,
    };
    let cameras = vec![CameraSpec::new("front", 0), CameraSpec::new("wrist", 1)];
    let cfg = RecordConfig {
        episodes: 2,
        ..config(dir.path(), cameras)
    };
    let mut session = Session::new(cfg)
        .with_sink_factory(Box::new(factory))
        .with_clock(Box::new(ManualClock::new()));
    session.prepare().expect("prepare");
    session
        .open_cameras_with(vec![
            camera("front", 0, FailurePlan::Never),
            camera("wrist", 1, FailurePlan::Never),
        ])
        .expect("open");

    let err = session.run().expect_err("sink failure is fatal");
    assert!(matches!(err, RecorderError::VideoSink(_)));

    let records = memory.records();
    let summary: Vec<(u64, bool, bool)> = records
        .iter()
        .map(|r| (r.frames, r.closed, r.aborted))
        .collect();
    assert_eq!(summary, vec![(3, false, true), (2, false, true)]);

    let layout = session.layout();
    assert!(!layout.episodes_path().exists());
    assert!(!layout.episodes_stats_path().exists());
    assert!(!layout.episode_table_path(0).exists());
    assert!(!layout.episode_table_path(1).exists());
}
