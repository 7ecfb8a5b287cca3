//! Dataset layout and persistence.
//!
//! ```text
//! <out>/meta/info.json
//! <out>/meta/tasks.jsonl
//! <out>/meta/episodes.jsonl
//! <out>/meta/episodes_stats.jsonl
//! <out>/data/chunk-000/episode_%06d.parquet
//! <out>/videos/chunk-000/observation.images.<camera>/episode_%06d.mp4
//! ```
//!
//! `info.json` is rewritten on every run so the fps can change between runs,
//! while the `.jsonl` logs are only ever appended to. `tasks.jsonl` is written
//! once, when it does not exist yet.

mod jsonl;
mod table;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::CameraSpec;
use crate::video::VIDEO_EXTENSION;

pub use jsonl::{append_record, count_records};
pub use table::{episode_schema, write_episode_table, EpisodeRow, TABLE_EXTENSION};

const CHUNK_DIR: &str = "chunk-000";

/// Task index used for the run's single task description.
pub const DEFAULT_TASK_INDEX: u64 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRecord {
    pub fps: u32,
    pub video: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_index: u64,
    pub task: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode_index: u64,
    pub episode_length: u64,
    pub tasks: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStatsRecord {
    pub episode_index: u64,
    pub stats: EpisodeStats,
}

/// `episode_000042`
pub fn episode_name(index: u64) -> String {
    format!("episode_{index:06}")
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data").join(CHUNK_DIR)
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos").join(CHUNK_DIR)
    }

    pub fn camera_video_dir(&self, camera: &str) -> PathBuf {
        self.videos_dir().join(format!("observation.images.{camera}"))
    }

    pub fn info_path(&self) -> PathBuf {
        self.meta_dir().join("info.json")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.meta_dir().join("tasks.jsonl")
    }

    pub fn episodes_path(&self) -> PathBuf {
        self.meta_dir().join("episodes.jsonl")
    }

    pub fn episodes_stats_path(&self) -> PathBuf {
        self.meta_dir().join("episodes_stats.jsonl")
    }

    pub fn episode_table_path(&self, index: u64) -> PathBuf {
        self.data_dir()
            .join(format!("{}.{}", episode_name(index), TABLE_EXTENSION))
    }

    pub fn episode_video_path(&self, camera: &str, index: u64) -> PathBuf {
        self.camera_video_dir(camera)
            .join(format!("{}.{}", episode_name(index), VIDEO_EXTENSION))
    }

    /// Create the directory tree. Existing directories and files are left alone.
    pub fn create(&self, cameras: &[CameraSpec]) -> Result<()> {
        std::fs::create_dir_all(self.meta_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        for camera in cameras {
            std::fs::create_dir_all(self.camera_video_dir(&camera.name))?;
        }
        Ok(())
    }

    /// Write `info.json`, replacing any previous one.
    pub fn write_info(&self, fps: u32) -> Result<()> {
        let info = InfoRecord { fps, video: true };
        let mut json = serde_json::to_vec_pretty(&info)?;
        json.push(b'\n');
        std::fs::write(self.info_path(), json)?;
        Ok(())
    }

    /// Record the task description unless a task log already exists.
    /// Returns whether a record was written.
    pub fn ensure_task(&self, task: &str) -> Result<bool> {
        let path = self.tasks_path();
        if path.exists() {
            return Ok(false);
        }
        append_record(
            &path,
            &TaskRecord {
                task_index: DEFAULT_TASK_INDEX,
                task: task.to_string(),
            },
        )?;
        Ok(true)
    }
}

/// Persists finished episodes: the frame table first, then one line in each
/// episode log.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    layout: DatasetLayout,
}

impl DatasetWriter {
    pub fn new(layout: DatasetLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn persist_episode(&self, index: u64, rows: &[EpisodeRow], tasks: &[u64]) -> Result<()> {
        let length = rows.len() as u64;
        write_episode_table(rows, &self.layout.episode_table_path(index))?;
        append_record(
            &self.layout.episodes_path(),
            &EpisodeRecord {
                episode_index: index,
                episode_length: length,
                tasks: tasks.to_vec(),
            },
        )?;
        append_record(
            &self.layout.episodes_stats_path(),
            &EpisodeStatsRecord {
                episode_index: index,
                stats: EpisodeStats { length },
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_chunked_layout() {
        let layout = DatasetLayout::new("/data/set");
        assert_eq!(
            layout.episode_table_path(7),
            PathBuf::from("/data/set/data/chunk-000/episode_000007.parquet")
        );
        assert_eq!(
            layout.episode_video_path("wrist", 12),
            PathBuf::from("/data/set/videos/chunk-000/observation.images.wrist/episode_000012.mp4")
        );
        assert_eq!(layout.info_path(), PathBuf::from("/data/set/meta/info.json"));
    }

    #[test]
    fn info_is_overwritten_but_tasks_are_written_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = DatasetLayout::new(dir.path());
        layout.create(&[CameraSpec::default()])?;
        assert!(layout.camera_video_dir("front").is_dir());

        layout.write_info(30)?;
        layout.write_info(15)?;
        let info: InfoRecord = serde_json::from_str(&std::fs::read_to_string(layout.info_path())?)?;
        assert_eq!(info, InfoRecord { fps: 15, video: true });

        assert!(layout.ensure_task("pick up the cube")?);
        assert!(!layout.ensure_task("something else")?);
        let tasks = std::fs::read_to_string(layout.tasks_path())?;
        assert_eq!(tasks, "{\"task_index\":0,\"task\":\"pick up the cube\"}\n");
        Ok(())
    }

    #[test]
    fn persist_episode_appends_both_logs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let layout = DatasetLayout::new(dir.path());
        layout.create(&[])?;
        let writer = DatasetWriter::new(layout.clone());

        let rows = [EpisodeRow { timestamp: 0.0, frame: 0 }];
        writer.persist_episode(0, &rows, &[DEFAULT_TASK_INDEX])?;
        writer.persist_episode(1, &[], &[DEFAULT_TASK_INDEX])?;

        assert!(layout.episode_table_path(1).exists());
        let episodes = std::fs::read_to_string(layout.episodes_path())?;
        let lines: Vec<EpisodeRecord> = episodes
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(lines[0].episode_length, 1);
        assert_eq!(lines[1].episode_length, 0);
        assert_eq!(lines[1].tasks, vec![0]);

        let stats = std::fs::read_to_string(layout.episodes_stats_path())?;
        assert_eq!(
            stats.lines().nth(1),
            Some("{\"episode_index\":1,\"stats\":{\"length\":0}}")
        );
        Ok(())
    }
}
