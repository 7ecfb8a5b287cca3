//! record_dataset - multi-camera episodic dataset recorder
//!
//! 1. Resolves configuration (defaults, config file, RECORDER_* env, flags)
//! 2. Prepares the dataset layout and rewrites meta/info.json
//! 3. Opens every configured camera (fatal if any cannot be opened)
//! 4. Records and persists each episode in turn
//! 5. Releases the cameras, also when a step fails

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use episode_recorder::{episode_name, ConfigOverrides, EpisodeSummary, RecordConfig, Session};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Record multi-camera demonstrations into an episodic dataset",
    long_about = "Record multi-camera demonstrations into an episodic dataset.\n\n\
                  The default v4l2 camera backend needs a build with `--features camera-v4l2`; \
                  without it use `--camera-backend synthetic`.\n\n\
                  Every recording flag can also be set through RECORDER_<FLAG> \
                  (e.g. RECORDER_OUT_DIR, RECORDER_MAX_DROPPED_TICKS)."
)]
struct Args {
    /// Dataset root directory.
    #[arg(long, alias = "out_dir")]
    out_dir: Option<PathBuf>,
    /// Number of episodes to record.
    #[arg(long)]
    episodes: Option<u64>,
    /// Duration of each episode in seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Frame count at which an episode ends early.
    #[arg(long, alias = "min_frames")]
    min_frames: Option<u64>,
    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Camera definition NAME=IDX; repeatable (default: front=0).
    #[arg(long = "camera", value_name = "NAME=IDX")]
    cameras: Vec<String>,
    /// Requested frame width.
    #[arg(long)]
    width: Option<u32>,
    /// Requested frame height.
    #[arg(long)]
    height: Option<u32>,
    /// Natural-language task description (task index 0).
    #[arg(long)]
    task: Option<String>,
    /// Camera backend (v4l2|synthetic).
    #[arg(long)]
    camera_backend: Option<String>,
    /// Video backend (ffmpeg|memory).
    #[arg(long)]
    video_backend: Option<String>,
    /// ffmpeg executable used by the ffmpeg video backend.
    #[arg(long)]
    ffmpeg_bin: Option<String>,
    /// Discarded ticks tolerated per episode (default: the episode's frame budget).
    #[arg(long)]
    max_dropped_ticks: Option<u64>,
    /// JSON config file (also RECORDER_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, env = "RECORDER_UI", value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

impl Args {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config,
            out_dir: self.out_dir,
            episodes: self.episodes,
            duration_s: self.duration,
            min_frames: self.min_frames,
            fps: self.fps,
            cameras: self.cameras,
            width: self.width,
            height: self.height,
            task: self.task,
            camera_backend: self.camera_backend,
            video_backend: self.video_backend,
            ffmpeg_bin: self.ffmpeg_bin,
            max_dropped_ticks: self.max_dropped_ticks,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());
    let config = RecordConfig::load(args.into_overrides())?;
    let mut session = Session::new(config);

    let step = ui.step("Prepare dataset");
    let report = session.prepare()?;
    step.done(format!(
        "{} ({} existing episodes)",
        session.layout().root().display(),
        report.existing_episodes
    ));

    let step = ui.step("Open cameras");
    session.open_cameras()?;
    step.done(format!(
        "{} via {}",
        session.config().cameras.len(),
        session.config().camera_backend.as_str()
    ));

    let episodes = session.config().episodes;
    let mut progress = ui.episodes(episodes);
    for index in 0..episodes {
        progress.recording(index);
        let outcome = match session.record_episode(index) {
            Ok(outcome) => outcome,
            Err(err) => {
                session.release();
                return Err(anyhow::Error::new(err)
                    .context(format!("recording {}", episode_name(index))));
            }
        };
        progress.finished(&EpisodeSummary::from(&outcome));
    }
    session.release();
    let total_frames = progress.frames();
    progress.complete();

    println!(
        "recorded {} episodes ({} frames) into {}",
        episodes,
        total_frames,
        session.layout().root().display()
    );
    Ok(())
}
