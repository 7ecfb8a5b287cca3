use clap::ValueEnum;
use episode_recorder::{episode_name, EpisodeSummary, StopReason};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

/// Progress on stderr: spinners and an episode bar on a TTY, plain lines otherwise.
#[derive(Clone, Copy, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = match mode {
            UiMode::Plain => false,
            UiMode::Auto | UiMode::Pretty => is_tty,
        };
        Self { pretty }
    }

    /// A setup step. Call `done` on success; a step dropped unfinished is
    /// reported as failed.
    pub fn step(&self, name: &'static str) -> Step {
        let spinner = self.pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.set_style(styled("{spinner} {msg}", ProgressStyle::default_spinner));
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(format!("{name}…"));
            spinner
        });
        if spinner.is_none() {
            eprintln!("==> {name}");
        }
        Step {
            name,
            started: Instant::now(),
            spinner,
            finished: false,
        }
    }

    pub fn episodes(&self, total: u64) -> EpisodeProgress {
        let bar = self.pretty.then(|| {
            let bar = ProgressBar::new(total);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.set_style(styled(
                "[{bar:30}] {pos}/{len} {msg}",
                ProgressStyle::default_bar,
            ));
            bar
        });
        EpisodeProgress {
            bar,
            total,
            frames: 0,
            started: Instant::now(),
        }
    }
}

fn styled(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| fallback())
}

pub struct Step {
    name: &'static str,
    started: Instant,
    spinner: Option<ProgressBar>,
    finished: bool,
}

impl Step {
    pub fn done(mut self, detail: impl AsRef<str>) {
        self.finished = true;
        let line = format!(
            "✔ {}: {} ({})",
            self.name,
            detail.as_ref(),
            format_duration(self.started.elapsed())
        );
        self.report(line);
    }

    fn report(&self, line: String) {
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        if !self.finished {
            let line = format!(
                "✘ {} failed ({})",
                self.name,
                format_duration(self.started.elapsed())
            );
            self.report(line);
        }
    }
}

/// Tracks the episode loop and prints one summary line per finished episode.
pub struct EpisodeProgress {
    bar: Option<ProgressBar>,
    total: u64,
    frames: u64,
    started: Instant,
}

impl EpisodeProgress {
    pub fn recording(&self, index: u64) {
        match &self.bar {
            Some(bar) => bar.set_message(format!("recording {}", episode_name(index))),
            None => eprintln!("==> Record {} of {}", episode_name(index), self.total),
        }
    }

    pub fn finished(&mut self, summary: &EpisodeSummary) {
        self.frames += summary.frames;
        let line = episode_line(summary);
        match &self.bar {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None => eprintln!("{line}"),
        }
    }

    /// Total frames recorded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn complete(self) {
        let elapsed = format_duration(self.started.elapsed());
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("{} frames in {}", self.frames, elapsed));
        }
    }
}

fn episode_line(summary: &EpisodeSummary) -> String {
    let stop = match summary.stop_reason {
        StopReason::MinFrames => "min frames reached",
        StopReason::MaxFrames => "duration elapsed",
        StopReason::DropBudgetExhausted => "cameras stopped delivering",
    };
    let mut line = format!(
        "✔ {}: {} frames, {}",
        episode_name(summary.index),
        summary.frames,
        stop
    );
    if summary.dropped_ticks > 0 {
        line.push_str(&format!(" ({} ticks dropped)", summary.dropped_ticks));
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
