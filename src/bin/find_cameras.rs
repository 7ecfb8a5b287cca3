//! find_cameras - report which camera indices can be opened

use anyhow::Result;
use clap::Parser;

use episode_recorder::{probe_cameras, CameraBackend, CaptureSettings};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe camera indices and report which ones open")]
struct Args {
    /// Probe indices 0..MAX_INDEX.
    #[arg(long, default_value_t = 10)]
    max_index: u32,
    /// Camera backend (v4l2|synthetic); v4l2 needs `--features camera-v4l2`.
    #[arg(long, env = "RECORDER_CAMERA_BACKEND", default_value = "v4l2")]
    camera_backend: String,
    /// Print the reason an index is unavailable.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let backend: CameraBackend = args.camera_backend.parse()?;

    let results = probe_cameras(backend, CaptureSettings::default(), args.max_index);
    for result in &results {
        if result.available {
            println!("camera index {} available", result.index);
        } else if args.verbose {
            println!(
                "camera index {} unavailable ({})",
                result.index,
                result.reason.as_deref().unwrap_or("unknown")
            );
        } else {
            println!("camera index {} unavailable", result.index);
        }
    }
    let available = results.iter().filter(|r| r.available).count();
    log::info!("{} of {} indices available", available, results.len());
    Ok(())
}
