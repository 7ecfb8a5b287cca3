//! Camera sources.
//!
//! This module provides the capture side of the recorder:
//! - `CameraSource`: the capability interface (open/read/release) the
//!   recording loop depends on
//! - Synthetic cameras (testing, dry runs)
//! - USB/V4L2 devices (feature: camera-v4l2)
//! - `CameraRig`: the ordered set of opened cameras for one run
//!
//! A transient read failure is `Ok(None)`, never an error. Errors from `read`
//! mean the source is unusable (e.g. it was never opened).

mod normalize;
mod probe;
mod rig;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use std::str::FromStr;

use crate::error::{RecorderError, Result};
use crate::frame::{CameraSpec, Frame};

pub use normalize::{normalize_to_rgb, PixelFormat};
pub use probe::{probe_cameras, ProbeResult};
pub use rig::CameraRig;
pub use synthetic::{FailurePlan, SyntheticCamera};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

pub trait CameraSource {
    /// Camera name, unique within a run.
    fn name(&self) -> &str;

    /// Acquire the device and configure its resolution.
    fn open(&mut self) -> Result<()>;

    /// Fetch the next frame. `Ok(None)` signals a transient failure.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Relinquish the device. Idempotent; safe on a source that never opened.
    fn release(&mut self);
}

/// Requested capture settings shared by every camera in a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Camera backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    Synthetic,
    V4l2,
}

impl CameraBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraBackend::Synthetic => "synthetic",
            CameraBackend::V4l2 => "v4l2",
        }
    }

    /// Build an unopened source for `spec`.
    pub fn build(&self, spec: &CameraSpec, settings: CaptureSettings) -> Result<Box<dyn CameraSource>> {
        match self {
            CameraBackend::Synthetic => Ok(Box::new(SyntheticCamera::new(spec.clone(), settings))),
            CameraBackend::V4l2 => {
                #[cfg(feature = "camera-v4l2")]
                {
                    Ok(Box::new(V4l2Camera::new(spec.clone(), settings)))
                }
                #[cfg(not(feature = "camera-v4l2"))]
                {
                    let _ = settings;
                    Err(RecorderError::CameraOpen {
                        camera: spec.name.clone(),
                        index: spec.index,
                        reason: "v4l2 cameras need a build with `--features camera-v4l2`"
                            .to_string(),
                    })
                }
            }
        }
    }
}

impl FromStr for CameraBackend {
    type Err = RecorderError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "stub" => Ok(CameraBackend::Synthetic),
            "v4l2" => Ok(CameraBackend::V4l2),
            other => Err(RecorderError::Config(format!(
                "unknown camera backend '{other}' (expected v4l2 or synthetic)"
            ))),
        }
    }
}
