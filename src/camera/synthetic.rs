//! Synthetic camera.
//!
//! Generates deterministic RGB frames at the requested resolution. A
//! `FailurePlan` injects transient read failures so the recording loop's
//! tick-discard behavior can be exercised without hardware.

use std::collections::BTreeSet;

use super::{CameraSource, CaptureSettings};
use crate::error::{RecorderError, Result};
use crate::frame::{CameraSpec, Frame};

/// Which reads fail. Read numbers are 1-based and count every `read` call.
#[derive(Clone, Debug, Default)]
pub enum FailurePlan {
    #[default]
    Never,
    Always,
    OnReads(BTreeSet<u64>),
}

impl FailurePlan {
    pub fn on_reads(reads: impl IntoIterator<Item = u64>) -> Self {
        FailurePlan::OnReads(reads.into_iter().collect())
    }

    fn fails(&self, read_number: u64) -> bool {
        match self {
            FailurePlan::Never => false,
            FailurePlan::Always => true,
            FailurePlan::OnReads(reads) => reads.contains(&read_number),
        }
    }
}

pub struct SyntheticCamera {
    spec: CameraSpec,
    settings: CaptureSettings,
    failures: FailurePlan,
    fail_open: bool,
    open: bool,
    reads: u64,
    frames_produced: u64,
}

impl SyntheticCamera {
    pub fn new(spec: CameraSpec, settings: CaptureSettings) -> Self {
        Self {
            spec,
            settings,
            failures: FailurePlan::Never,
            fail_open: false,
            open: false,
            reads: 0,
            frames_produced: 0,
        }
    }

    pub fn with_failures(mut self, failures: FailurePlan) -> Self {
        self.failures = failures;
        self
    }

    /// Make `open` fail, simulating an absent device.
    pub fn unavailable(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = self.settings.width as usize * self.settings.height as usize * 3;
        let shift = self.frames_produced as usize + self.spec.index as usize * 17;
        (0..pixel_count).map(|i| ((i + shift) % 256) as u8).collect()
    }
}

impl CameraSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(RecorderError::CameraOpen {
                camera: self.spec.name.clone(),
                index: self.spec.index,
                reason: "synthetic device unavailable".to_string(),
            });
        }
        self.open = true;
        log::info!(
            "SyntheticCamera: opened {} ({}x{})",
            self.spec,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(RecorderError::CameraNotOpen(self.spec.name.clone()));
        }
        self.reads += 1;
        if self.failures.fails(self.reads) {
            return Ok(None);
        }
        let pixels = self.generate_pixels();
        self.frames_produced += 1;
        Frame::new(
            self.spec.name.clone(),
            self.settings.width,
            self.settings.height,
            3,
            pixels,
        )
        .map(Some)
    }

    fn release(&mut self) {
        if self.open {
            log::debug!("SyntheticCamera: released {}", self.spec);
        }
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> CaptureSettings {
        CaptureSettings {
            width: 8,
            height: 4,
            fps: 30,
        }
    }

    #[test]
    fn read_before_open_is_an_error() {
        let mut cam = SyntheticCamera::new(CameraSpec::default(), small());
        assert!(matches!(cam.read(), Err(RecorderError::CameraNotOpen(_))));
    }

    #[test]
    fn produces_frames_at_requested_resolution() -> anyhow::Result<()> {
        let mut cam = SyntheticCamera::new(CameraSpec::default(), small());
        cam.open()?;
        let frame = cam.read()?.expect("frame");
        assert_eq!(frame.shape(), (8, 4, 3));
        assert_eq!(frame.camera, "front");
        Ok(())
    }

    #[test]
    fn failure_plan_selects_reads() -> anyhow::Result<()> {
        let mut cam = SyntheticCamera::new(CameraSpec::default(), small())
            .with_failures(FailurePlan::on_reads([2]));
        cam.open()?;
        assert!(cam.read()?.is_some());
        assert!(cam.read()?.is_none());
        assert!(cam.read()?.is_some());
        assert_eq!(cam.reads(), 3);
        Ok(())
    }

    #[test]
    fn release_is_idempotent_and_safe_before_open() {
        let mut cam = SyntheticCamera::new(CameraSpec::default(), small());
        cam.release();
        cam.open().expect("open");
        cam.release();
        cam.release();
        assert!(!cam.is_open());
    }

    #[test]
    fn unavailable_camera_fails_to_open() {
        let mut cam = SyntheticCamera::new(CameraSpec::new("wrist", 4), small()).unavailable();
        let err = cam.open().unwrap_err();
        assert!(matches!(err, RecorderError::CameraOpen { index: 4, .. }));
    }
}
