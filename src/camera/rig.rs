use crate::error::Result;
use crate::frame::Frame;

use super::CameraSource;

/// The ordered set of opened cameras for one run.
///
/// Cameras are read in configuration order on every tick and are released
/// when the rig is released or dropped, whichever comes first.
pub struct CameraRig {
    cameras: Vec<Box<dyn CameraSource>>,
}

impl CameraRig {
    /// Open every source in order. If one fails, the ones already opened are
    /// released before the error is returned.
    pub fn open(mut sources: Vec<Box<dyn CameraSource>>) -> Result<Self> {
        for i in 0..sources.len() {
            if let Err(err) = sources[i].open() {
                log::error!("CameraRig: {}", err);
                for opened in sources.iter_mut().take(i + 1) {
                    opened.release();
                }
                return Err(err);
            }
        }
        Ok(Self { cameras: sources })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.cameras.iter().map(|cam| cam.name().to_string()).collect()
    }

    /// Read one frame from every camera.
    ///
    /// Returns `Ok(None)` as soon as any camera reports a transient failure;
    /// the frames already read in this tick are discarded.
    pub fn read_all(&mut self) -> Result<Option<Vec<Frame>>> {
        let mut frames = Vec::with_capacity(self.cameras.len());
        for camera in &mut self.cameras {
            match camera.read()? {
                Some(frame) => frames.push(frame),
                None => {
                    log::warn!("CameraRig: camera {} failed to deliver a frame", camera.name());
                    return Ok(None);
                }
            }
        }
        Ok(Some(frames))
    }

    pub fn release(&mut self) {
        for camera in &mut self.cameras {
            camera.release();
        }
    }
}

impl Drop for CameraRig {
    fn drop(&mut self) {
        self.release();
    }
}
