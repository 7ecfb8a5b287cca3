//! V4L2 camera.
//!
//! Camera index `N` maps to `/dev/videoN`. The device is asked for packed RGB
//! (`RGB3`) at the configured resolution, then for YUYV, which most UVC
//! webcams offer and which is converted to RGB on read. If the device settles
//! on another resolution the active one is used. Devices offering neither
//! format fail to open.

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraSource, CaptureSettings};
use crate::error::{RecorderError, Result};
use crate::frame::{CameraSpec, Frame};

const STREAM_BUFFERS: u32 = 4;
/// Formats to request, most preferred first.
const PREFERRED_FORMATS: [PixelFormat; 2] = [PixelFormat::Rgb24, PixelFormat::Yuyv];

pub struct V4l2Camera {
    spec: CameraSpec,
    settings: CaptureSettings,
    state: Option<V4l2State>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
    active_stride: usize,
    frames_captured: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(spec: CameraSpec, settings: CaptureSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            spec,
            settings,
            state: None,
            active_format: PixelFormat::Rgb24,
            active_stride: 0,
            frames_captured: 0,
        }
    }

    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.spec.index)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Request each preferred format in turn and return the first the device
    /// accepts.
    fn negotiate_format(
        &self,
        device: &v4l::Device,
        path: &str,
    ) -> Result<(v4l::Format, PixelFormat)> {
        let mut offered = Vec::new();
        for wanted in PREFERRED_FORMATS {
            let mut request = device
                .format()
                .map_err(|err| self.open_error(format!("read format: {err}")))?;
            request.width = self.settings.width;
            request.height = self.settings.height;
            request.fourcc = v4l::FourCC::new(wanted.fourcc());
            let active = match device.set_format(&request) {
                Ok(active) => active,
                Err(err) => {
                    log::debug!("V4l2Camera: {} refused {:?}: {}", path, wanted, err);
                    device
                        .format()
                        .map_err(|err| self.open_error(format!("read format: {err}")))?
                }
            };
            match PixelFormat::from_fourcc(&active.fourcc.repr) {
                Some(pixel_format) => return Ok((active, pixel_format)),
                None => offered.push(active.fourcc.to_string()),
            }
        }
        Err(self.open_error(format!(
            "device delivers {} instead of RGB3 or YUYV",
            offered.join("/")
        )))
    }

    fn open_error(&self, reason: impl std::fmt::Display) -> RecorderError {
        RecorderError::CameraOpen {
            camera: self.spec.name.clone(),
            index: self.spec.index,
            reason: reason.to_string(),
        }
    }
}

impl CameraSource for V4l2Camera {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn open(&mut self) -> Result<()> {
        let path = self.device_path();
        let device = v4l::Device::with_path(&path)
            .map_err(|err| self.open_error(format!("open {path}: {err}")))?;
        let (format, pixel_format) = self.negotiate_format(&device, &path)?;
        if format.width != self.settings.width || format.height != self.settings.height {
            log::warn!(
                "V4l2Camera: {} settled on {}x{} (requested {}x{})",
                path,
                format.width,
                format.height,
                self.settings.width,
                self.settings.height
            );
        }

        if self.settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", path, err);
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|err| self.open_error(format!("create buffer stream: {err}")))?;

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_format = pixel_format;
        self.active_stride = format.stride as usize;
        self.state = Some(state);
        log::info!(
            "V4l2Camera: opened {} at {} ({}x{} {:?}, stride {})",
            self.spec,
            path,
            self.active_width,
            self.active_height,
            self.active_format,
            self.active_stride
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(state) = self.state.as_mut() else {
            return Err(RecorderError::CameraNotOpen(self.spec.name.clone()));
        };
        let (width, height) = (self.active_width, self.active_height);
        let (stride, pixel_format) = (self.active_stride, self.active_format);
        let captured = state.with_stream_mut(|stream| match stream.next() {
            Ok((buf, _meta)) => normalize_to_rgb(buf, width, height, stride, pixel_format)
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        });
        match captured {
            Ok(pixels) => {
                self.frames_captured += 1;
                Frame::new(self.spec.name.clone(), width, height, 3, pixels).map(Some)
            }
            Err(reason) => {
                log::warn!("V4l2Camera: capture on {} failed: {}", self.spec, reason);
                Ok(None)
            }
        }
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Camera: released {} after {} frames",
                self.spec,
                self.frames_captured
            );
        }
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.release();
    }
}
