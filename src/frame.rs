//! Captured frames and camera identities.
//!
//! - `CameraSpec`: a named camera bound to a device index (`name=index`).
//! - `Frame`: one packed pixel buffer produced by a camera for a single tick.

use std::collections::HashSet;
use std::fmt;

use crate::error::{RecorderError, Result};

/// Name used when no camera is configured explicitly.
pub const DEFAULT_CAMERA_NAME: &str = "front";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSpec {
    pub name: String,
    pub index: u32,
}

impl CameraSpec {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Parse a `name=index` camera definition.
    pub fn parse(spec: &str) -> Result<Self> {
        let Some((name, index)) = spec.split_once('=') else {
            return Err(RecorderError::Config(format!(
                "camera spec must be name=index, got '{spec}'"
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(RecorderError::Config(format!(
                "camera spec '{spec}' has an empty name"
            )));
        }
        let index: u32 = index.trim().parse().map_err(|_| {
            RecorderError::Config(format!(
                "camera spec '{spec}' has a non-integer index"
            ))
        })?;
        Ok(Self::new(name, index))
    }
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self::new(DEFAULT_CAMERA_NAME, 0)
    }
}

impl fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.index)
    }
}

/// Parse a list of camera definitions, preserving order.
///
/// An empty input yields the default `front=0` camera. Duplicate names are rejected.
pub fn parse_camera_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<CameraSpec>> {
    if specs.is_empty() {
        return Ok(vec![CameraSpec::default()]);
    }
    let parsed = specs
        .iter()
        .map(|spec| CameraSpec::parse(spec.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    ensure_unique_names(&parsed)?;
    Ok(parsed)
}

pub(crate) fn ensure_unique_names(specs: &[CameraSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(RecorderError::Config(
            "at least one camera must be configured".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(RecorderError::Config(format!(
                "camera name '{}' is configured more than once",
                spec.name
            )));
        }
    }
    Ok(())
}

/// One captured image. Pixels are tightly packed rows of `width * channels` bytes.
#[derive(Clone, Debug)]
pub struct Frame {
    pub camera: String,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(
        camera: impl Into<String>,
        width: u32,
        height: u32,
        channels: u8,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(RecorderError::FrameMismatch {
                expected: format!("{width}x{height}x{channels} ({expected} bytes)"),
                got: format!("{} bytes", pixels.len()),
            });
        }
        Ok(Self {
            camera: camera.into(),
            width,
            height,
            channels,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// `(width, height, channels)`
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }
}
