use super::{CameraBackend, CaptureSettings};
use crate::frame::CameraSpec;

/// Outcome of probing one camera index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    pub index: u32,
    pub available: bool,
    pub reason: Option<String>,
}

/// Try to open each index in `0..max_index`, releasing it immediately.
pub fn probe_cameras(
    backend: CameraBackend,
    settings: CaptureSettings,
    max_index: u32,
) -> Vec<ProbeResult> {
    (0..max_index)
        .map(|index| {
            let spec = CameraSpec::new(format!("probe{index}"), index);
            let opened = backend
                .build(&spec, settings)
                .and_then(|mut camera| {
                    let result = camera.open();
                    camera.release();
                    result
                });
            match opened {
                Ok(()) => ProbeResult {
                    index,
                    available: true,
                    reason: None,
                },
                Err(err) => {
                    log::debug!("probe: index {} unavailable: {}", index, err);
                    ProbeResult {
                        index,
                        available: false,
                        reason: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_backend_reports_every_index_available() {
        let results = probe_cameras(CameraBackend::Synthetic, CaptureSettings::default(), 3);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.available));
        assert_eq!(results[2].index, 2);
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn v4l2_without_feature_reports_unavailable() {
        let results = probe_cameras(CameraBackend::V4l2, CaptureSettings::default(), 1);
        assert!(!results[0].available);
        assert!(results[0]
            .reason
            .as_deref()
            .unwrap_or("")
            .contains("--features camera-v4l2"));
    }
}
