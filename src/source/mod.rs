//! Frame sources.
//!
//! The engine never talks to a camera directly: captures come through
//! [`FrameSource`]. Whoever owns the device implements the trait and is
//! responsible for handing it over between contexts.

use crate::image::io::load_rgb_image;
use crate::image::OwnedImage;
use crate::util::{WinSsimError, WinSsimResult};
use std::path::PathBuf;

/// Synchronous single-frame capture.
pub trait FrameSource {
    /// Captures one frame. Fails with [`WinSsimError::DeviceUnavailable`]
    /// when the device cannot deliver.
    fn capture_frame(&mut self) -> WinSsimResult<OwnedImage>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> WinSsimResult<OwnedImage>,
{
    fn capture_frame(&mut self) -> WinSsimResult<OwnedImage> {
        self()
    }
}

/// Reads the latest snapshot an external capture tool wrote to disk.
#[derive(Clone, Debug)]
pub struct ImageFileFrameSource {
    path: PathBuf,
}

impl ImageFileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for ImageFileFrameSource {
    fn capture_frame(&mut self) -> WinSsimResult<OwnedImage> {
        load_rgb_image(&self.path).map_err(|err| WinSsimError::DeviceUnavailable {
            reason: format!("{}: {err}", self.path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameSource, ImageFileFrameSource};
    use crate::util::WinSsimError;

    #[test]
    fn missing_snapshot_reports_device_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageFileFrameSource::new(dir.path().join("frame.png"));
        assert!(matches!(
            source.capture_frame(),
            Err(WinSsimError::DeviceUnavailable { .. })
        ));
    }
}
