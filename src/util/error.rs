//! Error types for winssim.

use crate::region::Region;
use thiserror::Error;

/// Result alias for winssim operations.
pub type WinSsimResult<T> = std::result::Result<T, WinSsimError>;

/// Errors that can occur while capturing, comparing and recording.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WinSsimError {
    /// The frame source could not deliver a capture.
    #[error("capture device unavailable: {reason}")]
    DeviceUnavailable { reason: String },
    /// The image crop and the pattern crop describe differently sized areas.
    #[error(
        "crop shapes differ: image {}x{}x{}, pattern {}x{}x{}",
        image.0, image.1, image.2, pattern.0, pattern.1, pattern.2
    )]
    ShapeMismatch {
        /// Image crop as `(width, height, channels)`.
        image: (usize, usize, usize),
        /// Pattern crop as `(width, height, channels)`.
        pattern: (usize, usize, usize),
    },
    /// No pattern image is currently selected or loadable.
    #[error("no pattern image selected")]
    NoPatternSelected,
    /// A countdown is already active.
    #[error("a countdown timer is already running")]
    AlreadyRunning,
    /// Cropping produced a zero-area image.
    #[error("region {region} produces an empty crop")]
    ShapeError { region: Region },
    /// Region coordinates are not ordered (`x1 < x2`, `y1 < y2`).
    #[error("invalid region {region}")]
    InvalidRegion { region: Region },
    /// Region extends past the image it is applied to.
    #[error("region {region} exceeds image bounds {width}x{height}")]
    RegionOutOfBounds {
        region: Region,
        width: usize,
        height: usize,
    },
    /// More region pairs requested than a region set may hold.
    #[error("{requested} region pairs requested, at most {max} allowed")]
    TooManyRegions { requested: usize, max: usize },
    /// A region id outside the current region set.
    #[error("unknown region id {id}")]
    UnknownRegion { id: usize },
    /// Dimensions are zero or overflow.
    #[error("invalid dimensions: width={width}, height={height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride shorter than one row of pixels.
    #[error("invalid stride: row_len={row_len}, stride={stride}")]
    InvalidStride { row_len: usize, stride: usize },
    /// Backing buffer is too small for the described image.
    #[error("buffer too small: needed={needed}, got={got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Channel count is unsupported or differs between inputs.
    #[error("channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    /// Filesystem failure.
    #[error("io error: {reason}")]
    Io { reason: String },
    /// Image decode or encode failure.
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
    /// Configuration could not be read or written.
    #[error("configuration error: {reason}")]
    Config { reason: String },
    /// Write attempted on a run that has already been sealed.
    #[error("run {ordinal} is sealed")]
    Sealed { ordinal: usize },
}

impl WinSsimError {
    /// Returns true for errors the operator fixes by adjusting regions or
    /// selecting a pattern, as opposed to device or storage faults.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::NoPatternSelected
                | Self::ShapeError { .. }
                | Self::InvalidRegion { .. }
                | Self::RegionOutOfBounds { .. }
                | Self::TooManyRegions { .. }
        )
    }
}

impl From<std::io::Error> for WinSsimError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<image::ImageError> for WinSsimError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageIo {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WinSsimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}
