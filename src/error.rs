use thiserror::Error;

/// Failure modes of the recognition core.
///
/// Only `DeviceUnavailable` is meant to reach the top level. Everything else is
/// contained by the loops: a missing frame skips the cycle, a failed slot skips
/// that slot.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("capture device {0} unavailable")]
    DeviceUnavailable(i32),

    #[error("no frame available yet")]
    FrameUnavailable,

    #[error("no contours found in icon image")]
    NoContoursFound,

    #[error("frame window is empty")]
    EmptyWindow,

    #[error("image is empty or too small")]
    EmptyImage,

    #[error("frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch {
        expected: (i32, i32),
        actual: (i32, i32),
    },

    #[error("unknown reference key: {0}")]
    UnknownReference(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VisionError>;
