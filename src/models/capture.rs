// Data structures for camera capture

use serde::{Deserialize, Serialize};

/// Which camera the pipeline asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Camera acquisition request, issued once per pipeline instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CameraRequest {
    pub facing: FacingMode,
    pub audio: bool,
}

/// Properties of an opened video stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub device_name: String,
    pub width: u32,
    pub height: u32,
}

/// A decoded video frame at the stream's native resolution
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

/// Pixel format of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    RGB8,
    RGBA8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGB8 => 3,
            PixelFormat::RGBA8 => 4,
        }
    }
}

/// Error types for camera operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Camera is not open")]
    NotCapturing,
}

pub type CaptureResult<T> = Result<T, CaptureError>;
