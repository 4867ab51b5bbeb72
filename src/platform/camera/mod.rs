// Camera sources
// Every source provides the same interface; the pipeline owns exactly one

pub mod replay;

pub use replay::ReplayCamera;

use crate::models::capture::{CameraRequest, CaptureResult, StreamInfo, VideoFrame};
use async_trait::async_trait;

/// Video-only camera stream
#[async_trait]
pub trait CameraSource: Send {
    /// Acquire the device. Fails with `PermissionDenied` or `DeviceUnavailable`.
    async fn open(&mut self, request: &CameraRequest) -> CaptureResult<StreamInfo>;

    /// Next frame at native resolution, or `None` when no new frame is ready
    async fn read_frame(&mut self) -> CaptureResult<Option<VideoFrame>>;

    /// Stop all tracks and detach the stream. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}
