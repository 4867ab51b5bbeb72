// Pose estimation backends
// The pipeline talks to a model only through `PoseEstimator`

#[cfg(feature = "ml-onnx")]
pub mod movenet;

#[cfg(feature = "ml-onnx")]
pub use movenet::MoveNetEstimator;

use crate::models::capture::VideoFrame;
use crate::models::pose::{PoseResult, RawPose};
use async_trait::async_trait;

/// Single-subject pose estimator
#[async_trait]
pub trait PoseEstimator: Send {
    /// Prepare the model and its compute backend
    async fn initialize(&mut self) -> PoseResult<()>;

    /// Landmarks in source-frame pixel coordinates, or `None` when no body is found
    async fn estimate(&mut self, frame: &VideoFrame) -> PoseResult<Option<RawPose>>;

    /// Release the model. Safe to call more than once.
    fn dispose(&mut self);

    fn model_info(&self) -> String;
}
