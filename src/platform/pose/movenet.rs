// MoveNet single-pose (lightning) via ONNX Runtime

use super::PoseEstimator;
use crate::models::capture::{PixelFormat, VideoFrame};
use crate::models::pose::{Landmark, PoseError, PoseResult, RawKeypoint, RawPose};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use tracing::info;

const INPUT_SIZE: u32 = 192;

/// Poses whose best keypoint is below this are reported as "no body"
const MIN_POSE_SCORE: f32 = 0.1;

pub struct MoveNetEstimator {
    model_path: PathBuf,
    session: Option<Session>,
}

impl MoveNetEstimator {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            session: None,
        }
    }

    fn to_rgb(frame: &VideoFrame) -> PoseResult<RgbImage> {
        let expected = frame.width as usize * frame.height as usize * frame.format.bytes_per_pixel();
        if frame.data.len() < expected {
            return Err(PoseError::InferenceFailed(format!(
                "Frame buffer too small: {} < {}",
                frame.data.len(),
                expected
            )));
        }

        let rgb: Vec<u8> = match frame.format {
            PixelFormat::RGB8 => frame.data[..expected].to_vec(),
            PixelFormat::RGBA8 => frame.data[..expected]
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };

        RgbImage::from_raw(frame.width, frame.height, rgb)
            .ok_or_else(|| PoseError::InferenceFailed("Invalid frame dimensions".to_string()))
    }

    /// NHWC float tensor with raw 0-255 channel values
    fn preprocess(frame: &VideoFrame) -> PoseResult<Vec<f32>> {
        let rgb = Self::to_rgb(frame)?;
        let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        Ok(resized.into_raw().into_iter().map(f32::from).collect())
    }
}

#[async_trait]
impl PoseEstimator for MoveNetEstimator {
    async fn initialize(&mut self) -> PoseResult<()> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&self.model_path))
            .map_err(|e| {
                PoseError::ModelLoadFailed(format!("{}: {}", self.model_path.display(), e))
            })?;

        info!("Loaded MoveNet model from {}", self.model_path.display());
        self.session = Some(session);
        Ok(())
    }

    async fn estimate(&mut self, frame: &VideoFrame) -> PoseResult<Option<RawPose>> {
        let session = self.session.as_mut().ok_or(PoseError::NotInitialized)?;

        let input = Self::preprocess(frame)?;
        let shape = [1usize, INPUT_SIZE as usize, INPUT_SIZE as usize, 3];
        let tensor = Tensor::from_array((shape, input))
            .map_err(|e| PoseError::InferenceFailed(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| PoseError::InferenceFailed(e.to_string()))?;

        // [1, 1, 17, 3] -> (y, x, score), normalized to the input image
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::InferenceFailed(e.to_string()))?;

        if data.len() < Landmark::COUNT * 3 {
            return Err(PoseError::InferenceFailed(format!(
                "Unexpected output size {}",
                data.len()
            )));
        }

        let width = frame.width as f32;
        let height = frame.height as f32;
        let keypoints: Vec<RawKeypoint> = Landmark::ALL
            .iter()
            .enumerate()
            .map(|(i, landmark)| {
                let y = data[i * 3];
                let x = data[i * 3 + 1];
                let score = data[i * 3 + 2];
                RawKeypoint::new(*landmark, x * width, y * height, score)
            })
            .collect();

        let best = keypoints
            .iter()
            .filter_map(|kp| kp.score)
            .fold(0.0f32, f32::max);
        if best < MIN_POSE_SCORE {
            return Ok(None);
        }

        Ok(Some(RawPose { keypoints }))
    }

    fn dispose(&mut self) {
        if self.session.take().is_some() {
            info!("Disposed MoveNet session");
        }
    }

    fn model_info(&self) -> String {
        format!("MoveNet SinglePose Lightning ({})", self.model_path.display())
    }
}
