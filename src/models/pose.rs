// Data models for pose capture: landmarks, frames and recorded sequences

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ==============================================================================
// Landmark Vocabulary (MoveNet / COCO, 17 keypoints)
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Landmark {
    pub const COUNT: usize = 17;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Landmark::Nose,
        Landmark::LeftEye,
        Landmark::RightEye,
        Landmark::LeftEar,
        Landmark::RightEar,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    /// Joints tracked by the upper-body preset
    pub const UPPER_BODY: [Landmark; 8] = [
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
    ];

    /// Skeleton edges drawn by overlays
    pub const SKELETON: [(Landmark, Landmark); 12] = [
        (Landmark::LeftShoulder, Landmark::RightShoulder),
        (Landmark::LeftShoulder, Landmark::LeftElbow),
        (Landmark::LeftElbow, Landmark::LeftWrist),
        (Landmark::RightShoulder, Landmark::RightElbow),
        (Landmark::RightElbow, Landmark::RightWrist),
        (Landmark::LeftShoulder, Landmark::LeftHip),
        (Landmark::RightShoulder, Landmark::RightHip),
        (Landmark::LeftHip, Landmark::RightHip),
        (Landmark::LeftHip, Landmark::LeftKnee),
        (Landmark::LeftKnee, Landmark::LeftAnkle),
        (Landmark::RightHip, Landmark::RightKnee),
        (Landmark::RightKnee, Landmark::RightAnkle),
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftEye => "left_eye",
            Landmark::RightEye => "right_eye",
            Landmark::LeftEar => "left_ear",
            Landmark::RightEar => "right_ear",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftElbow => "left_elbow",
            Landmark::RightElbow => "right_elbow",
            Landmark::LeftWrist => "left_wrist",
            Landmark::RightWrist => "right_wrist",
            Landmark::LeftHip => "left_hip",
            Landmark::RightHip => "right_hip",
            Landmark::LeftKnee => "left_knee",
            Landmark::RightKnee => "right_knee",
            Landmark::LeftAnkle => "left_ankle",
            Landmark::RightAnkle => "right_ankle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == name)
    }
}

/// Which landmarks survive filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "preset", content = "names")]
pub enum LandmarkSelection {
    #[default]
    All,
    UpperBody,
    Custom(Vec<String>),
}

impl LandmarkSelection {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            LandmarkSelection::All => true,
            LandmarkSelection::UpperBody => Landmark::UPPER_BODY.iter().any(|l| l.name() == name),
            LandmarkSelection::Custom(names) => names.iter().any(|n| n == name),
        }
    }
}

// ==============================================================================
// Raw Estimator Output
// ==============================================================================

/// A keypoint as produced by the estimator, in source-frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct RawKeypoint {
    pub x: f32,
    pub y: f32,
    pub score: Option<f32>,
    pub name: String,
}

impl RawKeypoint {
    pub fn new(landmark: Landmark, x: f32, y: f32, score: f32) -> Self {
        Self {
            x,
            y,
            score: Some(score),
            name: landmark.name().to_string(),
        }
    }
}

/// Single-subject estimator result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPose {
    pub keypoints: Vec<RawKeypoint>,
}

// ==============================================================================
// Pose Point / Frame / Sequence
// ==============================================================================

/// One landmark in one frame, normalized to the source video resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosePoint {
    pub x: f32,     // 0.0 - 1.0, pixel x / video width
    pub y: f32,     // 0.0 - 1.0, pixel y / video height
    pub score: f32, // confidence 0.0 - 1.0
    pub name: String,
}

impl PosePoint {
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.score > threshold
    }
}

/// Landmarks present at one instant; empty when no body was detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PoseFrame {
    pub points: Vec<PosePoint>,
}

impl PoseFrame {
    pub fn new(points: Vec<PosePoint>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, name: &str) -> Option<&PosePoint> {
        self.points.iter().find(|p| p.name == name)
    }

    /// Skeleton edges whose endpoints are both present and above `min_score`
    pub fn visible_edges(&self, min_score: f32) -> Vec<(&PosePoint, &PosePoint)> {
        Landmark::SKELETON
            .iter()
            .filter_map(|(a, b)| {
                let a = self.get(a.name())?;
                let b = self.get(b.name())?;
                (a.is_visible(min_score) && b.is_visible(min_score)).then_some((a, b))
            })
            .collect()
    }
}

/// Frames sampled during one recording, with their offsets from recording start
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseSequence {
    frames: Vec<PoseFrame>,
    offsets: Vec<Duration>,
}

impl PoseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, offset: Duration, frame: PoseFrame) {
        self.offsets.push(offset);
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[PoseFrame] {
        &self.frames
    }

    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    pub fn into_frames(self) -> Vec<PoseFrame> {
        self.frames
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Pose model not initialized")]
    NotInitialized,

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

pub type PoseResult<T> = Result<T, PoseError>;
