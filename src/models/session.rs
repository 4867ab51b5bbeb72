// Capture session state, host-facing errors and pipeline events

use crate::models::capture::CaptureError;
use crate::models::pose::PoseError;
use crate::models::scoring::ScoringError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Recording,
    Submitting,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Recording => "recording",
            CaptureState::Submitting => "submitting",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the pipeline itself, independent of recording
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStatus {
    Initializing,
    Ready,
    /// Setup failed; terminal for this instance
    Failed(TrackerError),
    Closed,
}

impl PipelineStatus {
    /// Camera denied or missing
    pub fn is_camera_off(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Failed(TrackerError::Permission(_) | TrackerError::Device(_))
        )
    }
}

// ==============================================================================
// Errors
// ==============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Camera permission denied: {0}")]
    Permission(String),

    #[error("Camera unavailable: {0}")]
    Device(String),

    #[error("Pose model failed to initialize: {0}")]
    ModelInit(String),

    #[error("No frames captured - try moving in front of the camera or increase the capture rate")]
    EmptyCapture,

    #[error("{0}")]
    Submission(String),

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: CaptureState,
    },

    #[error("Pose tracker is not initialized")]
    NotInitialized,

    #[error("Pose tracker has shut down")]
    Closed,
}

impl From<CaptureError> for TrackerError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied(msg) => TrackerError::Permission(msg),
            other => TrackerError::Device(other.to_string()),
        }
    }
}

impl From<PoseError> for TrackerError {
    fn from(err: PoseError) -> Self {
        TrackerError::ModelInit(err.to_string())
    }
}

impl From<ScoringError> for TrackerError {
    fn from(err: ScoringError) -> Self {
        TrackerError::Submission(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;

// ==============================================================================
// Snapshot
// ==============================================================================

/// What the host displays
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: PipelineStatus,
    pub state: CaptureState,
    pub frames_captured: usize,
    pub score: Option<f32>,
    pub error: Option<String>,
    pub started_at: Option<Instant>,
    pub stopped_at: Option<Instant>,
}

impl SessionSnapshot {
    pub fn initial() -> Self {
        Self {
            status: PipelineStatus::Initializing,
            state: CaptureState::Idle,
            frames_captured: 0,
            score: None,
            error: None,
            started_at: None,
            stopped_at: None,
        }
    }

    /// Score as a whole percentage
    pub fn score_percent(&self) -> Option<u32> {
        self.score.map(|s| (s * 100.0).round() as u32)
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.stopped_at.unwrap_or(now);
        Some(end.saturating_duration_since(start))
    }

    /// `mm:ss`, or `00:00` when no recording has started since the last reset
    pub fn elapsed_label(&self, now: Instant) -> String {
        let secs = self.elapsed(now).map(|d| d.as_secs()).unwrap_or(0);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

// ==============================================================================
// Events
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Initialized,
    InitFailed(TrackerError),
    RecordingStarted,
    RecordingStopped { frames: usize },
    SubmissionStarted { frames: usize },
    Scored { score: Option<f32> },
    /// Fired only when the backend returned a usable score
    ExerciseComplete { score: f32 },
    SubmissionFailed { message: String },
    Closed,
}
