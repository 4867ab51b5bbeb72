// Wire types for the remote pose scoring endpoint

use crate::models::pose::PoseFrame;
use serde::{Deserialize, Serialize};

/// Body of `POST <backend_url>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub user_pose_sequence: Vec<PoseFrame>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("{0}")]
    Network(String),

    /// Backend answered with a failure; `message` is what the user sees
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

pub type ScoringResult<T> = Result<T, ScoringError>;
