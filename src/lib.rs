pub mod cli;
pub mod core;
pub mod models;
pub mod platform;

pub use crate::core::config::TrackerConfig;
pub use crate::core::pose_pipeline::{ExerciseTask, PosePipeline, PosePipelineHandle};
pub use crate::core::scoring_client::{HttpScoringClient, ScoreSubmitter};
pub use crate::models::session::{
    CaptureState, PipelineEvent, PipelineStatus, SessionSnapshot, TrackerError, TrackerResult,
};
