pub mod capture_session;
pub mod config;
pub mod keypoint_filter;
pub mod pose_pipeline;
pub mod reference_poses;
pub mod sampler;
pub mod scoring_client;
pub mod session_store;
