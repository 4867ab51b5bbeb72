// Data models for camera capture, pose frames, scoring and capture sessions

pub mod capture;
pub mod pose;
pub mod scoring;
pub mod session;
