// Device-facing collaborators: camera sources and pose estimators

pub mod camera;
pub mod pose;

pub use camera::CameraSource;
pub use pose::PoseEstimator;
