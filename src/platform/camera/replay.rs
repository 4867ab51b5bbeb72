// Replays a directory of still images (PNG/JPEG) as a camera stream

use super::CameraSource;
use crate::models::capture::{
    CameraRequest, CaptureError, CaptureResult, PixelFormat, StreamInfo, VideoFrame,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ReplayCamera {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl ReplayCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            looping: false,
            files: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    /// Restart from the first image when the directory is exhausted
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn list_images(dir: &Path) -> CaptureResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("{}: {}", dir.display(), e))
            }
            _ => CaptureError::DeviceUnavailable(format!("{}: {}", dir.display(), e)),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl CameraSource for ReplayCamera {
    async fn open(&mut self, request: &CameraRequest) -> CaptureResult<StreamInfo> {
        if request.audio {
            debug!("Replay camera has no audio track; ignoring audio request");
        }

        let files = Self::list_images(&self.dir)?;
        let first = files.first().ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("No frames in {}", self.dir.display()))
        })?;

        let (width, height) = image::image_dimensions(first)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", first.display(), e)))?;

        info!(
            "Opened replay camera {} ({} frames, {}x{})",
            self.dir.display(),
            files.len(),
            width,
            height
        );

        self.files = files;
        self.cursor = 0;
        self.open = true;

        Ok(StreamInfo {
            device_name: format!("replay:{}", self.dir.display()),
            width,
            height,
        })
    }

    async fn read_frame(&mut self) -> CaptureResult<Option<VideoFrame>> {
        if !self.open {
            return Err(CaptureError::NotCapturing);
        }

        if self.cursor >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = self.files[self.cursor].clone();
        self.cursor += 1;

        let decoded = tokio::task::spawn_blocking(move || image::open(&path).map(|img| img.to_rgb8()))
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("Decoder task failed: {}", e)))?
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let (width, height) = decoded.dimensions();
        Ok(Some(VideoFrame {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            width,
            height,
            data: decoded.into_raw(),
            format: PixelFormat::RGB8,
        }))
    }

    fn close(&mut self) {
        if self.open {
            debug!("Closed replay camera {}", self.dir.display());
        }
        self.open = false;
        self.files.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
