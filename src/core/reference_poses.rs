// Precomputed reference pose sequences for overlay rendering and pacing.
// Never part of the scoring request.

use crate::models::pose::PoseFrame;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("Reference pose not found for task {task_id}; tried: {tried}")]
    NotFound { task_id: String, tried: String },

    #[error("Reference pose I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reference pose parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Reference pose download failed: {0}")]
    Download(String),
}

pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Per-frame landmarks extracted from a reference video
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceSequence {
    frames: Vec<PoseFrame>,
}

impl ReferenceSequence {
    pub fn new(frames: Vec<PoseFrame>) -> Self {
        Self { frames }
    }

    pub fn from_json(bytes: &[u8]) -> ReferenceResult<Self> {
        let frames: Vec<PoseFrame> = serde_json::from_slice(bytes)?;
        Ok(Self { frames })
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

    /// Playback length at `fps`; the host can pass this as the reference clip
    pub fn duration(&self, fps: u32) -> Duration {
        let fps = fps.max(1) as u64;
        Duration::from_millis(self.frames.len() as u64 * 1000 / fps)
    }

    /// Frame to overlay `elapsed` into playback; holds the last frame at the end
    pub fn frame_at(&self, elapsed: Duration, fps: u32) -> Option<&PoseFrame> {
        if self.frames.is_empty() {
            return None;
        }
        let index = (elapsed.as_millis() as u64 * fps.max(1) as u64 / 1000) as usize;
        self.frames.get(index.min(self.frames.len() - 1))
    }
}

/// File stem of the video a URL points at, e.g. `DeepLung` for `.../DeepLung.mp4`
pub fn video_stem(video_url: &str) -> Option<String> {
    let path = video_url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Candidate file names, most specific first
pub fn candidate_file_names(task_id: &str, video_url: Option<&str>) -> Vec<String> {
    let mut names = Vec::with_capacity(4);
    if let Some(stem) = video_url.and_then(video_stem) {
        names.push(format!("{}_pose.json", stem));
        names.push(format!("exercise_{}_{}_pose.json", task_id, stem));
    }
    names.push(format!("task_{}_pose.json", task_id));
    names.push(format!("exercise_{}_pose.json", task_id));
    names
}

pub struct ReferencePoseLibrary {
    root: PathBuf,
}

impl ReferencePoseLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, task_id: &str, video_url: Option<&str>) -> Option<PathBuf> {
        candidate_file_names(task_id, video_url)
            .into_iter()
            .map(|name| self.root.join(name))
            .find(|path| path.is_file())
    }

    pub async fn load(&self, task_id: &str, video_url: Option<&str>) -> ReferenceResult<ReferenceSequence> {
        let path = self.resolve(task_id, video_url).ok_or_else(|| ReferenceError::NotFound {
            task_id: task_id.to_string(),
            tried: candidate_file_names(task_id, video_url).join(", "),
        })?;

        debug!("Loading reference pose {}", path.display());
        let bytes = tokio::fs::read(&path).await?;
        let sequence = ReferenceSequence::from_json(&bytes)?;
        info!(
            "Loaded reference pose for task {} ({} frames)",
            task_id,
            sequence.len()
        );
        Ok(sequence)
    }

    /// Download a reference sequence published next to its video
    pub async fn fetch(url: &str) -> ReferenceResult<ReferenceSequence> {
        let response = reqwest::get(url)
            .await
            .map_err(|e| ReferenceError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReferenceError::Download(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ReferenceError::Download(e.to_string()))?;
        ReferenceSequence::from_json(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::PosePoint;

    fn frame(x: f32) -> PoseFrame {
        PoseFrame::new(vec![PosePoint {
            x,
            y: 0.5,
            score: 0.9,
            name: "nose".to_string(),
        }])
    }

    #[test]
    fn test_video_stem() {
        assert_eq!(
            video_stem("https://github.com/a/b/raw/refs/heads/main/DeepLung.mp4").as_deref(),
            Some("DeepLung")
        );
        assert_eq!(video_stem("clip.mp4?dl=1").as_deref(), Some("clip"));
        assert_eq!(video_stem("noext").as_deref(), Some("noext"));
        assert_eq!(video_stem("https://example.com/"), None);
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(
            candidate_file_names("3", Some("https://x/DeepLung.mp4")),
            vec![
                "DeepLung_pose.json",
                "exercise_3_DeepLung_pose.json",
                "task_3_pose.json",
                "exercise_3_pose.json",
            ]
        );
        assert_eq!(
            candidate_file_names("3", None),
            vec!["task_3_pose.json", "exercise_3_pose.json"]
        );
    }

    #[tokio::test]
    async fn test_load_prefers_most_specific_file() {
        let dir = tempfile::tempdir().unwrap();
        let generic = serde_json::to_vec(&vec![frame(0.1)]).unwrap();
        let specific = serde_json::to_vec(&vec![frame(0.2), frame(0.3)]).unwrap();
        std::fs::write(dir.path().join("task_3_pose.json"), generic).unwrap();
        std::fs::write(dir.path().join("DeepLung_pose.json"), specific).unwrap();

        let library = ReferencePoseLibrary::new(dir.path());
        let seq = library.load("3", Some("https://x/DeepLung.mp4")).await.unwrap();
        assert_eq!(seq.len(), 2);

        let seq = library.load("3", None).await.unwrap();
        assert_eq!(seq.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_reference_lists_tried_names() {
        let dir = tempfile::tempdir().unwrap();
        let library = ReferencePoseLibrary::new(dir.path());
        match library.load("9", None).await {
            Err(ReferenceError::NotFound { tried, .. }) => {
                assert!(tried.contains("task_9_pose.json"));
                assert!(tried.contains("exercise_9_pose.json"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_at_and_duration() {
        let seq = ReferenceSequence::new((0..30).map(|i| frame(i as f32 / 30.0)).collect());
        assert_eq!(seq.duration(15), Duration::from_secs(2));

        assert_eq!(seq.frame_at(Duration::ZERO, 15), Some(&seq.frames()[0]));
        assert_eq!(seq.frame_at(Duration::from_millis(1000), 15), Some(&seq.frames()[15]));
        assert_eq!(seq.frame_at(Duration::from_secs(60), 15), Some(&seq.frames()[29]));
        assert_eq!(ReferenceSequence::default().frame_at(Duration::ZERO, 15), None);
    }
}
