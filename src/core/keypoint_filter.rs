// Confidence/allow-list filtering and normalization of estimator output

use crate::models::pose::{LandmarkSelection, PoseFrame, PosePoint, RawPose};

#[derive(Debug, Clone)]
pub struct KeypointFilter {
    min_confidence: f32,
    selection: LandmarkSelection,
}

impl Default for KeypointFilter {
    fn default() -> Self {
        Self::new(0.2, LandmarkSelection::All)
    }
}

impl KeypointFilter {
    pub fn new(min_confidence: f32, selection: LandmarkSelection) -> Self {
        Self {
            min_confidence,
            selection,
        }
    }

    /// Keep visible, allowed keypoints and normalize them against the source
    /// frame's native resolution. A zero dimension is treated as 1.
    pub fn apply(&self, pose: &RawPose, width: u32, height: u32) -> PoseFrame {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;

        let points = pose
            .keypoints
            .iter()
            .filter_map(|kp| {
                let score = kp.score.unwrap_or(0.0);
                if !(score > self.min_confidence) || !self.selection.allows(&kp.name) {
                    return None;
                }
                Some(PosePoint {
                    x: normalize(kp.x, w),
                    y: normalize(kp.y, h),
                    score: score.min(1.0),
                    name: kp.name.clone(),
                })
            })
            .collect();

        PoseFrame::new(points)
    }
}

fn normalize(value: f32, extent: f32) -> f32 {
    let v = value / extent;
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
