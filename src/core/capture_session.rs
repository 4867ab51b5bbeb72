// Capture session: recording lifecycle and the sampled pose sequence

use crate::core::sampler::FrameSampler;
use crate::models::pose::{PoseFrame, PoseSequence};
use crate::models::session::{CaptureState, PipelineStatus, SessionSnapshot, TrackerError, TrackerResult};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A stopped recording ready to be scored. The sequence is a copy; later
/// changes to the session cannot reach it.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub attempt_id: Uuid,
    pub sequence: PoseSequence,
}

#[derive(Debug)]
pub struct CaptureSession {
    state: CaptureState,
    sequence: PoseSequence,
    sampler: FrameSampler,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    attempt_id: Option<Uuid>,
    score: Option<f32>,
    error: Option<String>,
}

impl CaptureSession {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            state: CaptureState::Idle,
            sequence: PoseSequence::new(),
            sampler: FrameSampler::new(sample_interval),
            started_at: None,
            stopped_at: None,
            attempt_id: None,
            score: None,
            error: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn sequence(&self) -> &PoseSequence {
        &self.sequence
    }

    pub fn score(&self) -> Option<f32> {
        self.score
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempt_id(&self) -> Option<Uuid> {
        self.attempt_id
    }

    pub fn start(&mut self, now: Instant) -> TrackerResult<Uuid> {
        if self.state != CaptureState::Idle {
            return Err(TrackerError::InvalidTransition {
                action: "start recording",
                state: self.state,
            });
        }

        let attempt_id = Uuid::new_v4();
        self.sequence = PoseSequence::new();
        self.sampler.reset();
        self.started_at = Some(now);
        self.stopped_at = None;
        self.attempt_id = Some(attempt_id);
        self.score = None;
        self.error = None;
        self.state = CaptureState::Recording;

        Ok(attempt_id)
    }

    /// Record `frame` if recording and the sampling interval has elapsed
    pub fn offer_frame(&mut self, now: Instant, frame: &PoseFrame) -> bool {
        if self.state != CaptureState::Recording || !self.sampler.try_sample(now) {
            return false;
        }

        let offset = self
            .started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.sequence.push(offset, frame.clone());
        true
    }

    /// Leave `Recording`. A capture without a single landmark goes straight
    /// back to `Idle`.
    pub fn stop(&mut self, now: Instant) -> TrackerResult<PendingSubmission> {
        if self.state != CaptureState::Recording {
            return Err(TrackerError::InvalidTransition {
                action: "stop recording",
                state: self.state,
            });
        }

        self.stopped_at = Some(now);

        if self.sequence.frames().iter().all(PoseFrame::is_empty) {
            self.state = CaptureState::Idle;
            self.error = Some(TrackerError::EmptyCapture.to_string());
            self.score = None;
            return Err(TrackerError::EmptyCapture);
        }

        self.state = CaptureState::Submitting;
        let attempt_id = self.attempt_id.unwrap_or_else(Uuid::new_v4);
        self.attempt_id = Some(attempt_id);

        Ok(PendingSubmission {
            attempt_id,
            sequence: self.sequence.clone(),
        })
    }

    /// Apply a scoring result. Returns false when the result belongs to an
    /// attempt this session is no longer waiting on.
    pub fn finish_submission(&mut self, attempt_id: Uuid, outcome: Result<Option<f32>, String>) -> bool {
        if self.state != CaptureState::Submitting || self.attempt_id != Some(attempt_id) {
            return false;
        }

        match outcome {
            Ok(score) => {
                self.score = score;
                self.error = None;
            }
            Err(message) => {
                self.score = None;
                self.error = Some(message);
            }
        }
        self.state = CaptureState::Idle;
        true
    }

    pub fn reset(&mut self) -> TrackerResult<()> {
        if self.state != CaptureState::Idle {
            return Err(TrackerError::InvalidTransition {
                action: "reset",
                state: self.state,
            });
        }

        self.sequence = PoseSequence::new();
        self.sampler.reset();
        self.started_at = None;
        self.stopped_at = None;
        self.attempt_id = None;
        self.score = None;
        self.error = None;
        Ok(())
    }

    /// Record a setup failure so the host can display it
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn snapshot(&self, status: PipelineStatus) -> SessionSnapshot {
        SessionSnapshot {
            status,
            state: self.state,
            frames_captured: self.sequence.len(),
            score: self.score,
            error: self.error.clone(),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
        }
    }
}
