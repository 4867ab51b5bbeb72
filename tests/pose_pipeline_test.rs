//! Integration tests for the pose pipeline
//!
//! Scripted camera, estimator and scoring backend drive the full path:
//! frame -> pose -> filter -> sampled capture -> submission -> score

use async_trait::async_trait;
use pose_capture::core::config::TrackerConfig;
use pose_capture::core::scoring_client::ScoreSubmitter;
use pose_capture::models::capture::{
    CameraRequest, CaptureError, CaptureResult, PixelFormat, StreamInfo, VideoFrame,
};
use pose_capture::models::pose::{Landmark, PoseError, PoseResult, RawKeypoint, RawPose};
use pose_capture::models::scoring::{ScoreRequest, ScoringError, ScoringResult};
use pose_capture::models::session::{
    CaptureState, PipelineEvent, PipelineStatus, TrackerError,
};
use pose_capture::platform::{CameraSource, PoseEstimator};
use pose_capture::{ExerciseTask, PosePipeline, PosePipelineHandle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// What the doubles saw
#[derive(Default)]
struct Probe {
    opened: AtomicBool,
    closed: AtomicBool,
    disposed: AtomicBool,
    frames_read: AtomicUsize,
    /// Read by `Subject::Toggled`
    body_present: AtomicBool,
}

struct ScriptedCamera {
    probe: Arc<Probe>,
    open_error: Option<CaptureError>,
}

#[async_trait]
impl CameraSource for ScriptedCamera {
    async fn open(&mut self, _request: &CameraRequest) -> CaptureResult<StreamInfo> {
        self.probe.opened.store(true, Ordering::SeqCst);
        if let Some(err) = self.open_error.take() {
            return Err(err);
        }
        Ok(StreamInfo {
            device_name: "scripted".to_string(),
            width: WIDTH,
            height: HEIGHT,
        })
    }

    async fn read_frame(&mut self) -> CaptureResult<Option<VideoFrame>> {
        let n = self.probe.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(Some(VideoFrame {
            timestamp_ms: n as i64,
            width: WIDTH,
            height: HEIGHT,
            data: Vec::new(),
            format: PixelFormat::RGB8,
        }))
    }

    fn close(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.probe.opened.load(Ordering::SeqCst) && !self.probe.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy)]
enum Subject {
    /// Full body in view
    Body,
    /// Nobody in front of the camera
    Nobody,
    /// Body found but every keypoint below the default threshold
    Faint,
    /// Inference fails on every other frame
    Flaky,
    /// Body in view while `Probe::body_present`, otherwise below threshold
    Toggled,
}

struct ScriptedEstimator {
    probe: Arc<Probe>,
    subject: Subject,
    init_delay: Duration,
    init_error: Option<PoseError>,
    calls: usize,
}

impl ScriptedEstimator {
    fn body(score: f32) -> RawPose {
        RawPose {
            keypoints: Landmark::ALL
                .iter()
                .enumerate()
                .map(|(i, lm)| RawKeypoint::new(*lm, 300.0 + i as f32, 100.0 + 10.0 * i as f32, score))
                .collect(),
        }
    }
}

#[async_trait]
impl PoseEstimator for ScriptedEstimator {
    async fn initialize(&mut self) -> PoseResult<()> {
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        match self.init_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn estimate(&mut self, _frame: &VideoFrame) -> PoseResult<Option<RawPose>> {
        self.calls += 1;
        match self.subject {
            Subject::Body => Ok(Some(Self::body(0.9))),
            Subject::Nobody => Ok(None),
            Subject::Faint => Ok(Some(Self::body(0.1))),
            Subject::Flaky if self.calls % 2 == 0 => {
                Err(PoseError::InferenceFailed("backend hiccup".to_string()))
            }
            Subject::Flaky => Ok(Some(Self::body(0.9))),
            Subject::Toggled if self.probe.body_present.load(Ordering::SeqCst) => {
                Ok(Some(Self::body(0.9)))
            }
            Subject::Toggled => Ok(Some(Self::body(0.1))),
        }
    }

    fn dispose(&mut self) {
        self.probe.disposed.store(true, Ordering::SeqCst);
    }

    fn model_info(&self) -> String {
        "scripted".to_string()
    }
}

struct RecordingSubmitter {
    requests: Mutex<Vec<ScoreRequest>>,
    completed: AtomicUsize,
    delay: Duration,
    result: ScoringResult<Option<f32>>,
}

impl RecordingSubmitter {
    fn new(result: ScoringResult<Option<f32>>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            result,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ScoreRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ScoreSubmitter for RecordingSubmitter {
    async fn submit(&self, request: &ScoreRequest) -> ScoringResult<Option<f32>> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

struct Harness {
    handle: PosePipelineHandle,
    probe: Arc<Probe>,
    submitter: Arc<RecordingSubmitter>,
    events: broadcast::Receiver<PipelineEvent>,
}

struct Setup {
    subject: Subject,
    open_error: Option<CaptureError>,
    init_error: Option<PoseError>,
    init_delay: Duration,
    submitter: RecordingSubmitter,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            subject: Subject::Body,
            open_error: None,
            init_error: None,
            init_delay: Duration::ZERO,
            submitter: RecordingSubmitter::new(Ok(Some(0.82))),
        }
    }
}

fn launch(setup: Setup) -> Harness {
    let probe = Arc::new(Probe::default());
    let submitter = Arc::new(setup.submitter);
    let config = TrackerConfig {
        capture_fps: 10.0,
        frame_tick_ms: 10,
        ..TrackerConfig::default()
    };
    let task = ExerciseTask {
        task_id: "3".to_string(),
        reference_video_url: Some("https://example.com/DeepLung.mp4".to_string()),
        user_id: Some("user-1".to_string()),
    };

    let handle = PosePipeline::launch(
        config,
        task,
        Box::new(ScriptedCamera {
            probe: Arc::clone(&probe),
            open_error: setup.open_error,
        }),
        Box::new(ScriptedEstimator {
            probe: Arc::clone(&probe),
            subject: setup.subject,
            init_delay: setup.init_delay,
            init_error: setup.init_error,
            calls: 0,
        }),
        submitter.clone(),
    );
    let events = handle.subscribe();

    Harness {
        handle,
        probe,
        submitter,
        events,
    }
}

fn drain(events: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn record_for(handle: &PosePipelineHandle, millis: u64) {
    handle.start_recording(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn test_record_submit_and_score() {
    let mut h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 1000).await;
    assert_eq!(h.handle.snapshot().state, CaptureState::Recording);
    h.handle.stop_recording().await.unwrap();
    assert_eq!(h.handle.snapshot().state, CaptureState::Submitting);

    let snapshot = h.handle.wait_for_idle().await.unwrap();
    assert_eq!(snapshot.score, Some(0.82));
    assert_eq!(snapshot.score_percent(), Some(82));
    assert_eq!(snapshot.error, None);
    assert_eq!(h.submitter.calls(), 1);

    // 10 fps over one second
    let request = h.submitter.last_request();
    let frames = request.user_pose_sequence.len();
    assert!((9..=11).contains(&frames), "captured {} frames", frames);
    assert_eq!(snapshot.frames_captured, frames);

    assert_eq!(request.task_id, "3");
    assert_eq!(
        request.reference_video_url.as_deref(),
        Some("https://example.com/DeepLung.mp4")
    );
    assert_eq!(request.user_id.as_deref(), Some("user-1"));
    for frame in &request.user_pose_sequence {
        assert_eq!(frame.len(), Landmark::COUNT);
        assert!(frame
            .points
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)));
    }

    let events = drain(&mut h.events);
    assert!(events.contains(&PipelineEvent::RecordingStarted));
    assert!(events.contains(&PipelineEvent::RecordingStopped { frames }));
    assert!(events.contains(&PipelineEvent::Scored { score: Some(0.82) }));
    assert!(events.contains(&PipelineEvent::ExerciseComplete { score: 0.82 }));

    h.handle.shutdown().await;
    assert!(h.probe.closed.load(Ordering::SeqCst));
    assert!(h.probe.disposed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_nobody_in_frame_is_empty_capture() {
    let h = launch(Setup {
        subject: Subject::Nobody,
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 500).await;
    assert_eq!(h.handle.stop_recording().await, Err(TrackerError::EmptyCapture));

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, CaptureState::Idle);
    assert_eq!(snapshot.error, Some(TrackerError::EmptyCapture.to_string()));
    assert_eq!(h.submitter.calls(), 0);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_low_confidence_everywhere_is_empty_capture() {
    let h = launch(Setup {
        subject: Subject::Faint,
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    let mut live = h.handle.live_frames();
    record_for(&h.handle, 500).await;
    assert!(live.borrow_and_update().is_empty());
    assert_eq!(h.handle.stop_recording().await, Err(TrackerError::EmptyCapture));
    assert_eq!(h.submitter.calls(), 0);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_body_leaving_frame_keeps_timeline() {
    let h = launch(Setup {
        subject: Subject::Toggled,
        ..Setup::default()
    });
    h.probe.body_present.store(true, Ordering::SeqCst);
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.probe.body_present.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.probe.body_present.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.handle.stop_recording().await.unwrap();
    h.handle.wait_for_idle().await.unwrap();

    let frames = h.submitter.last_request().user_pose_sequence;
    assert!((8..=10).contains(&frames.len()), "captured {} frames", frames.len());
    assert!(!frames.first().unwrap().is_empty());
    assert!(!frames.last().unwrap().is_empty());
    assert!(frames.iter().filter(|f| f.is_empty()).count() >= 2);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_backend_rejection_is_shown() {
    let mut h = launch(Setup {
        submitter: RecordingSubmitter::new(Err(ScoringError::Rejected {
            status: 422,
            message: "invalid sequence".to_string(),
        })),
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.handle.stop_recording().await.unwrap();

    let snapshot = h.handle.wait_for_idle().await.unwrap();
    assert_eq!(snapshot.score, None);
    assert_eq!(snapshot.error.as_deref(), Some("invalid sequence"));

    let events = drain(&mut h.events);
    assert!(events.contains(&PipelineEvent::SubmissionFailed {
        message: "invalid sequence".to_string()
    }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ExerciseComplete { .. })));

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_success_without_score_does_not_complete() {
    let mut h = launch(Setup {
        submitter: RecordingSubmitter::new(Ok(None)),
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.handle.stop_recording().await.unwrap();

    let snapshot = h.handle.wait_for_idle().await.unwrap();
    assert_eq!(snapshot.score, None);
    assert_eq!(snapshot.error, None);

    let events = drain(&mut h.events);
    assert!(events.contains(&PipelineEvent::Scored { score: None }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ExerciseComplete { .. })));

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_while_submitting_ignores_late_result() {
    let h = launch(Setup {
        submitter: RecordingSubmitter::new(Ok(Some(0.9))).slow(Duration::from_millis(500)),
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.handle.stop_recording().await.unwrap();
    h.handle.shutdown().await;

    assert!(h.probe.closed.load(Ordering::SeqCst));
    assert!(h.probe.disposed.load(Ordering::SeqCst));

    // Let the in-flight request finish after teardown
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.submitter.completed.load(Ordering::SeqCst), 1);

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.status, PipelineStatus::Closed);
    assert_eq!(snapshot.state, CaptureState::Submitting);
    assert_eq!(snapshot.score, None);
    assert_eq!(h.handle.start_recording(None).await, Err(TrackerError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_transitions_leave_state_alone() {
    let h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();

    assert!(matches!(
        h.handle.stop_recording().await,
        Err(TrackerError::InvalidTransition { .. })
    ));

    record_for(&h.handle, 200).await;
    assert!(matches!(
        h.handle.start_recording(None).await,
        Err(TrackerError::InvalidTransition { .. })
    ));
    assert_eq!(
        h.handle.reset().await,
        Err(TrackerError::InvalidTransition {
            action: "reset",
            state: CaptureState::Recording,
        })
    );
    assert_eq!(h.handle.snapshot().state, CaptureState::Recording);

    h.handle.stop_recording().await.unwrap();
    h.handle.wait_for_idle().await.unwrap();
    assert_eq!(h.submitter.calls(), 1);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent() {
    let h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.handle.stop_recording().await.unwrap();
    let scored = h.handle.wait_for_idle().await.unwrap();
    assert!(scored.score.is_some());

    h.handle.reset().await.unwrap();
    let once = h.handle.snapshot();
    h.handle.reset().await.unwrap();
    let twice = h.handle.snapshot();

    assert_eq!(once, twice);
    assert_eq!(once.state, CaptureState::Idle);
    assert_eq!(once.frames_captured, 0);
    assert_eq!(once.score, None);
    assert_eq!(once.error, None);
    assert_eq!(once.started_at, None);
    assert_eq!(once.elapsed_label(tokio::time::Instant::now()), "00:00");

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_new_recording_clears_previous_attempt() {
    let h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 300).await;
    h.handle.stop_recording().await.unwrap();
    h.handle.wait_for_idle().await.unwrap();

    h.handle.start_recording(None).await.unwrap();
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.state, CaptureState::Recording);
    assert_eq!(snapshot.score, None);
    assert_eq!(snapshot.frames_captured, 0);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reference_clip_end_stops_recording() {
    let h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();

    h.handle
        .start_recording(Some(Duration::from_millis(300)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let snapshot = h.handle.wait_for_idle().await.unwrap();
    assert_eq!(snapshot.score, Some(0.82));
    assert_eq!(h.submitter.calls(), 1);
    let frames = h.submitter.last_request().user_pose_sequence.len();
    assert!((3..=4).contains(&frames), "captured {} frames", frames);

    // Already stopped
    assert!(matches!(
        h.handle.stop_recording().await,
        Err(TrackerError::InvalidTransition { .. })
    ));

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_inference_failures_do_not_stop_capture() {
    let h = launch(Setup {
        subject: Subject::Flaky,
        ..Setup::default()
    });
    h.handle.wait_until_ready().await.unwrap();

    record_for(&h.handle, 1000).await;
    h.handle.stop_recording().await.unwrap();
    h.handle.wait_for_idle().await.unwrap();

    let frames = h.submitter.last_request().user_pose_sequence.len();
    assert!(frames >= 8, "captured {} frames", frames);

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_camera_permission_denied() {
    let mut h = launch(Setup {
        open_error: Some(CaptureError::PermissionDenied("user blocked camera".to_string())),
        ..Setup::default()
    });

    let err = h.handle.wait_until_ready().await.unwrap_err();
    assert_eq!(err, TrackerError::Permission("user blocked camera".to_string()));

    let snapshot = h.handle.snapshot();
    assert!(snapshot.status.is_camera_off());
    assert_eq!(snapshot.error, Some(err.to_string()));
    assert!(h.probe.disposed.load(Ordering::SeqCst));
    assert_eq!(h.probe.frames_read.load(Ordering::SeqCst), 0);

    assert_eq!(h.handle.start_recording(None).await, Err(err.clone()));
    assert!(drain(&mut h.events).contains(&PipelineEvent::InitFailed(err)));

    h.handle.shutdown().await;
    assert_eq!(h.handle.snapshot().status, PipelineStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_model_failure_skips_camera() {
    let h = launch(Setup {
        init_error: Some(PoseError::ModelLoadFailed("no backend".to_string())),
        ..Setup::default()
    });

    let err = h.handle.wait_until_ready().await.unwrap_err();
    assert!(matches!(err, TrackerError::ModelInit(_)));
    assert!(!h.handle.snapshot().status.is_camera_off());
    assert!(!h.probe.opened.load(Ordering::SeqCst));

    h.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_setup_releases_everything() {
    let h = launch(Setup {
        init_delay: Duration::from_secs(1),
        ..Setup::default()
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.handle.start_recording(None).await, Err(TrackerError::NotInitialized));

    h.handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(!h.probe.opened.load(Ordering::SeqCst));
    assert!(h.probe.disposed.load(Ordering::SeqCst));
    assert_eq!(h.handle.snapshot().status, PipelineStatus::Closed);
    assert_eq!(h.handle.wait_until_ready().await, Err(TrackerError::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_tears_down() {
    let h = launch(Setup::default());
    h.handle.wait_until_ready().await.unwrap();
    let probe = Arc::clone(&h.probe);
    let mut snapshots = h.handle.watch_snapshot();

    drop(h);
    snapshots
        .wait_for(|s| s.status == PipelineStatus::Closed)
        .await
        .unwrap();

    assert!(probe.closed.load(Ordering::SeqCst));
    assert!(probe.disposed.load(Ordering::SeqCst));
}
