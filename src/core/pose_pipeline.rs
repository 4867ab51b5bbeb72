// Pose pipeline: camera -> estimator -> filter -> sampled capture -> scoring
//
// One worker task owns the camera, the estimator and the capture session.
// Hosts drive it through a cloneable `PosePipelineHandle`; results flow back
// over watch channels (snapshot, live frame) and a broadcast event stream.

use crate::core::capture_session::{CaptureSession, PendingSubmission};
use crate::core::config::TrackerConfig;
use crate::core::keypoint_filter::KeypointFilter;
use crate::core::scoring_client::ScoreSubmitter;
use crate::models::capture::CameraRequest;
use crate::models::pose::PoseFrame;
use crate::models::scoring::ScoreRequest;
use crate::models::session::{
    CaptureState, PipelineEvent, PipelineStatus, SessionSnapshot, TrackerError, TrackerResult,
};
use crate::platform::{CameraSource, PoseEstimator};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

/// The exercise a pipeline instance records attempts for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExerciseTask {
    pub task_id: String,
    pub reference_video_url: Option<String>,
    pub user_id: Option<String>,
}

type Reply = oneshot::Sender<TrackerResult<()>>;

enum Command {
    Start {
        reference_clip: Option<Duration>,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    Reset {
        reply: Reply,
    },
    Shutdown,
}

/// Messages the worker sends to itself from spawned tasks
enum Internal {
    ReferenceEnded {
        attempt_id: Uuid,
    },
    SubmissionFinished {
        attempt_id: Uuid,
        outcome: Result<Option<f32>, String>,
    },
}

pub struct PosePipeline;

impl PosePipeline {
    /// Spawn the worker on the current tokio runtime. Setup (model, then
    /// camera) runs in the background; use `wait_until_ready` to observe it.
    pub fn launch(
        config: TrackerConfig,
        task: ExerciseTask,
        camera: Box<dyn CameraSource>,
        estimator: Box<dyn PoseEstimator>,
        submitter: Arc<dyn ScoreSubmitter>,
    ) -> PosePipelineHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());
        let (live_tx, live_rx) = watch::channel(PoseFrame::default());
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let worker = Worker {
            filter: KeypointFilter::new(config.min_confidence, config.landmarks.clone()),
            session: CaptureSession::new(config.sample_interval()),
            frame_tick: config.frame_tick(),
            camera_request: config.camera.clone(),
            task,
            camera,
            estimator,
            submitter,
            status: PipelineStatus::Initializing,
            snapshot_tx,
            live_tx,
            events: event_tx.clone(),
            internal_tx,
            released: false,
        };

        info!(
            "Launching pose pipeline for task {} ({})",
            worker.task.task_id,
            worker.estimator.model_info()
        );
        let join = tokio::spawn(worker.run(command_rx, internal_rx));

        PosePipelineHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            live: live_rx,
            events: event_tx,
            worker: Arc::new(Mutex::new(Some(join))),
        }
    }
}

/// Host-side control surface. Dropping every clone tears the pipeline down.
#[derive(Clone)]
pub struct PosePipelineHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    live: watch::Receiver<PoseFrame>,
    events: broadcast::Sender<PipelineEvent>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PosePipelineHandle {
    /// `reference_clip` is the length of the guided clip; recording stops
    /// on its own when it ends.
    pub async fn start_recording(&self, reference_clip: Option<Duration>) -> TrackerResult<()> {
        self.request(|reply| Command::Start {
            reference_clip,
            reply,
        })
        .await
    }

    /// Stop and submit. Returns once submission has begun; the score
    /// arrives later through the snapshot and event stream.
    pub async fn stop_recording(&self) -> TrackerResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn reset(&self) -> TrackerResult<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Latest filtered frame, updated every tick whether or not recording
    pub fn live_frames(&self) -> watch::Receiver<PoseFrame> {
        self.live.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Wait for setup to finish. Returns the setup failure, if any.
    pub async fn wait_until_ready(&self) -> TrackerResult<()> {
        let mut rx = self.snapshot.clone();
        let status = rx
            .wait_for(|s| s.status != PipelineStatus::Initializing)
            .await
            .map_err(|_| TrackerError::Closed)?
            .status
            .clone();

        match status {
            PipelineStatus::Ready => Ok(()),
            PipelineStatus::Failed(err) => Err(err),
            PipelineStatus::Initializing | PipelineStatus::Closed => Err(TrackerError::Closed),
        }
    }

    /// Wait until no submission is in flight
    pub async fn wait_for_idle(&self) -> TrackerResult<SessionSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.state == CaptureState::Idle)
            .await
            .map_err(|_| TrackerError::Closed)?
            .clone();
        Ok(snapshot)
    }

    /// Tear down and wait for the worker to release the camera and model.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;

        let join = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(join) = join {
            if let Err(e) = join.await {
                error!("Pose pipeline worker ended abnormally: {}", e);
            }
        }
    }

    async fn request(&self, build: impl FnOnce(Reply) -> Command) -> TrackerResult<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| TrackerError::Closed)?;
        rx.await.map_err(|_| TrackerError::Closed)?
    }
}

struct Worker {
    task: ExerciseTask,
    camera: Box<dyn CameraSource>,
    estimator: Box<dyn PoseEstimator>,
    submitter: Arc<dyn ScoreSubmitter>,
    filter: KeypointFilter,
    session: CaptureSession,
    frame_tick: Duration,
    camera_request: CameraRequest,
    status: PipelineStatus,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    live_tx: watch::Sender<PoseFrame>,
    events: broadcast::Sender<PipelineEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    released: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        match self.initialize(&mut commands).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Pose pipeline torn down during setup");
                self.teardown();
                return;
            }
            Err(err) => {
                self.fail(err.clone());
                Self::reject_until_shutdown(&mut commands, err).await;
                self.teardown();
                return;
            }
        }

        let mut ticker = tokio::time::interval(self.frame_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = internal.recv() => self.handle_internal(message),
                _ = ticker.tick() => self.detect_once().await,
            }
        }

        self.teardown();
    }

    /// Model first, then camera. Returns `Ok(false)` if the host tore the
    /// pipeline down before setup finished.
    async fn initialize(&mut self, commands: &mut mpsc::Receiver<Command>) -> TrackerResult<bool> {
        tokio::select! {
            result = self.estimator.initialize() => result?,
            _ = Self::wait_for_shutdown(commands) => return Ok(false),
        }
        debug!("Pose model ready");

        let stream = tokio::select! {
            result = self.camera.open(&self.camera_request) => result?,
            _ = Self::wait_for_shutdown(commands) => return Ok(false),
        };
        info!(
            "Camera ready: {} ({}x{})",
            stream.device_name, stream.width, stream.height
        );

        self.status = PipelineStatus::Ready;
        self.publish();
        self.emit(PipelineEvent::Initialized);
        Ok(true)
    }

    /// Resolves on shutdown; commands that arrive meanwhile are refused
    async fn wait_for_shutdown(commands: &mut mpsc::Receiver<Command>) {
        Self::reject_until_shutdown(commands, TrackerError::NotInitialized).await
    }

    async fn reject_until_shutdown(commands: &mut mpsc::Receiver<Command>, err: TrackerError) {
        while let Some(command) = commands.recv().await {
            let reply = match command {
                Command::Shutdown => return,
                Command::Start { reply, .. } | Command::Stop { reply } | Command::Reset { reply } => reply,
            };
            let _ = reply.send(Err(err.clone()));
        }
    }

    fn fail(&mut self, err: TrackerError) {
        error!("Pose pipeline setup failed: {}", err);
        self.release();
        self.session.set_error(err.to_string());
        self.status = PipelineStatus::Failed(err.clone());
        self.publish();
        self.emit(PipelineEvent::InitFailed(err));
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                reference_clip,
                reply,
            } => {
                let _ = reply.send(self.start(reference_clip));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Reset { reply } => {
                let result = self.session.reset();
                if result.is_ok() {
                    debug!("Capture session reset");
                    self.publish();
                }
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    fn start(&mut self, reference_clip: Option<Duration>) -> TrackerResult<()> {
        let attempt_id = self.session.start(Instant::now())?;
        info!("Recording started for task {}", self.task.task_id);

        if let Some(clip) = reference_clip {
            let tx = self.internal_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(clip).await;
                let _ = tx.send(Internal::ReferenceEnded { attempt_id });
            });
        }

        self.publish();
        self.emit(PipelineEvent::RecordingStarted);
        Ok(())
    }

    fn stop(&mut self) -> TrackerResult<()> {
        match self.session.stop(Instant::now()) {
            Ok(pending) => {
                let frames = pending.sequence.len();
                info!("Recording stopped with {} frames", frames);
                self.emit(PipelineEvent::RecordingStopped { frames });
                self.submit(pending);
                self.publish();
                self.emit(PipelineEvent::SubmissionStarted { frames });
                Ok(())
            }
            Err(TrackerError::EmptyCapture) => {
                warn!("Recording stopped with no frames");
                self.publish();
                self.emit(PipelineEvent::RecordingStopped { frames: 0 });
                Err(TrackerError::EmptyCapture)
            }
            Err(err) => Err(err),
        }
    }

    fn submit(&self, pending: PendingSubmission) {
        let PendingSubmission {
            attempt_id,
            sequence,
        } = pending;
        let request = ScoreRequest {
            task_id: self.task.task_id.clone(),
            reference_video_url: self.task.reference_video_url.clone(),
            user_id: self.task.user_id.clone(),
            user_pose_sequence: sequence.into_frames(),
        };

        let submitter = Arc::clone(&self.submitter);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = submitter.submit(&request).await.map_err(|e| e.to_string());
            // Fails only once the worker is gone; the result is dropped then
            let _ = tx.send(Internal::SubmissionFinished {
                attempt_id,
                outcome,
            });
        });
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::ReferenceEnded { attempt_id } => {
                if self.session.is_recording() && self.session.attempt_id() == Some(attempt_id) {
                    info!("Reference clip ended, stopping recording");
                    if let Err(e) = self.stop() {
                        warn!("Automatic stop failed: {}", e);
                    }
                }
            }
            Internal::SubmissionFinished {
                attempt_id,
                outcome,
            } => {
                if !self.session.finish_submission(attempt_id, outcome.clone()) {
                    debug!("Ignoring result for stale attempt {}", attempt_id);
                    return;
                }
                self.publish();

                match outcome {
                    Ok(score) => {
                        info!("Attempt scored: {:?}", score);
                        self.emit(PipelineEvent::Scored { score });
                        if let Some(score) = score {
                            self.emit(PipelineEvent::ExerciseComplete { score });
                        }
                    }
                    Err(message) => {
                        warn!("Scoring failed: {}", message);
                        self.emit(PipelineEvent::SubmissionFailed { message });
                    }
                }
            }
        }
    }

    /// One frame through the pipeline. Per-frame failures are logged and
    /// the frame is dropped.
    async fn detect_once(&mut self) {
        let frame = match self.camera.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                warn!("Camera read failed: {}", e);
                return;
            }
        };

        let raw = match self.estimator.estimate(&frame).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Pose inference failed: {}", e);
                return;
            }
        };

        let Some(raw) = raw else {
            self.live_tx.send_replace(PoseFrame::default());
            return;
        };

        // A detected body with nothing above threshold is still recorded as
        // an empty frame so the timeline has no gaps
        let pose = self.filter.apply(&raw, frame.width, frame.height);
        self.live_tx.send_replace(pose.clone());
        if self.session.offer_frame(Instant::now(), &pose) {
            self.publish();
        }
    }

    fn teardown(&mut self) {
        self.release();
        self.status = PipelineStatus::Closed;
        self.publish();
        self.emit(PipelineEvent::Closed);
        info!("Pose pipeline closed");
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.camera.close();
        self.estimator.dispose();
        self.released = true;
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(self.session.snapshot(self.status.clone()));
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.release();
    }
}
