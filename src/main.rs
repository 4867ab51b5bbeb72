//! pose-capture - record an exercise attempt and get it scored

use anyhow::{bail, Context};
use pose_capture::cli::{Cli, Commands, ConfigAction, TokenAction};
use pose_capture::core::reference_poses::{ReferencePoseLibrary, ReferenceSequence};
use pose_capture::core::session_store::SessionStore;
use pose_capture::models::session::{CaptureState, PipelineEvent};
use pose_capture::platform::camera::ReplayCamera;
use pose_capture::platform::PoseEstimator;
use pose_capture::{ExerciseTask, HttpScoringClient, PosePipeline, TrackerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    // --verbose enables debug-level output
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(TrackerConfig::get_config_path);

    match cli.command {
        Commands::Record {
            task,
            frames,
            duration,
            reference_video,
            user,
            follow_reference,
            loop_frames,
        } => {
            let config = load_config(&config_path)?;
            let options = RecordOptions {
                task,
                frames,
                duration: Duration::from_secs(duration),
                reference_video,
                user,
                follow_reference,
                loop_frames,
            };
            run_record(options, config).await?;
        }
        Commands::Reference { task, video, url } => {
            let config = load_config(&config_path)?;
            run_reference(&task, video.as_deref(), url.as_deref(), &config).await?;
        }
        Commands::Token { action } => {
            let config = load_config(&config_path)?;
            run_token(action, &config)?;
        }
        Commands::Config { action } => {
            run_config(action, &config_path)?;
        }
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<TrackerConfig> {
    if path.exists() {
        TrackerConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        Ok(TrackerConfig::default())
    }
}

struct RecordOptions {
    task: String,
    frames: PathBuf,
    duration: Duration,
    reference_video: Option<String>,
    user: Option<String>,
    follow_reference: bool,
    loop_frames: bool,
}

#[cfg(feature = "ml-onnx")]
fn build_estimator(config: &TrackerConfig) -> anyhow::Result<Box<dyn PoseEstimator>> {
    use pose_capture::platform::pose::MoveNetEstimator;
    Ok(Box::new(MoveNetEstimator::new(config.model_path.clone())))
}

#[cfg(not(feature = "ml-onnx"))]
fn build_estimator(_config: &TrackerConfig) -> anyhow::Result<Box<dyn PoseEstimator>> {
    bail!("No pose model available: rebuild with `--features ml-onnx`")
}

async fn run_record(options: RecordOptions, config: TrackerConfig) -> anyhow::Result<()> {
    let estimator = build_estimator(&config)?;
    let camera = ReplayCamera::new(&options.frames).looping(options.loop_frames);

    let store = SessionStore::new(config.session_store_path.clone());
    let submitter = Arc::new(HttpScoringClient::from_config(&config)?);

    let reference_clip = if options.follow_reference {
        let library = ReferencePoseLibrary::new(config.reference_pose_dir.clone());
        let reference = library
            .load(&options.task, options.reference_video.as_deref())
            .await?;
        Some(reference.duration(config.reference_fps))
    } else {
        None
    };

    let task = ExerciseTask {
        task_id: options.task,
        reference_video_url: options.reference_video,
        user_id: options.user.or_else(|| store.user_id()),
    };

    let handle = PosePipeline::launch(config, task, Box::new(camera), estimator, submitter);
    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PipelineEvent::RecordingStopped { frames } => println!("Captured {} frames", frames),
                PipelineEvent::SubmissionStarted { .. } => println!("Analyzing..."),
                PipelineEvent::Closed => break,
                _ => {}
            }
        }
    });

    if let Err(e) = handle.wait_until_ready().await {
        handle.shutdown().await;
        bail!(e);
    }

    handle.start_recording(reference_clip).await?;
    println!("Recording...");

    if let Some(clip) = reference_clip {
        info!("Recording until the reference clip ends ({:.1}s)", clip.as_secs_f32());
        let mut snapshots = handle.watch_snapshot();
        snapshots
            .wait_for(|s| s.state != CaptureState::Recording)
            .await
            .context("Pipeline closed while recording")?;
    } else {
        tokio::time::sleep(options.duration).await;
        if let Err(e) = handle.stop_recording().await {
            handle.shutdown().await;
            bail!(e);
        }
    }

    let snapshot = handle.wait_for_idle().await?;
    handle.shutdown().await;
    let _ = printer.await;

    match (snapshot.score_percent(), snapshot.error) {
        (_, Some(error)) => bail!(error),
        (Some(percent), None) => println!("Score: {}%", percent),
        (None, None) => println!("Submitted; no score returned"),
    }

    Ok(())
}

async fn run_reference(
    task: &str,
    video: Option<&str>,
    url: Option<&str>,
    config: &TrackerConfig,
) -> anyhow::Result<()> {
    let sequence: ReferenceSequence = match url {
        Some(url) => ReferencePoseLibrary::fetch(url).await?,
        None => {
            let library = ReferencePoseLibrary::new(config.reference_pose_dir.clone());
            if let Some(path) = library.resolve(task, video) {
                println!("File: {}", path.display());
            }
            library.load(task, video).await?
        }
    };

    println!("Frames: {}", sequence.len());
    println!(
        "Duration: {:.1}s at {} fps",
        sequence.duration(config.reference_fps).as_secs_f32(),
        config.reference_fps
    );
    if let Some(first) = sequence.frames().first() {
        println!("Landmarks per frame: {}", first.len());
    }

    Ok(())
}

fn run_token(action: TokenAction, config: &TrackerConfig) -> anyhow::Result<()> {
    let store = SessionStore::new(config.session_store_path.clone());

    match action {
        TokenAction::Set { token, user } => {
            store.set_token(&token, user.as_deref())?;
            println!("Token stored in {}", store.path().display());
        }
        TokenAction::Clear => {
            store.clear()?;
            println!("Token cleared");
        }
        TokenAction::Show => {
            let session = store.read()?;
            match session.access_token {
                Some(_) => println!("Token: set"),
                None => println!("Token: not set"),
            }
            if let Some(user) = session.user_id {
                println!("User: {}", user);
            }
            if let Some(updated) = session.updated_at {
                println!("Updated: {}", updated.to_rfc3339());
            }
        }
    }

    Ok(())
}

fn run_config(action: ConfigAction, path: &std::path::Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                warn!("Config already exists at {}", path.display());
                bail!("Config already exists (use --force to overwrite)");
            }
            TrackerConfig::default().save_to(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Reset => {
            TrackerConfig::default().save_to(path)?;
            println!("Reset {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }

    Ok(())
}
