//! fallwatchd - fall detection pipeline daemon
//!
//! Wires the configured camera, detector, and rule engine into the
//! pipeline and runs the capture loop until SIGINT/SIGTERM.
//!
//! The default build ships the synthetic camera and stub detection
//! backends, which exercise the full event path end to end. Real ONNX
//! inference comes in with the `backend-tract` feature.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use fallwatch::analysis::rule::{BBoxRule, PoseRule, RuleEngine};
use fallwatch::detect::backend::{DetectionKind, DetectorBackend};
use fallwatch::lifecycle::extractor::SkeletonExtractor;
use fallwatch::{Detector, FallwatchConfig, Pipeline, Scene, SyntheticCamera};

#[derive(Parser, Debug)]
#[command(name = "fallwatchd", about = "Fall detection pipeline daemon")]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "FALLWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn person_backend(config: &FallwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-tract")]
    {
        use fallwatch::detect::backends::tract::TractBackend;
        let [width, height] = config.camera.resolution;
        let backend = TractBackend::new(
            &config.detection.model,
            width,
            height,
            DetectionKind::Person,
            config.detection.confidence as f32,
            config.detection.classes.clone(),
        )?;
        return Ok(Box::new(backend));
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        use fallwatch::detect::backends::stub::StubPersonBackend;
        let _ = config;
        log::info!("using stub person backend (build with backend-tract for ONNX inference)");
        Ok(Box::new(StubPersonBackend::new()))
    }
}

fn pose_backend(config: &FallwatchConfig) -> Result<Box<dyn DetectorBackend>> {
    #[cfg(feature = "backend-tract")]
    {
        use fallwatch::detect::backends::tract::TractBackend;
        let [width, height] = config.camera.resolution;
        // Class filtering does not apply to the pose output layout.
        let backend = TractBackend::new(
            &config.detection.pose_model,
            width,
            height,
            DetectionKind::Pose,
            config.detection.confidence as f32,
            Vec::new(),
        )?;
        return Ok(Box::new(backend));
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        use fallwatch::detect::backends::stub::StubPoseBackend;
        let _ = config;
        Ok(Box::new(StubPoseBackend::new()))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = FallwatchConfig::load_from(args.config.as_deref())?;

    // Camera drivers are external; the daemon ships a synthetic source
    // that alternates upright and fallen figures for demonstration.
    let [width, height] = config.camera.resolution;
    let camera = SyntheticCamera::new(
        width,
        height,
        vec![
            (Scene::Standing, config.camera.fps * 30),
            (Scene::Fallen, config.camera.fps * 10),
        ],
    )
    .with_fps(config.camera.fps)
    .looped();

    let (detector, rule) = if config.detection.use_pose {
        let detector = Detector::new(pose_backend(&config)?, DetectionKind::Pose)?;
        let mut rule = PoseRule::new(
            config.analysis.fall_threshold,
            PoseRule::DEFAULT_MIN_VISIBILITY,
        );
        if config.detection.enable_smoothing {
            rule = rule.with_smoothing(
                config.detection.smoothing_min_cutoff,
                config.detection.smoothing_beta,
            )?;
        }
        (detector, RuleEngine::Pose(rule))
    } else {
        let detector = Detector::new(person_backend(&config)?, DetectionKind::Person)?;
        (
            detector,
            RuleEngine::BBox(BBoxRule::new(config.analysis.fall_threshold)),
        )
    };

    let pose_extractor = if config.lifecycle.auto_skeleton_extract {
        let pose_detector = Detector::new(pose_backend(&config)?, DetectionKind::Pose)?;
        Some(SkeletonExtractor::new(
            pose_detector,
            &config.detection.pose_model,
        ))
    } else {
        None
    };

    let mut pipeline = Pipeline::new(
        &config,
        Box::new(camera),
        detector,
        pose_extractor,
        rule,
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::info!("termination signal received, stopping");
        handler_stop.store(true, Ordering::Relaxed);
    })?;

    let mode = if config.detection.use_pose { "pose" } else { "bbox" };
    log::info!(
        "starting fall detection (mode: {}, fps: {}, buffer: {:.0}s)",
        mode,
        config.camera.fps,
        config.recording.buffer_seconds
    );

    let result = pipeline.run(&stop);
    pipeline.shutdown();
    result
}
