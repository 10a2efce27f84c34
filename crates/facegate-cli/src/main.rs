use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facegate_core::gate::check;
use facegate_core::geometry::evaluate;
use facegate_core::{
    AlignmentVerdict, CaptureConfig, CaptureEngine, CaptureMode, Descriptor, Detector,
    DetectorError, GeometryMetrics, Profile, SessionStatus, StreamDetector,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face-capture tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture session against a detection stream
    Run {
        /// Line-delimited JSON detections ("-" for stdin)
        detections: PathBuf,
        #[command(flatten)]
        session: SessionArgs,
        /// Print every status change as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Measure and gate every frame of a detection stream
    Evaluate {
        /// Line-delimited JSON detections ("-" for stdin)
        detections: PathBuf,
        /// Threshold profile to gate against
        #[arg(short, long, default_value = "lenient")]
        profile: Profile,
        /// Print one JSON report per frame
        #[arg(long)]
        json: bool,
    },
    /// List the built-in threshold profiles
    Profiles,
}

/// Session settings. Flags override values from `--config`.
#[derive(Args, Debug, Default)]
struct SessionArgs {
    /// TOML file with capture settings
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Capture mode (register, match)
    #[arg(short, long)]
    mode: Option<CaptureMode>,
    /// Threshold profile (lenient, strict)
    #[arg(short, long)]
    profile: Option<Profile>,
    /// Consecutive aligned frames required
    #[arg(long)]
    required_streak: Option<u32>,
    /// Milliseconds between detector polls
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Countdown seconds before detection (0 skips it)
    #[arg(long)]
    countdown: Option<u32>,
    /// Detection timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl SessionArgs {
    fn resolve(&self) -> Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::load(path)?,
            None => CaptureConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
            config.thresholds = None;
        }
        if let Some(v) = self.required_streak {
            config.required_streak = v;
        }
        if let Some(v) = self.poll_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.countdown {
            config.countdown_seconds = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        config.validate()?;
        Ok(config)
    }
}

type Stream = StreamDetector<Box<dyn BufRead + Send>>;

fn open_stream(path: &Path) -> Result<Stream> {
    let reader: Box<dyn BufRead + Send> = if path == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Box::new(BufReader::new(file))
    };
    Ok(StreamDetector::new(reader))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            detections,
            session,
            json,
        } => {
            let config = session.resolve()?;
            let engine = CaptureEngine::new(open_stream(&detections)?);
            let descriptor = run_capture(&engine, config, json).await?;
            println!("{}", serde_json::to_string(&descriptor)?);
        }
        Commands::Evaluate {
            detections,
            profile,
            json,
        } => {
            let mut stream = open_stream(&detections)?;
            let summary = evaluate_stream(&mut stream, profile, |report| {
                if json {
                    match serde_json::to_string(report) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "failed to encode report"),
                    }
                } else {
                    println!("{}", report.describe());
                }
            })?;
            eprintln!(
                "{} frames, {} aligned, {} malformed",
                summary.frames, summary.aligned, summary.malformed
            );
        }
        Commands::Profiles => {
            for profile in Profile::ALL {
                let t = profile.thresholds();
                println!(
                    "{:<8} ratio {:.2}..{:.2}  center x<={:.2} y<={:.2}  nose<={:.2}  tilt<={:.2}",
                    profile.name(),
                    t.min_ratio,
                    t.max_ratio,
                    t.max_center_x,
                    t.max_center_y,
                    t.max_nose_offset,
                    t.max_tilt,
                );
            }
        }
    }

    Ok(())
}

/// Run one session to completion, reporting progress as it goes.
///
/// Ctrl-C cancels the session.
async fn run_capture(
    engine: &CaptureEngine,
    config: CaptureConfig,
    json: bool,
) -> Result<Descriptor> {
    let mut handle = engine.start(config)?;
    let mut events = handle.subscribe();
    let mut progress = Progress { json, last: None };

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(status) => {
                    progress.show(&status);
                    if status.phase.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = tokio::select! {
        result = handle.result() => result,
        _ = tokio::signal::ctrl_c() => {
            handle.cancel().await;
            handle.result().await
        }
    };
    // Closes the event channel once the session task has exited.
    drop(handle);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "status printer failed");
    }
    Ok(outcome?)
}

/// Prints status changes: JSON lines on stdout, or messages on stderr.
struct Progress {
    json: bool,
    last: Option<SessionStatus>,
}

impl Progress {
    fn show(&mut self, status: &SessionStatus) {
        if self.last.as_ref() == Some(status) {
            return;
        }
        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode status"),
            }
        } else if self.last.as_ref().map(|s| s.message.as_str()) != Some(status.message.as_str())
            && !status.message.is_empty()
        {
            eprintln!("[{}] {}", status.phase, status.message);
        }
        self.last = Some(status.clone());
    }
}

#[derive(Debug, Serialize)]
struct FrameReport {
    frame: usize,
    metrics: Option<GeometryMetrics>,
    #[serde(flatten)]
    verdict: AlignmentVerdict,
}

impl FrameReport {
    fn describe(&self) -> String {
        let verdict = match self.verdict {
            AlignmentVerdict::Pass => "pass".to_string(),
            AlignmentVerdict::Reject(reason) => format!("{reason}: {}", reason.message()),
        };
        match &self.metrics {
            Some(m) => format!(
                "frame {:>4}  ratio {:.3}  cx {:.3}  cy {:.3}  nose {:.3}  tilt {:.3}  {verdict}",
                self.frame,
                m.face_width_ratio,
                m.center_offset_x,
                m.center_offset_y,
                m.nose_offset,
                m.eye_tilt,
            ),
            None => format!("frame {:>4}  {verdict}", self.frame),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct EvaluateSummary {
    frames: usize,
    aligned: usize,
    malformed: usize,
}

/// Gate every frame until the stream ends. Malformed lines are reported and skipped.
fn evaluate_stream(
    stream: &mut impl Detector,
    profile: Profile,
    mut emit: impl FnMut(&FrameReport),
) -> Result<EvaluateSummary> {
    let thresholds = profile.thresholds();
    let mut summary = EvaluateSummary::default();
    loop {
        let frame = match stream.detect() {
            Ok(frame) => frame,
            Err(DetectorError::StreamEnded) => break,
            Err(e @ DetectorError::Malformed { .. }) => {
                tracing::warn!(error = %e, "skipping malformed detection");
                summary.malformed += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        summary.frames += 1;

        let metrics = match frame.as_ref().map(evaluate).transpose() {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::debug!(frame = summary.frames, error = %e, "unusable landmarks");
                None
            }
        };
        let verdict = check(metrics.as_ref(), &thresholds);
        if verdict.is_pass() {
            summary.aligned += 1;
        }
        emit(&FrameReport {
            frame: summary.frames,
            metrics,
            verdict,
        });
    }
    Ok(summary)
}
