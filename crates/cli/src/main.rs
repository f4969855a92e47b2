use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::{select, Receiver, Sender};

use facewatch_core::capture::capture_manager::CaptureManager;
use facewatch_core::capture::domain::camera_source::{CameraSource, CaptureConstraints};
use facewatch_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use facewatch_core::capture::infrastructure::still_image_camera::StillImageCamera;
use facewatch_core::detection::domain::face_detector::FaceDetector;
use facewatch_core::detection::infrastructure::model_loader::{load_models, LoadProgressFn};
use facewatch_core::detection::infrastructure::scripted_face_detector::ScriptedFaceDetector;
use facewatch_core::pipeline::monitor_use_case::MonitorUseCase;
use facewatch_core::pipeline::session_event::SessionEvent;
use facewatch_core::pipeline::session_logger::LogSessionLogger;
use facewatch_core::session::frame_snapshot::FrameSnapshot;
use facewatch_core::session::monitor_session::SessionConfig;
use facewatch_core::session::session_guard::TabEvent;
use facewatch_core::shared::settings::MonitorSettings;

/// Frame rate of the replayed image feed.
const STILL_IMAGE_FPS: f64 = 15.0;

/// Webcam face monitoring session driven from the terminal.
///
/// Commands are read from stdin, one per line: start, stop, restart,
/// hide, blur, show, focus, status, quit.
#[derive(Parser)]
#[command(name = "facewatch")]
struct Cli {
    /// Model base URI: a directory, a file:// URL or an http(s) URL.
    #[arg(long)]
    models: Option<String>,

    /// Capture device name (platform default when omitted).
    #[arg(long)]
    device: Option<String>,

    /// Use an image file or a directory of images as the camera.
    #[arg(long)]
    images: Option<PathBuf>,

    /// Replay scripted detection results (JSON) instead of running models.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Settings file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Detection tick interval in milliseconds.
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Face detection confidence in percent (0-100).
    #[arg(long)]
    confidence: Option<u32>,

    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Restart,
    Tab(TabEvent),
    Status,
    Quit,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = build_settings(&cli)?;
    let capture = build_capture(&cli, &settings);
    let detector = build_detector(&cli, &settings)?;

    let mut monitor = MonitorUseCase::new(
        SessionConfig::from(&settings),
        capture,
        detector,
        Box::new(LogSessionLogger::default()),
    );
    let events = monitor.events();
    let commands = spawn_stdin_reader()?;

    let mut printer = EventPrinter::new(cli.json);
    loop {
        select! {
            recv(events) -> event => {
                if let Ok(event) = event {
                    printer.print(&event);
                }
            }
            recv(commands) -> command => {
                let Ok(command) = command else {
                    break;
                };
                if !handle_command(&mut monitor, &printer, command) {
                    break;
                }
            }
        }
    }

    monitor.stop()?;
    for event in events.try_iter() {
        printer.print(&event);
    }
    Ok(())
}

/// Applies one command. Returns false when the host should exit.
fn handle_command(
    monitor: &mut MonitorUseCase,
    printer: &EventPrinter,
    command: Command,
) -> bool {
    let result = match command {
        Command::Start => monitor.start(),
        Command::Stop => monitor.stop(),
        Command::Restart => monitor.restart(),
        Command::Tab(tab) => {
            monitor.tab_event(tab);
            Ok(())
        }
        Command::Status => {
            printer.status(monitor);
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
    true
}

fn build_settings(cli: &Cli) -> Result<MonitorSettings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => MonitorSettings::load_from(path)?,
        None => MonitorSettings::load(),
    };
    if let Some(models) = &cli.models {
        settings.model_base_uri = models.clone();
    }
    if let Some(tick_ms) = cli.tick_ms {
        settings.tick_interval_ms = tick_ms;
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    settings.validate()?;

    if cli.save_config {
        let path = match &cli.config {
            Some(path) => {
                settings.save_to(path)?;
                path.clone()
            }
            None => settings.save()?,
        };
        log::info!("Settings saved to {}", path.display());
    }
    Ok(settings)
}

fn build_capture(cli: &Cli, settings: &MonitorSettings) -> CaptureManager {
    let camera: Box<dyn CameraSource> = match &cli.images {
        Some(path) => Box::new(StillImageCamera::new(path.clone(), STILL_IMAGE_FPS)),
        None => Box::new(FfmpegCamera::new(cli.device.clone())),
    };
    let constraints = CaptureConstraints {
        ideal_width: settings.capture_width,
        ideal_height: settings.capture_height,
        ..CaptureConstraints::default()
    };
    CaptureManager::new(camera, constraints, settings.camera_startup_timeout())
}

fn build_detector(
    cli: &Cli,
    settings: &MonitorSettings,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    if let Some(script) = &cli.replay {
        log::info!("Replaying detections from {}", script.display());
        return Ok(Box::new(ScriptedFaceDetector::from_file(script)?));
    }

    log::info!("Loading models from {}", settings.model_base_uri);
    let progress: LoadProgressFn = Arc::new(download_progress);
    let analyzer = load_models(
        &settings.model_base_uri,
        settings.confidence_fraction(),
        Some(progress),
    )?;
    Ok(Box::new(analyzer))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.images.is_some() && cli.device.is_some() {
        return Err("--images and --device are mutually exclusive".into());
    }
    if let Some(images) = &cli.images {
        if !images.exists() {
            return Err(format!("Image source not found: {}", images.display()).into());
        }
    }
    if let Some(replay) = &cli.replay {
        if !replay.exists() {
            return Err(format!("Replay script not found: {}", replay.display()).into());
        }
    }
    if cli.replay.is_some() && cli.models.is_some() {
        return Err("--replay and --models are mutually exclusive".into());
    }
    if let Some(confidence) = cli.confidence {
        if confidence > 100 {
            return Err(format!("Confidence must be between 0 and 100, got {confidence}").into());
        }
    }
    if cli.tick_ms == Some(0) {
        return Err("Tick interval must be at least 1 ms".into());
    }
    Ok(())
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "start" => Command::Start,
        "stop" => Command::Stop,
        "restart" => Command::Restart,
        "hide" | "hidden" => Command::Tab(TabEvent::Hidden),
        "blur" => Command::Tab(TabEvent::Blurred),
        "show" | "visible" => Command::Tab(TabEvent::Visible),
        "focus" => Command::Tab(TabEvent::Focused),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command '{other}'")),
    };
    Ok(Some(command))
}

fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx): (Sender<Command>, Receiver<Command>) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
        })?;
    Ok(rx)
}

/// Renders events for the terminal. Snapshots are printed only when they
/// differ from the previous one.
struct EventPrinter {
    json: bool,
    last_snapshot: Option<FrameSnapshot>,
}

impl EventPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            last_snapshot: None,
        }
    }

    fn print(&mut self, event: &SessionEvent) {
        if let SessionEvent::Snapshot { snapshot, .. } = event {
            if self.last_snapshot.as_ref() == Some(snapshot) {
                return;
            }
            self.last_snapshot = Some(snapshot.clone());
        }
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => log::warn!("Failed to encode event: {e}"),
            }
        } else {
            println!("{}", describe(event));
        }
    }

    fn status(&self, monitor: &MonitorUseCase) {
        let snapshot = monitor.snapshot();
        let session = monitor.session_state();
        if self.json {
            let status = serde_json::json!({
                "state": monitor.state(),
                "permission": monitor.permission(),
                "camera_ready": monitor.is_camera_ready(),
                "snapshot": snapshot,
                "session": session,
            });
            println!("{status}");
        } else {
            println!(
                "state={:?} permission={:?} camera_ready={} tab_inactive={} {}",
                monitor.state(),
                monitor.permission(),
                monitor.is_camera_ready(),
                session.tab_inactive_count,
                describe_snapshot(&snapshot)
            );
        }
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::CameraReady {
            label,
            width,
            height,
        } => format!("camera ready: {label} ({width}x{height})"),
        SessionEvent::Snapshot { snapshot, .. } => describe_snapshot(snapshot),
        SessionEvent::TabChanged {
            tab,
            inactive_count,
        } => format!("tab {tab:?} (inactive transitions: {inactive_count})"),
        SessionEvent::Failed { reason, .. } => format!("FAILED: {reason}"),
        SessionEvent::Stopped => "stopped".to_string(),
    }
}

fn describe_snapshot(snapshot: &FrameSnapshot) -> String {
    let opt = |v: Option<bool>| match v {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    };
    let expression = snapshot
        .dominant_expression
        .map(|e| e.label())
        .unwrap_or("-");
    let mut line = format!(
        "faces={} expression={} looking={} live={}",
        snapshot.face_count,
        expression,
        opt(snapshot.looking_at_screen),
        opt(snapshot.is_real_face)
    );
    if let Some(reason) = snapshot.failure_reason() {
        line.push_str(&format!(" failure=\"{reason}\""));
    }
    line
}

fn download_progress(artifact: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {artifact}... {pct}%");
    } else {
        eprint!("\rDownloading {artifact}... {downloaded} bytes");
    }
    if total > 0 && downloaded >= total {
        eprintln!();
    }
}
