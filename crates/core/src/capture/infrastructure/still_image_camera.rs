use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::domain::camera_source::{CameraSource, CaptureConstraints, StreamInfo};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::video_surface::VideoSurface;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Presents an image file, or every image in a directory in name order, as a
/// looping camera feed.
pub struct StillImageCamera {
    path: PathBuf,
    fps: f64,
    frames: Arc<Vec<Frame>>,
    worker: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>, fps: f64) -> Self {
        Self {
            path: path.into(),
            fps: if fps > 0.0 { fps } else { 30.0 },
            frames: Arc::new(Vec::new()),
            worker: None,
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(path: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    if !path.exists() {
        return Err(CaptureError::DeviceNotFound);
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = std::fs::read_dir(path).map_err(|e| CaptureError::Other(e.to_string()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    files.sort();
    Ok(files)
}

fn decode(path: &Path, index: usize) -> Result<Frame, CaptureError> {
    let img = image::open(path)
        .map_err(|e| CaptureError::Other(format!("{}: {e}", path.display())))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index))
}

impl CameraSource for StillImageCamera {
    fn acquire(&mut self, _constraints: &CaptureConstraints) -> Result<StreamInfo, CaptureError> {
        let files = list_images(&self.path)?;
        if files.is_empty() {
            return Err(CaptureError::DeviceNotFound);
        }
        let frames = files
            .iter()
            .enumerate()
            .map(|(i, p)| decode(p, i))
            .collect::<Result<Vec<_>, _>>()?;

        let first = &frames[0];
        let info = StreamInfo {
            label: self.path.display().to_string(),
            width: first.width(),
            height: first.height(),
            fps: self.fps,
        };
        self.frames = Arc::new(frames);
        Ok(info)
    }

    fn play(&mut self, surface: &VideoSurface) -> Result<(), CaptureError> {
        let stream_id = surface
            .stream_id()
            .ok_or_else(|| CaptureError::PlaybackError("surface is detached".into()))?;
        if self.frames.is_empty() {
            return Err(CaptureError::PlaybackError("no stream acquired".into()));
        }
        self.stop_tracks();

        let stop = Arc::new(AtomicBool::new(false));
        let frames = self.frames.clone();
        let surface = surface.clone();
        let period = Duration::from_secs_f64(1.0 / self.fps);
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("still-image-camera".into())
            .spawn(move || {
                let mut index = 0usize;
                while !stop_flag.load(Ordering::Relaxed) {
                    let frame = frames[index % frames.len()].clone().with_index(index);
                    if !surface.push_frame(stream_id, frame) {
                        break;
                    }
                    index += 1;
                    thread::sleep(period);
                }
            })
            .map_err(|e| CaptureError::PlaybackError(e.to_string()))?;

        self.worker = Some((stop, handle));
        Ok(())
    }

    fn stop_tracks(&mut self) {
        if let Some((stop, handle)) = self.worker.take() {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

impl Drop for StillImageCamera {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
