use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ffmpeg_next::format::context::Context;
use ffmpeg_next::format::Format;

use crate::capture::domain::camera_source::{
    CameraSource, CaptureConstraints, FacingMode, StreamInfo,
};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::video_surface::VideoSurface;
use crate::shared::frame::Frame;

#[cfg(target_os = "linux")]
const INPUT_FORMAT: &str = "v4l2";
#[cfg(target_os = "macos")]
const INPUT_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const INPUT_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INPUT_FORMAT: &str = "";

#[cfg(target_os = "linux")]
const DEFAULT_DEVICE: &str = "/dev/video0";
#[cfg(target_os = "macos")]
const DEFAULT_DEVICE: &str = "0";
#[cfg(target_os = "windows")]
const DEFAULT_DEVICE: &str = "video=Integrated Camera";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DEFAULT_DEVICE: &str = "";

/// Captures from a webcam through libavdevice.
pub struct FfmpegCamera {
    device: Option<String>,
    stream: Option<OpenStream>,
    worker: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

struct OpenStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
}

// Safety: OpenStream is moved into the decode thread once and used only
// there. The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for OpenStream {}

impl FfmpegCamera {
    /// `device` is the platform device name; `None` picks the default camera.
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            stream: None,
            worker: None,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }
}

fn find_input_format() -> Option<Format> {
    if INPUT_FORMAT.is_empty() {
        return None;
    }
    ffmpeg_next::device::input::video().find(|f| f.name() == INPUT_FORMAT)
}

fn map_open_error(e: ffmpeg_next::Error) -> CaptureError {
    if let ffmpeg_next::Error::Other { errno } = e {
        match std::io::Error::from_raw_os_error(errno).kind() {
            ErrorKind::PermissionDenied => return CaptureError::PermissionDenied,
            ErrorKind::NotFound => return CaptureError::DeviceNotFound,
            _ => {}
        }
    }
    CaptureError::Other(e.to_string())
}

fn open_options(
    constraints: &CaptureConstraints,
    with_size: bool,
) -> ffmpeg_next::Dictionary<'static> {
    let mut options = ffmpeg_next::Dictionary::new();
    if with_size {
        options.set(
            "video_size",
            &format!("{}x{}", constraints.ideal_width, constraints.ideal_height),
        );
    }
    options.set("framerate", "30");
    options
}

fn open_device(
    device: &str,
    format: &Format,
    constraints: &CaptureConstraints,
) -> Result<ffmpeg_next::format::context::Input, CaptureError> {
    let first = ffmpeg_next::format::open_with(&device, format, open_options(constraints, true));
    let ctx = match first {
        Ok(ctx) => ctx,
        Err(e) => match map_open_error(e) {
            CaptureError::Other(reason) => {
                log::debug!(
                    "Camera rejected {}x{} ({reason}); retrying with device defaults",
                    constraints.ideal_width,
                    constraints.ideal_height
                );
                ffmpeg_next::format::open_with(&device, format, open_options(constraints, false))
                    .map_err(map_open_error)?
            }
            other => return Err(other),
        },
    };
    match ctx {
        Context::Input(input) => Ok(input),
        Context::Output(_) => Err(CaptureError::UnsupportedApi),
    }
}

impl CameraSource for FfmpegCamera {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<StreamInfo, CaptureError> {
        ffmpeg_next::init().map_err(|e| CaptureError::Other(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let format = find_input_format().ok_or(CaptureError::UnsupportedApi)?;
        if constraints.facing_mode == FacingMode::Environment {
            log::debug!("Facing mode is not selectable here; using {}", self.device_name());
        }

        let ictx = open_device(self.device_name(), &format, constraints)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(CaptureError::DeviceNotFound)?;

        let stream_index = stream.index();
        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| CaptureError::Other(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| CaptureError::Other(e.to_string()))?;

        let info = StreamInfo {
            label: self.device_name().to_string(),
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };
        self.stream = Some(OpenStream {
            ictx,
            decoder,
            stream_index,
        });
        Ok(info)
    }

    fn play(&mut self, surface: &VideoSurface) -> Result<(), CaptureError> {
        let stream_id = surface
            .stream_id()
            .ok_or_else(|| CaptureError::PlaybackError("surface is detached".into()))?;
        let stream = self
            .stream
            .take()
            .ok_or_else(|| CaptureError::PlaybackError("no stream acquired".into()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let surface = surface.clone();
        let handle = thread::Builder::new()
            .name("ffmpeg-camera".into())
            .spawn(move || decode_loop(stream, surface, stream_id, &stop_flag))
            .map_err(|e| CaptureError::PlaybackError(e.to_string()))?;

        self.worker = Some((stop, handle));
        Ok(())
    }

    fn stop_tracks(&mut self) {
        self.stream = None;
        if let Some((stop, handle)) = self.worker.take() {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Reads packets until stopped or the surface drops the stream, publishing
/// each decoded frame as RGB24. If the input runs dry first, the surface is
/// reset so ticks stop seeing a decodable frame.
fn decode_loop(mut stream: OpenStream, surface: VideoSurface, stream_id: u64, stop: &AtomicBool) {
    let mut scaler: Option<ffmpeg_next::software::scaling::Context> = None;
    let mut index = 0usize;
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();

    'packets: for (s, packet) in stream.ictx.packets() {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        if s.index() != stream.stream_index {
            continue;
        }
        if stream.decoder.send_packet(&packet).is_err() {
            continue;
        }
        while stream.decoder.receive_frame(&mut decoded).is_ok() {
            let (width, height) = (decoded.width(), decoded.height());
            if scaler.is_none() {
                match ffmpeg_next::software::scaling::Context::get(
                    decoded.format(),
                    width,
                    height,
                    ffmpeg_next::format::Pixel::RGB24,
                    width,
                    height,
                    ffmpeg_next::software::scaling::Flags::BILINEAR,
                ) {
                    Ok(ctx) => scaler = Some(ctx),
                    Err(e) => {
                        log::warn!("Camera frame conversion unavailable: {e}");
                        break 'packets;
                    }
                }
            }
            let Some(sc) = scaler.as_mut() else {
                break 'packets;
            };

            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = sc.run(&decoded, &mut rgb_frame) {
                log::debug!("Dropping camera frame: {e}");
                continue;
            }
            let pixels = extract_rgb_pixels(&rgb_frame, width, height);
            if !surface.push_frame(stream_id, Frame::new(pixels, width, height, 3, index)) {
                return;
            }
            index += 1;
        }
    }
    // Natural end: the surface would otherwise keep serving the last frame.
    if surface.end_stream(stream_id) {
        log::warn!("Camera stream ended after {index} frames");
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly-packed RGB buffer,
/// dropping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
