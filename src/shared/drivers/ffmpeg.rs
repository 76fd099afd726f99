// This is free and unencumbered software released into the public domain.

//! Desktop cameras read through an `ffmpeg` child process.
//!
//! Opening and configuring complete immediately; the repeating request
//! spawns `ffmpeg`, which scales the device's frames to the receiver size
//! and writes raw `yuv420p` to a pipe.

use crate::shared::{
    CameraBackend, CameraCharacteristics, CameraDevice, CameraError, CameraManager, CaptureSession,
    DeviceEvent, DeviceEventSender, Facing, ImageListener, ImageReceiver, NativeWindow,
    PlanarImage, Size, StreamConfig,
};
use alloc::borrow::Cow;
use std::{
    collections::HashMap,
    env,
    io::Read,
    process::{Child, Command, Stdio},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Sizes offered for every device; `ffmpeg` scales to whichever is chosen.
pub const OUTPUT_SIZES: [Size; 6] = [
    Size::new(320, 240),
    Size::new(640, 480),
    Size::new(1280, 720),
    Size::new(1280, 960),
    Size::new(1920, 1080),
    Size::new(3840, 2160),
];

type Receivers = Arc<Mutex<HashMap<NativeWindow, (Size, ImageListener)>>>;

pub struct FfmpegCameraManager {
    config: StreamConfig,
    receivers: Receivers,
    next_window: AtomicUsize,
}

impl core::fmt::Debug for FfmpegCameraManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FfmpegCameraManager")
            .field("config", &self.config)
            .finish()
    }
}

impl FfmpegCameraManager {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            receivers: Arc::default(),
            next_window: AtomicUsize::new(1),
        }
    }
}

impl dogma::Named for FfmpegCameraManager {
    fn name(&self) -> Cow<'_, str> {
        "ffmpeg".into()
    }
}

impl CameraManager for FfmpegCameraManager {
    fn backend(&self) -> CameraBackend {
        CameraBackend::Ffmpeg
    }

    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        let mut ids = list_video_devices()?;
        if let Some(device) = self.config.device.as_deref().map(str::trim) {
            if !device.is_empty() && !ids.iter().any(|id| id == device) {
                ids.insert(0, device.to_string());
            }
        }
        Ok(ids)
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        let mut output_sizes = OUTPUT_SIZES.to_vec();
        let desired = self.config.desired_size();
        if !output_sizes.contains(&desired) {
            output_sizes.push(desired);
        }
        Ok(CameraCharacteristics {
            id: camera_id.to_string(),
            facing: Facing::External,
            sensor_orientation: 0,
            output_sizes,
        })
    }

    fn open_camera(&self, camera_id: &str, events: DeviceEventSender) -> Result<(), CameraError> {
        let device = FfmpegDevice {
            id: camera_id.to_string(),
            fps: self.config.fps,
            diagnostics: self.config.diagnostics,
            receivers: Arc::clone(&self.receivers),
        };
        if !events.send(DeviceEvent::Opened(Box::new(device))) {
            return Err(CameraError::Closed);
        }
        Ok(())
    }

    fn create_image_receiver(
        &self,
        size: Size,
        _max_images: usize,
        listener: ImageListener,
    ) -> Result<Box<dyn ImageReceiver>, CameraError> {
        if size.is_empty() || size.width % 2 != 0 || size.height % 2 != 0 {
            return Err(CameraError::invalid_config(format!(
                "image size {size} must have even dimensions"
            )));
        }
        let window = NativeWindow(self.next_window.fetch_add(1, Ordering::Relaxed));
        self.receivers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(window, (size, listener));
        Ok(Box::new(FfmpegImageReceiver {
            window,
            receivers: Arc::clone(&self.receivers),
        }))
    }
}

struct FfmpegImageReceiver {
    window: NativeWindow,
    receivers: Receivers,
}

impl ImageReceiver for FfmpegImageReceiver {
    fn window(&self) -> NativeWindow {
        self.window
    }

    fn close(&mut self) {
        self.receivers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.window);
    }
}

impl Drop for FfmpegImageReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

struct FfmpegDevice {
    id: String,
    fps: f64,
    diagnostics: bool,
    receivers: Receivers,
}

impl CameraDevice for FfmpegDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: &[NativeWindow],
        events: DeviceEventSender,
    ) -> Result<(), CameraError> {
        if outputs.is_empty() {
            return Err(CameraError::invalid_config("capture session needs an output"));
        }
        let session = FfmpegSession {
            device: self.id.clone(),
            fps: self.fps,
            diagnostics: self.diagnostics,
            receivers: Arc::clone(&self.receivers),
            child: None,
            stop: Arc::new(AtomicBool::new(false)),
            reader_join: None,
        };
        events.send(DeviceEvent::SessionConfigured(Box::new(session)));
        Ok(())
    }

    fn close(&mut self) {}
}

struct FfmpegSession {
    device: String,
    fps: f64,
    diagnostics: bool,
    receivers: Receivers,
    child: Option<Child>,
    stop: Arc<AtomicBool>,
    reader_join: Option<JoinHandle<()>>,
}

impl FfmpegSession {
    #[inline]
    fn now_ns_best_effort() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }

    fn stop_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            {
                unsafe {
                    let _ = libc::kill(child.id() as i32, libc::SIGTERM);
                }
                let start = std::time::Instant::now();
                while start.elapsed() < Duration::from_millis(900) {
                    if let Ok(Some(_)) = child.try_wait() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl CaptureSession for FfmpegSession {
    fn set_repeating_request(&mut self, targets: &[NativeWindow]) -> Result<(), CameraError> {
        self.stop_repeating()?;

        let size = {
            let receivers = self.receivers.lock().unwrap_or_else(|p| p.into_inner());
            targets
                .iter()
                .find_map(|window| receivers.get(window).map(|(size, _)| *size))
                .ok_or_else(|| CameraError::invalid_config("no image receiver among targets"))?
        };
        let targets = targets.to_vec();

        self.stop.store(false, Ordering::Relaxed);
        let mut child = spawn_reader(&self.device, size, self.fps, self.diagnostics)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::other("ffmpeg stdout not piped"))?;

        let frame_len = size.yuv420_len();
        let stop = Arc::clone(&self.stop);
        let receivers = Arc::clone(&self.receivers);

        let join = std::thread::Builder::new()
            .name("ffmpeg-reader".into())
            .spawn(move || {
                let mut reader = std::io::BufReader::new(stdout);
                while !stop.load(Ordering::Relaxed) {
                    let mut buf = vec![0u8; frame_len];
                    match reader.read_exact(&mut buf) {
                        Ok(()) => {
                            let ts = FfmpegSession::now_ns_best_effort();
                            let listeners: Vec<ImageListener> = {
                                let receivers = receivers.lock().unwrap_or_else(|p| p.into_inner());
                                targets
                                    .iter()
                                    .filter_map(|w| receivers.get(w))
                                    .filter(|(s, _)| *s == size)
                                    .map(|(_, l)| Arc::clone(l))
                                    .collect()
                            };
                            let Ok(image) = PlanarImage::i420(buf, size, ts) else {
                                continue;
                            };
                            for listener in listeners {
                                (listener)(Box::new(image.clone()));
                            }
                        },
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(e) => {
                            tracing::error!(target: "atalk_camera_module", err = %e, "ffmpeg read failed");
                            break;
                        },
                    }
                }
            })
            .map_err(|e| CameraError::driver("spawning ffmpeg reader", e))?;

        self.reader_join = Some(join);
        self.child = Some(child);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), CameraError> {
        self.stop.store(true, Ordering::Relaxed);
        self.stop_child();
        if let Some(j) = self.reader_join.take() {
            let _ = j.join();
        }
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stop_repeating();
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Command-line arguments reading `device` as raw `yuv420p` frames of `size`.
pub fn ffmpeg_args(device: &str, size: Size, fps: f64) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        ffmpeg_format().into(),
    ];
    if fps > 0.0 {
        args.push("-framerate".into());
        args.push(format!("{fps}"));
    }
    args.extend([
        "-i".into(),
        get_input_device(device.trim()),
        "-vf".into(),
        format!("scale={}:{}", size.width, size.height),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-f".into(),
        "rawvideo".into(),
        "pipe:1".into(),
    ]);
    args
}

fn spawn_reader(device: &str, size: Size, fps: f64, diagnostics: bool) -> Result<Child, CameraError> {
    let args = ffmpeg_args(device, size, fps);
    tracing::debug!(target: "atalk_camera_module", ?args, "spawning ffmpeg");

    let stderr = if diagnostics || env::var_os("ATALK_CAMERA_FFMPEG_STDERR").is_some() {
        Stdio::inherit()
    } else {
        Stdio::null()
    };

    Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(stderr)
        .spawn()
        .map_err(|e| CameraError::driver("spawning ffmpeg", e))
}

#[cfg(target_os = "macos")]
fn ffmpeg_format() -> &'static str {
    "avfoundation"
}

#[cfg(target_os = "windows")]
fn ffmpeg_format() -> &'static str {
    "dshow"
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn ffmpeg_format() -> &'static str {
    "v4l2"
}

#[cfg(target_os = "macos")]
fn get_input_device(device: &str) -> String {
    device.strip_prefix("avf:").unwrap_or(device).to_string()
}

#[cfg(target_os = "windows")]
fn get_input_device(device: &str) -> String {
    device.strip_prefix("dshow:").unwrap_or(device).to_string()
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn get_input_device(device: &str) -> String {
    let d = device.strip_prefix("file:").unwrap_or(device);
    if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{d}")
    } else {
        d.to_string()
    }
}

#[cfg(target_os = "linux")]
fn list_video_devices() -> Result<Vec<String>, CameraError> {
    use std::{fs, path::Path};

    let base = Path::new("/sys/class/video4linux");
    let Ok(entries) = fs::read_dir(base) else {
        return Ok(Vec::new());
    };

    let mut indexes: Vec<u32> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str()?.strip_prefix("video")?.parse().ok())
        .collect();
    indexes.sort_unstable();

    Ok(indexes
        .into_iter()
        .map(|idx| format!("/dev/video{idx}"))
        .filter(|node| Path::new(node).exists())
        .collect())
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn list_video_devices() -> Result<Vec<String>, CameraError> {
    #[cfg(target_os = "macos")]
    let (dummy, prefix) = ("", "avf:");
    #[cfg(target_os = "windows")]
    let (dummy, prefix) = ("dummy", "dshow:video=");

    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-f", ffmpeg_format(), "-list_devices", "true", "-i", dummy])
        .output()
        .map_err(|e| CameraError::driver("running ffmpeg -list_devices", e))?;
    let listing = String::from_utf8_lossy(&out.stderr);
    Ok(parse_device_listing(&listing)
        .into_iter()
        .map(|name| format!("{prefix}{name}"))
        .collect())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn list_video_devices() -> Result<Vec<String>, CameraError> {
    Ok(Vec::new())
}

/// Extracts video device names from `ffmpeg -list_devices` output.
///
/// AVFoundation lines look like `[...] [0] FaceTime HD Camera` and are
/// reported by index; DirectShow lines carry the quoted device name.
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn parse_device_listing(listing: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_video = false;
    for line in listing.lines() {
        if line.contains("video devices") {
            in_video = true;
            continue;
        }
        if line.contains("audio devices") {
            in_video = false;
            continue;
        }
        if !in_video {
            continue;
        }
        if let Some(pos) = line.find("] [") {
            let tail = &line[pos + 2..];
            if let Some(end) = tail.find(']') {
                if tail[1..end].trim().parse::<u32>().is_ok() {
                    out.push(tail[1..end].trim().to_string());
                }
            }
        } else if let Some(start) = line.find('"') {
            let rest = &line[start + 1..];
            if let Some(end) = rest.find('"') {
                if end > 0 && !line.contains("Alternative name") {
                    out.push(rest[..end].to_string());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_request_raw_yuv420p_at_size() {
        let args = ffmpeg_args("/dev/video2", Size::new(1280, 720), 30.0);
        let joined = args.join(" ");
        assert!(joined.contains("-vf scale=1280:720"));
        assert!(joined.contains("-pix_fmt yuv420p -f rawvideo pipe:1"));
        assert!(joined.contains("-framerate 30"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn numeric_devices_map_to_device_nodes() {
        assert_eq!(get_input_device("3"), "/dev/video3");
        assert_eq!(get_input_device("file:/dev/video1"), "/dev/video1");
    }

    #[test]
    fn parses_avfoundation_and_dshow_listings() {
        let avf = "\
[AVFoundation indev @ 0x1] AVFoundation video devices:
[AVFoundation indev @ 0x1] [0] FaceTime HD Camera
[AVFoundation indev @ 0x1] [1] Capture screen 0
[AVFoundation indev @ 0x1] AVFoundation audio devices:
[AVFoundation indev @ 0x1] [0] Built-in Microphone
";
        assert_eq!(parse_device_listing(avf), vec!["0", "1"]);

        let dshow = "\
[dshow @ 0x1] DirectShow video devices (some may be both video and audio devices)
[dshow @ 0x1]  \"USB Camera\"
[dshow @ 0x1]     Alternative name \"@device_pnp_\\\\?\\usb\"
[dshow @ 0x1] DirectShow audio devices
[dshow @ 0x1]  \"Microphone\"
";
        assert_eq!(parse_device_listing(dshow), vec!["USB Camera"]);
    }

    #[test]
    fn characteristics_offer_requested_size() {
        let manager = FfmpegCameraManager::new(StreamConfig::new(800, 600, 15.0));
        let characteristics = manager.characteristics("/dev/video0").unwrap();
        assert!(characteristics.output_sizes.contains(&Size::new(800, 600)));
        assert_eq!(characteristics.facing, Facing::External);
    }
}
