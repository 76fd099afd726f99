// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("atalk-camera-reader requires the 'std' feature");

use atalk_camera_module::{
    cli::{self, handle_error, info_user, parse_dimensions, parse_frequency, parse_rotation},
    shared::{
        Buffer, CameraError, CameraEvent, CameraStream, FixedDisplay, PreviewStream, Rotation,
        Size, StreamConfig, open_platform,
    },
};
use asimov_module::SysexitsError::{self, *};
use clap::Parser;
use clientele::StandardOptions;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde_json::json;
use std::{
    error::Error as StdError,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Camera to open; the first one listed when omitted.
    #[arg(long)]
    device: Option<String>,

    #[arg(short, long = "size", value_parser = parse_dimensions, default_value = "640x480")]
    size: (u32, u32),

    #[arg(short, long, value_parser = parse_frequency, default_value = "30")]
    frequency: f64,

    /// Display rotation the frames are oriented for.
    #[arg(short, long, value_parser = parse_rotation, default_value = "0")]
    rotation: Rotation,

    /// Skips frames whose luma hash differs by less than this many bits.
    #[clap(short = 'D', long, action = clap::ArgAction::Count)]
    debounce: u8,

    /// Stops after this many frames.
    #[arg(short = 'n', long)]
    count: Option<u64>,
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    #[cfg(feature = "tracing")]
    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_reader(&options) {
        Ok(()) => EX_OK,
        Err(err) => handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_reader(opts: &Options) -> Result<(), CameraError> {
    info_user(&opts.flags, "starting camera reader");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit2 = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit2.store(true, Ordering::SeqCst);
        })
        .map_err(|e| CameraError::driver("installing the Ctrl-C handler", e))?;
    }

    let (width, height) = opts.size;
    let mut config = StreamConfig::new(width, height, opts.frequency)
        .with_diagnostics(opts.flags.debug || opts.flags.verbose >= 3);
    if let Some(device) = &opts.device {
        config = config.with_device(device.clone());
    }

    let manager = open_platform(&config)?;
    let display = Arc::new(FixedDisplay::new(opts.rotation, opts.rotation.degrees() % 180 == 90));
    let mut stream = PreviewStream::new(manager, display, config);

    stream.start()?;
    let result = read_frames(&mut stream, opts, &quit);
    if let Err(err) = stream.stop() {
        cli::warn_user_with_error(&opts.flags, "camera did not stop cleanly", &err);
    }
    result
}

fn read_frames(stream: &mut PreviewStream, opts: &Options, quit: &AtomicBool) -> Result<(), CameraError> {
    let min_interval = Duration::from_secs_f64(1.0 / opts.frequency);
    let hasher = (opts.debounce > 0)
        .then(|| HasherConfig::new().hash_alg(HashAlg::Gradient).to_hasher());
    let mut last_hash: Option<ImageHash> = None;
    let mut last_emit: Option<Instant> = None;
    let mut emitted = 0u64;
    let mut buffer = Buffer::new();

    while !quit.load(Ordering::SeqCst) {
        report_events(stream, opts)?;

        stream.read(&mut buffer)?;
        if buffer.is_discarded() {
            continue;
        }
        let Some(format) = buffer.format else {
            continue;
        };

        let now = Instant::now();
        if last_emit.is_some_and(|last| now.duration_since(last) < min_interval) {
            continue;
        }

        if let (Some(hasher), Some(luma)) = (&hasher, buffer.bytes().and_then(|b| luma_image(b, format.size))) {
            let hash = hasher.hash_image(&luma);
            if last_hash
                .as_ref()
                .is_some_and(|prev| hash.dist(prev) < opts.debounce as u32)
            {
                continue;
            }
            last_hash = Some(hash);
        }
        last_emit = Some(now);

        let params = stream.base().preview_params();
        let record = json!({
            "sequence": buffer.sequence,
            "width": format.size.width,
            "height": format.size.height,
            "format": format.pixel_format.to_string(),
            "timestamp_ns": buffer.timestamp_ns,
            "rotation": params.orientation.degrees,
            "swap": params.orientation.swap,
            "flip": params.orientation.flip,
            "discard": buffer.is_discarded(),
            "bytes": buffer.bytes().map_or(0, <[u8]>::len),
        });

        let mut out = io::stdout().lock();
        if let Err(err) = writeln!(&mut out, "{record}") {
            if err.kind() == io::ErrorKind::BrokenPipe {
                break;
            }
            return Err(CameraError::driver("writing frame record", err));
        }

        emitted += 1;
        if opts.count.is_some_and(|count| emitted >= count) {
            break;
        }
    }
    Ok(())
}

/// Surfaces stream notifications; a camera failure ends the run.
fn report_events(stream: &PreviewStream, opts: &Options) -> Result<(), CameraError> {
    for event in stream.base().events().try_iter() {
        match event {
            CameraEvent::Opened { camera, size, .. } => {
                info_user(&opts.flags, &format!("camera {camera} opened at {size}"));
            },
            CameraEvent::FrameDropped { .. } => {
                #[cfg(feature = "tracing")]
                asimov_module::tracing::trace!(target: "atalk_camera_module", "frame dropped");
            },
            CameraEvent::Error { error, .. } => return Err(error),
            CameraEvent::Configured { .. } | CameraEvent::Closed { .. } => {},
        }
    }
    Ok(())
}

/// The Y plane of a packed I420 frame as a grayscale image.
fn luma_image(i420: &[u8], size: Size) -> Option<image::DynamicImage> {
    let luma = i420.get(..size.pixels())?.to_vec();
    image::GrayImage::from_raw(size.width, size.height, luma).map(image::DynamicImage::ImageLuma8)
}
