// This is free and unencumbered software released into the public domain.

//! CLI helpers (error reporting, verbosity handling, option parsing).

use crate::shared::{CameraError, Rotation};
use asimov_module::SysexitsError::{self, *};
use clientele::StandardOptions;

pub fn handle_error(err: &CameraError, flags: &StandardOptions) -> SysexitsError {
    #[cfg(feature = "tracing")]
    {
        use asimov_module::tracing::{debug, error};

        error!(target: "atalk_camera_module", %err, "camera command failed");

        if flags.debug || flags.verbose >= 2 {
            debug!(target: "atalk_camera_module", ?err, "detailed error");
        }
    }

    report_error(err, flags);
    map_error_to_sysexit(err)
}

pub fn info_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("INFO: {msg}");
    }

    #[cfg(feature = "tracing")]
    asimov_module::tracing::info!(target: "atalk_camera_module", "{msg}");
}

pub fn warn_user(flags: &StandardOptions, msg: &str) {
    if flags.debug || flags.verbose >= 1 {
        eprintln!("WARN: {msg}");
    }

    #[cfg(feature = "tracing")]
    asimov_module::tracing::warn!(target: "atalk_camera_module", "{msg}");
}

pub fn warn_user_with_error(flags: &StandardOptions, msg: &str, error: &dyn std::error::Error) {
    if flags.debug || flags.verbose >= 2 {
        eprintln!("WARN: {msg}: {error}");
    } else if flags.verbose >= 1 {
        eprintln!("WARN: {msg}");
    }

    #[cfg(feature = "tracing")]
    asimov_module::tracing::warn!(target: "atalk_camera_module", error = %error, "{msg}");
}

fn report_error(err: &CameraError, flags: &StandardOptions) {
    use std::{error::Error as _, io::Write};

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "ERROR: {err}");

    if flags.debug || flags.verbose >= 2 {
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = writeln!(stderr, "  Caused by: {cause}");
            source = cause.source();
        }
    }
}

pub fn map_error_to_sysexit(err: &CameraError) -> SysexitsError {
    match err {
        CameraError::NoDriver => EX_UNAVAILABLE,
        CameraError::NoCamera => EX_USAGE,
        CameraError::NotConfigured => EX_CONFIG,
        CameraError::InvalidConfig(_) => EX_USAGE,
        CameraError::Unsupported(_) => EX_UNAVAILABLE,
        CameraError::NoSuitableSize { .. } => EX_USAGE,
        CameraError::CameraBusy { .. } => EX_TEMPFAIL,
        CameraError::Device { .. } => EX_UNAVAILABLE,
        CameraError::Closed => EX_IOERR,
        CameraError::Gl(_) | CameraError::Provider(_) | CameraError::Transform(_) => EX_SOFTWARE,
        CameraError::DriverError { .. } => EX_SOFTWARE,
        CameraError::Other(_) => EX_SOFTWARE,
    }
}

pub fn parse_dimensions(s: &str) -> Result<(u32, u32), String> {
    let s = s.trim().replace('×', "x");
    let parts: Vec<&str> = s.split('x').map(str::trim).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(format!("Invalid format '{s}'. Use WxH (e.g., 1280x720)"));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid width: {}", parts[0]))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid height: {}", parts[1]))?;

    if !(160..=7680).contains(&width) {
        return Err(format!("Width {width} is out of reasonable range (160-7680)"));
    }
    if !(120..=4320).contains(&height) {
        return Err(format!("Height {height} is out of reasonable range (120-4320)"));
    }
    // I420 chroma planes are subsampled by two in both directions.
    if width % 2 != 0 || height % 2 != 0 {
        return Err(format!("Dimensions {width}x{height} must both be even"));
    }

    Ok((width, height))
}

pub fn parse_frequency(s: &str) -> Result<f64, String> {
    let freq: f64 = s.parse().map_err(|_| format!("Invalid frequency: {s}"))?;

    if freq <= 0.0 {
        return Err("Frequency must be positive".to_string());
    }
    if freq > 240.0 {
        return Err(format!("Frequency {freq} Hz exceeds reasonable maximum (240 Hz)"));
    }
    if freq < 0.1 {
        return Err(format!("Frequency {freq} Hz is below reasonable minimum (0.1 Hz)"));
    }

    Ok(freq)
}

/// Display rotation in degrees; only quarter turns are accepted.
pub fn parse_rotation(s: &str) -> Result<Rotation, String> {
    let degrees: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid rotation: {s}"))?;
    match degrees {
        0 | 90 | 180 | 270 => Ok(Rotation::from_degrees(degrees)),
        _ => Err(format!("Rotation {degrees} must be one of 0, 90, 180, 270")),
    }
}
