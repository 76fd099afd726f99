// This is free and unencumbered software released into the public domain.

use derive_more::Display;

/// Relative aspect-ratio tolerance of the first phase of [`select_preview_size`].
pub const ASPECT_TOLERANCE: f64 = 0.05;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
#[display("{width}x{height}")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub const fn pixels(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of one 12-bit-per-pixel planar YUV 4:2:0 frame.
    pub const fn yuv420_len(self) -> usize {
        self.pixels() * 12 / 8
    }
}

/// Display rotation reported by the window manager.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    #[display("0")]
    Rotation0,
    #[display("90")]
    Rotation90,
    #[display("180")]
    Rotation180,
    #[display("270")]
    Rotation270,
}

impl Rotation {
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 90,
            Self::Rotation180 => 180,
            Self::Rotation270 => 270,
        }
    }

    /// Snaps any angle to the nearest quarter turn.
    pub const fn from_degrees(degrees: u32) -> Self {
        match ((degrees % 360 + 45) % 360) / 90 {
            0 => Self::Rotation0,
            1 => Self::Rotation90,
            2 => Self::Rotation180,
            _ => Self::Rotation270,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Facing {
    #[display("front")]
    Front,
    #[default]
    #[display("back")]
    Back,
    #[display("external")]
    External,
}

impl Facing {
    pub const fn is_front(self) -> bool {
        matches!(self, Self::Front)
    }
}

/// Picks the supported size closest to `desired`.
///
/// Candidates whose aspect ratio is within [`ASPECT_TOLERANCE`] of the
/// desired one are preferred, and among them the one with the closest
/// height wins. When no candidate matches the ratio band, the closest height
/// over all candidates is taken. Equally close candidates resolve to the
/// larger one, so the order of `supported` does not matter.
pub fn select_preview_size(supported: &[Size], desired: Size) -> Option<Size> {
    let target_ratio = desired.aspect_ratio();
    let within_band = |size: &&Size| {
        let ratio = size.aspect_ratio();
        target_ratio > 0.0 && ((ratio - target_ratio) / target_ratio).abs() <= ASPECT_TOLERANCE
    };

    closest_height(supported.iter().filter(within_band), desired.height)
        .or_else(|| closest_height(supported.iter(), desired.height))
}

fn closest_height<'a>(candidates: impl Iterator<Item = &'a Size>, height: u32) -> Option<Size> {
    let mut best: Option<Size> = None;
    for size in candidates.filter(|s| !s.is_empty()) {
        let better = match best {
            None => true,
            Some(b) => {
                let (d, bd) = (size.height.abs_diff(height), b.height.abs_diff(height));
                d < bd || (d == bd && (size.height, size.pixels()) > (b.height, b.pixels()))
            },
        };
        if better {
            best = Some(*size);
        }
    }
    best
}
