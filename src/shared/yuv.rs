// This is free and unencumbered software released into the public domain.

//! Plane-aware rotation of YUV 4:2:0 camera images into packed I420.
//!
//! The transform walks the output frame and, for every output sample, looks
//! up the matching input sample. The four remaps are:
//!
//! | swap | flip | effect |
//! |------|------|--------|
//! | no   | no   | copy |
//! | no   | yes  | half turn |
//! | yes  | no   | quarter turn clockwise |
//! | yes  | yes  | quarter turn counter-clockwise |
//!
//! Swap and flip combined are a single index transform, so no intermediate
//! frame is needed. Chroma is sampled once per 2x2 luma block through the
//! chroma plane's own strides.

use super::{Size, TransformError};

/// One image plane as delivered by the camera.
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub const fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    fn check(&self, plane: &'static str, width: usize, height: usize) -> Result<(), TransformError> {
        if self.pixel_stride == 0 {
            return Err(TransformError::PixelStride { plane });
        }
        let needed = (height - 1) * self.row_stride + (width - 1) * self.pixel_stride + 1;
        if needed > self.data.len() {
            return Err(TransformError::PlaneBounds {
                plane,
                needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }
}

/// The Y, U and V planes of one YUV 4:2:0 image.
#[derive(Clone, Copy, Debug)]
pub struct YuvPlanes<'a> {
    pub y: Plane<'a>,
    pub u: Plane<'a>,
    pub v: Plane<'a>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Remap {
    Identity,
    Flip,
    Swap,
    SwapFlip,
}

impl Remap {
    const fn new(swap: bool, flip: bool) -> Self {
        match (swap, flip) {
            (false, false) => Self::Identity,
            (false, true) => Self::Flip,
            (true, false) => Self::Swap,
            (true, true) => Self::SwapFlip,
        }
    }

    /// Input coordinate feeding output `(x, y)` of a `w`x`h` output grid.
    #[inline]
    const fn source(self, x: usize, y: usize, w: usize, h: usize) -> (usize, usize) {
        match self {
            Self::Identity => (x, y),
            Self::Flip => (w - 1 - x, h - 1 - y),
            Self::Swap => (y, w - 1 - x),
            Self::SwapFlip => (h - 1 - y, x),
        }
    }
}

/// Remaps `src` into `dst` as packed I420 (Y, then U, then V) of size `out`.
///
/// `out` is the post-rotation size; with `swap` the input image is expected
/// to be `out` transposed. `dst` must be exactly `out.yuv420_len()` bytes.
/// Every plane is bounds-checked before the first byte is written.
pub fn yuv420_planar_rotate(
    src: &YuvPlanes<'_>,
    dst: &mut [u8],
    out: Size,
    swap: bool,
    flip: bool,
) -> Result<(), TransformError> {
    if out.is_empty() || out.width % 2 != 0 || out.height % 2 != 0 {
        return Err(TransformError::Dimensions(out));
    }
    let expected = out.yuv420_len();
    if dst.len() != expected {
        return Err(TransformError::OutputLength {
            expected,
            actual: dst.len(),
        });
    }

    let (w, h) = (out.width as usize, out.height as usize);
    let (cw, ch) = (w / 2, h / 2);
    let (in_w, in_h) = if swap { (h, w) } else { (w, h) };
    src.y.check("Y", in_w, in_h)?;
    src.u.check("U", in_w / 2, in_h / 2)?;
    src.v.check("V", in_w / 2, in_h / 2)?;

    let remap = Remap::new(swap, flip);
    let (luma, chroma) = dst.split_at_mut(w * h);
    let (u_out, v_out) = chroma.split_at_mut(cw * ch);

    for (y, row) in luma.chunks_exact_mut(w).enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            let (sx, sy) = remap.source(x, y, w, h);
            *px = src.y.sample(sx, sy);
        }
    }

    for y in 0..ch {
        for x in 0..cw {
            let (sx, sy) = remap.source(x, y, cw, ch);
            let i = y * cw + x;
            u_out[i] = src.u.sample(sx, sy);
            v_out[i] = src.v.sample(sx, sy);
        }
    }

    Ok(())
}
