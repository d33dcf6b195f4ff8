//! Source description types.
//!
//! [`VideoInfo`] is produced once when a [`FrameSource`](crate::FrameSource)
//! is opened and never changes afterwards. The planner, the command builder
//! and the pipe writers only read it.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Planar pixel layout of the raw payloads a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// 4:2:0 planar (Y, U, V), chroma halved in both directions.
    #[default]
    I420,
    /// 4:2:2 planar, chroma halved horizontally.
    I422,
    /// 4:4:4 planar, full-resolution chroma.
    I444,
    /// Luma only.
    Gray,
}

impl ColorSpace {
    /// The `--input-csp` value x264 expects for this layout.
    pub fn encoder_name(self) -> &'static str {
        match self {
            ColorSpace::I420 => "i420",
            ColorSpace::I422 => "i422",
            ColorSpace::I444 => "i444",
            ColorSpace::Gray => "i400",
        }
    }

    /// Chroma plane dimensions for a frame of `width` × `height`.
    ///
    /// Returns `None` for layouts without chroma planes.
    pub fn chroma_dimensions(self, width: u32, height: u32) -> Option<(u32, u32)> {
        match self {
            ColorSpace::I420 => Some((width.div_ceil(2), height.div_ceil(2))),
            ColorSpace::I422 => Some((width.div_ceil(2), height)),
            ColorSpace::I444 => Some((width, height)),
            ColorSpace::Gray => None,
        }
    }
}

impl Display for ColorSpace {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.encoder_name())
    }
}

/// Field order of the source material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    /// Progressive frames, or unknown.
    #[default]
    Progressive,
    /// Interlaced, top field first.
    TopFieldFirst,
    /// Interlaced, bottom field first.
    BottomFieldFirst,
}

/// Immutable description of an opened frame source.
///
/// # Example
///
/// ```
/// use framepipe::{ColorSpace, VideoInfo};
///
/// let info = VideoInfo::new(1920, 1080, (24000, 1001), 1000);
/// assert_eq!(info.color_space, ColorSpace::I420);
/// assert_eq!(info.frame_size(), 1920 * 1080 * 3 / 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate numerator.
    pub fps_numerator: u32,
    /// Frame rate denominator.
    pub fps_denominator: u32,
    /// Pixel layout of each payload.
    pub color_space: ColorSpace,
    /// Bits per sample (8 for the common case; 9–16 use two bytes per sample).
    pub bit_depth: u8,
    /// Field order reported by the source.
    pub field_order: FieldOrder,
    /// Sample aspect ratio, when the source declares one.
    pub sample_aspect_ratio: Option<(u32, u32)>,
    /// Total number of frames the source can produce.
    pub frame_count: u64,
}

impl VideoInfo {
    /// Describe an 8-bit progressive I420 source.
    pub fn new(width: u32, height: u32, fps: (u32, u32), frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps_numerator: fps.0,
            fps_denominator: fps.1,
            color_space: ColorSpace::I420,
            bit_depth: 8,
            field_order: FieldOrder::Progressive,
            sample_aspect_ratio: None,
            frame_count,
        }
    }

    /// Bytes per sample: 1 for 8-bit content, 2 above that.
    pub fn bytes_per_sample(&self) -> usize {
        if self.bit_depth > 8 { 2 } else { 1 }
    }

    /// Size in bytes of one raw frame payload.
    ///
    /// Saturates at `usize::MAX` for dimensions no real frame has; sources
    /// reject those up front through [`checked_frame_size`](Self::checked_frame_size).
    pub fn frame_size(&self) -> usize {
        self.checked_frame_size().unwrap_or(usize::MAX)
    }

    /// Size in bytes of one raw frame payload, or `None` if it overflows.
    pub fn checked_frame_size(&self) -> Option<usize> {
        let luma = (self.width as usize).checked_mul(self.height as usize)?;
        let chroma = match self.color_space.chroma_dimensions(self.width, self.height) {
            Some((w, h)) => (w as usize).checked_mul(h as usize)?.checked_mul(2)?,
            None => 0,
        };
        luma.checked_add(chroma)?.checked_mul(self.bytes_per_sample())
    }

    /// Frames per second as a float, `0.0` when the rate is unknown.
    pub fn frames_per_second(&self) -> f64 {
        if self.fps_denominator == 0 {
            0.0
        } else {
            f64::from(self.fps_numerator) / f64::from(self.fps_denominator)
        }
    }
}
