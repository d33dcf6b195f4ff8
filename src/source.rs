//! Frame source interface.
//!
//! A [`FrameSource`] yields one raw, tightly packed planar payload per frame
//! index. The pipeline only ever asks for frames in increasing order, so
//! implementations may optimise for sequential access, but any index below
//! [`VideoInfo::frame_count`] must be accepted.

use std::path::Path;

use crate::error::FramePipeError;
use crate::metadata::VideoInfo;
use crate::y4m::Y4mSource;

/// A producer of raw video frames.
///
/// Dropping the source releases it.
pub trait FrameSource {
    /// Description of the frames this source produces.
    fn info(&self) -> &VideoInfo;

    /// Produce the payload of frame `index`.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::SourceRead`] when the frame cannot be
    /// produced.
    fn frame(&mut self, index: u64) -> Result<Vec<u8>, FramePipeError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &VideoInfo {
        (**self).info()
    }

    fn frame(&mut self, index: u64) -> Result<Vec<u8>, FramePipeError> {
        (**self).frame(index)
    }
}

/// Open the source best suited to `path`.
///
/// `.y4m` files are read directly. Anything else is decoded through FFmpeg
/// when the `ffmpeg` feature is enabled.
///
/// # Errors
///
/// Returns [`FramePipeError::SourceOpen`] if no source can handle the file
/// or the file cannot be opened.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, FramePipeError> {
    let is_y4m = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("y4m"));

    if is_y4m {
        return Ok(Box::new(Y4mSource::open(path)?));
    }

    #[cfg(feature = "ffmpeg")]
    {
        Ok(Box::new(crate::ffmpeg_source::FfmpegSource::open(path)?))
    }

    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(FramePipeError::SourceOpen {
            path: path.to_path_buf(),
            reason: "only .y4m input is supported without the `ffmpeg` feature".to_string(),
        })
    }
}
