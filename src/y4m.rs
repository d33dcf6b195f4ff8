//! YUV4MPEG2 (`.y4m`) frame source.
//!
//! A y4m file is a one-line stream header followed by frames, each introduced
//! by a `FRAME` line and followed by the raw planar payload. The header fully
//! determines the payload size, so [`Y4mSource::open`] indexes every frame's
//! byte offset up front (one seek per frame, no payload reads) and
//! [`FrameSource::frame`] is then a single seek plus read.
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{FrameSource, Y4mSource};
//!
//! let mut source = Y4mSource::open("clip.y4m")?;
//! println!("{} frames", source.info().frame_count);
//! let first = source.frame(0)?;
//! assert_eq!(first.len(), source.info().frame_size());
//! # Ok::<(), framepipe::FramePipeError>(())
//! ```

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::error::FramePipeError;
use crate::metadata::{ColorSpace, FieldOrder, VideoInfo};
use crate::source::FrameSource;

const STREAM_MAGIC: &[u8] = b"YUV4MPEG2";
const FRAME_MAGIC: &[u8] = b"FRAME";
/// Upper bound for header and `FRAME` lines.
const MAX_LINE_LEN: u64 = 4096;

/// Frame source reading a YUV4MPEG2 file.
#[derive(Debug)]
pub struct Y4mSource {
    reader: BufReader<File>,
    info: VideoInfo,
    /// Byte offset of each frame's payload.
    frame_offsets: Vec<u64>,
    path: PathBuf,
}

impl Y4mSource {
    /// Open and index a y4m file.
    ///
    /// A trailing frame cut short by the end of the file is ignored with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::SourceOpen`] if the file cannot be read or
    /// its header is not a supported YUV4MPEG2 header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramePipeError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |reason: String| FramePipeError::SourceOpen {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening y4m source: {}", path.display());

        let file = File::open(&path).map_err(|error| open_error(error.to_string()))?;
        let file_len = file
            .metadata()
            .map_err(|error| open_error(error.to_string()))?
            .len();
        let mut reader = BufReader::new(file);

        let header = read_line(&mut reader).map_err(|error| open_error(error.to_string()))?;
        if !header.ends_with(b"\n") {
            return Err(open_error("missing or truncated stream header".to_string()));
        }
        let mut info = parse_stream_header(&header).map_err(open_error)?;
        let frame_size = info
            .checked_frame_size()
            .and_then(|size| u64::try_from(size).ok())
            .ok_or_else(|| open_error("frame size overflows".to_string()))?;
        if frame_size == 0 {
            return Err(open_error("stream header declares empty frames".to_string()));
        }

        let mut frame_offsets = Vec::new();
        let mut position = header.len() as u64;
        loop {
            let line = read_line(&mut reader).map_err(|error| open_error(error.to_string()))?;
            if line.is_empty() {
                break;
            }
            if !line.starts_with(FRAME_MAGIC) {
                return Err(open_error(format!(
                    "expected FRAME marker at byte {position}"
                )));
            }
            let payload_offset = position + line.len() as u64;
            let payload_end = payload_offset
                .checked_add(frame_size)
                .filter(|end| *end <= file_len && line.ends_with(b"\n"));
            let Some(payload_end) = payload_end else {
                log::warn!(
                    "Ignoring truncated frame {} at the end of {}",
                    frame_offsets.len(),
                    path.display()
                );
                break;
            };
            frame_offsets.push(payload_offset);
            position = payload_end;
            reader
                .seek(SeekFrom::Start(position))
                .map_err(|error| open_error(error.to_string()))?;
        }

        info.frame_count = frame_offsets.len() as u64;
        log::debug!(
            "Indexed {} frame(s) of {}x{} {} from {}",
            info.frame_count,
            info.width,
            info.height,
            info.color_space,
            path.display()
        );

        Ok(Self {
            reader,
            info,
            frame_offsets,
            path,
        })
    }

    /// Path of the opened file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for Y4mSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame(&mut self, index: u64) -> Result<Vec<u8>, FramePipeError> {
        let read_error = |reason: String| FramePipeError::SourceRead {
            frame_number: index,
            reason,
        };

        let offset = usize::try_from(index)
            .ok()
            .and_then(|slot| self.frame_offsets.get(slot))
            .copied()
            .ok_or_else(|| {
                read_error(format!(
                    "out of range (source has {} frames)",
                    self.info.frame_count
                ))
            })?;

        let mut payload = vec![0u8; self.info.frame_size()];
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut payload))
            .map_err(|error| read_error(error.to_string()))?;
        Ok(payload)
    }
}

/// Read up to and including the next `\n`, bounded by [`MAX_LINE_LEN`].
fn read_line(reader: &mut BufReader<File>) -> std::io::Result<Vec<u8>> {
    let mut line = Vec::new();
    reader.by_ref().take(MAX_LINE_LEN).read_until(b'\n', &mut line)?;
    Ok(line)
}

/// Parse a `YUV4MPEG2 ...` stream header line.
///
/// The returned [`VideoInfo`] has `frame_count` set to zero.
pub(crate) fn parse_stream_header(line: &[u8]) -> Result<VideoInfo, String> {
    let line = std::str::from_utf8(line)
        .map_err(|_| "stream header is not valid ASCII".to_string())?
        .trim_end_matches(['\n', '\r']);
    let mut tokens = line.split(' ').filter(|token| !token.is_empty());

    if tokens.next().map(str::as_bytes) != Some(STREAM_MAGIC) {
        return Err("not a YUV4MPEG2 stream".to_string());
    }

    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut info = VideoInfo::new(0, 0, (0, 0), 0);

    for token in tokens {
        let Some(tag) = token.get(..1) else {
            return Err(format!("malformed header token {token:?}"));
        };
        let value = &token[1..];
        match tag {
            "W" => width = Some(parse_number(value, "width")?),
            "H" => height = Some(parse_number(value, "height")?),
            "F" => fps = Some(parse_ratio(value, "frame rate")?),
            "I" => {
                info.field_order = match value {
                    "t" => FieldOrder::TopFieldFirst,
                    "b" => FieldOrder::BottomFieldFirst,
                    "p" | "?" => FieldOrder::Progressive,
                    "m" => {
                        log::debug!("Mixed field order reported, treating as progressive");
                        FieldOrder::Progressive
                    }
                    other => return Err(format!("unknown interlacing tag I{other}")),
                }
            }
            "A" => {
                let (num, den) = parse_ratio(value, "aspect ratio")?;
                info.sample_aspect_ratio = (num != 0 && den != 0).then_some((num, den));
            }
            "C" => {
                let (color_space, bit_depth) = parse_color_space(value)?;
                info.color_space = color_space;
                info.bit_depth = bit_depth;
            }
            // Comments and vendor extensions.
            "X" => {}
            other => log::debug!("Ignoring unknown y4m header tag {other}"),
        }
    }

    info.width = width.ok_or("stream header has no width (W)")?;
    info.height = height.ok_or("stream header has no height (H)")?;
    let (fps_numerator, fps_denominator) = fps.ok_or("stream header has no frame rate (F)")?;
    if fps_numerator == 0 || fps_denominator == 0 {
        return Err(format!(
            "invalid frame rate {fps_numerator}:{fps_denominator}"
        ));
    }
    info.fps_numerator = fps_numerator;
    info.fps_denominator = fps_denominator;
    Ok(info)
}

fn parse_number(value: &str, what: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("invalid {what}: {value:?}"))
}

fn parse_ratio(value: &str, what: &str) -> Result<(u32, u32), String> {
    let (numerator, denominator) = value
        .split_once(':')
        .ok_or_else(|| format!("invalid {what}: {value:?}"))?;
    Ok((parse_number(numerator, what)?, parse_number(denominator, what)?))
}

fn parse_color_space(value: &str) -> Result<(ColorSpace, u8), String> {
    match value {
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => return Ok((ColorSpace::I420, 8)),
        "422" => return Ok((ColorSpace::I422, 8)),
        "444" => return Ok((ColorSpace::I444, 8)),
        "mono" => return Ok((ColorSpace::Gray, 8)),
        _ => {}
    }

    let (color_space, depth) = if let Some(depth) = value.strip_prefix("420p") {
        (ColorSpace::I420, depth)
    } else if let Some(depth) = value.strip_prefix("422p") {
        (ColorSpace::I422, depth)
    } else if let Some(depth) = value.strip_prefix("444p") {
        (ColorSpace::I444, depth)
    } else if let Some(depth) = value.strip_prefix("mono") {
        (ColorSpace::Gray, depth)
    } else {
        return Err(format!("unsupported colorspace C{value}"));
    };

    match depth.parse::<u8>() {
        Ok(bits @ 9..=16) => Ok((color_space, bits)),
        _ => Err(format!("unsupported colorspace C{value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_defaults_to_8bit_420() {
        let info = parse_stream_header(b"YUV4MPEG2 W320 H240 F25:1\n").unwrap();
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.color_space, ColorSpace::I420);
        assert_eq!(info.bit_depth, 8);
        assert_eq!(info.field_order, FieldOrder::Progressive);
        assert_eq!(info.sample_aspect_ratio, None);
    }

    #[test]
    fn header_reads_all_tags() {
        let info = parse_stream_header(
            b"YUV4MPEG2 W1920 H1080 F30000:1001 It A40:33 C422p10 XYSCSS=422P10\n",
        )
        .unwrap();
        assert_eq!((info.fps_numerator, info.fps_denominator), (30000, 1001));
        assert_eq!(info.field_order, FieldOrder::TopFieldFirst);
        assert_eq!(info.sample_aspect_ratio, Some((40, 33)));
        assert_eq!(info.color_space, ColorSpace::I422);
        assert_eq!(info.bit_depth, 10);
    }

    #[test]
    fn header_rejects_missing_fields() {
        assert!(parse_stream_header(b"YUV4MPEG2 W320 F25:1\n").is_err());
        assert!(parse_stream_header(b"YUV4MPEG2 W320 H240\n").is_err());
        assert!(parse_stream_header(b"YUV4MPEG W320 H240 F25:1\n").is_err());
        assert!(parse_stream_header(b"YUV4MPEG2 W320 H240 F25:0\n").is_err());
    }

    #[test]
    fn color_space_rejects_unknown_layouts() {
        assert!(parse_color_space("444alpha").is_err());
        assert!(parse_color_space("420p8").is_err());
        assert_eq!(parse_color_space("mono16").unwrap(), (ColorSpace::Gray, 16));
    }
}
