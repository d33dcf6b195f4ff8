//! FFmpeg-decoded frame source (feature `ffmpeg`).
//!
//! Opens any container FFmpeg understands, decodes the best video stream and
//! converts each picture to 8-bit planar YUV 4:2:0 so the payloads match what
//! the encoder is told to expect on stdin.
//!
//! Frames are decoded forward. Requests for the next frame, or one shortly
//! after it, continue decoding; anything else seeks to the nearest keyframe
//! before the target first.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::error::FramePipeError;
use crate::metadata::{ColorSpace, VideoInfo};
use crate::source::FrameSource;

/// Forward distance below which decoding on is cheaper than seeking.
const SEEK_THRESHOLD: u64 = 64;
/// `AV_NOPTS_VALUE`.
const NO_PTS: i64 = i64::MIN;

/// Frame source backed by an FFmpeg demuxer and decoder.
pub struct FfmpegSource {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    info: VideoInfo,
    /// Frame number the decoder is expected to produce next.
    next_frame: u64,
    decoded_frame: VideoFrame,
    converted_frame: VideoFrame,
    eof_sent: bool,
    path: PathBuf,
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("info", &self.info)
            .field("stream_index", &self.stream_index)
            .field("next_frame", &self.next_frame)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FfmpegSource {
    /// Open a media file and prepare its best video stream for decoding.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::SourceOpen`] if FFmpeg cannot open the file,
    /// it has no video stream, or no decoder is available.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FramePipeError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |reason: String| FramePipeError::SourceOpen {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening media file through FFmpeg: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;
        let input =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| open_error("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = match stream.start_time() {
            NO_PTS => 0,
            start => start,
        };

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| open_error(format!("cannot create video decoder: {error}")))?;

        let frame_rate = match stream.avg_frame_rate() {
            rate if rate.numerator() > 0 && rate.denominator() > 0 => rate,
            _ => stream.rate(),
        };
        if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
            return Err(open_error("video stream has no usable frame rate".to_string()));
        }
        let frames_per_second = f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator());

        let frame_count = match stream.frames() {
            count if count > 0 => count as u64,
            _ => {
                let duration_seconds = input.duration().max(0) as f64 / 1_000_000.0;
                (duration_seconds * frames_per_second) as u64
            }
        };

        let mut info = VideoInfo::new(
            decoder.width(),
            decoder.height(),
            (frame_rate.numerator() as u32, frame_rate.denominator() as u32),
            frame_count,
        );
        info.color_space = ColorSpace::I420;
        let aspect = decoder.aspect_ratio();
        if aspect.numerator() > 0 && aspect.denominator() > 0 {
            info.sample_aspect_ratio =
                Some((aspect.numerator() as u32, aspect.denominator() as u32));
        }

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::YUV420P,
            decoder.width(),
            decoder.height(),
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| open_error(format!("cannot create scaler: {error}")))?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_pts,
            info,
            next_frame: 0,
            decoded_frame: VideoFrame::empty(),
            converted_frame: VideoFrame::empty(),
            eof_sent: false,
            path,
        })
    }

    fn seek_to(&mut self, frame_number: u64) -> Result<(), FfmpegError> {
        // Container seeks are expressed in AV_TIME_BASE (microseconds).
        let target = (frame_number as f64 / self.info.frames_per_second() * 1_000_000.0) as i64;
        log::debug!("Seeking to frame {frame_number} (ts={target})");
        self.input.seek(target, ..target)?;
        self.decoder.flush();
        self.eof_sent = false;
        // Unknown until the first frame after the seek is decoded.
        self.next_frame = 0;
        Ok(())
    }

    /// Decode the next picture into `decoded_frame` and return its number.
    fn decode_next(&mut self) -> Result<Option<u64>, FfmpegError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let pts = self
                    .decoded_frame
                    .timestamp()
                    .or(self.decoded_frame.pts())
                    .unwrap_or(self.start_pts);
                let number = pts_to_frame_number(
                    pts - self.start_pts,
                    self.time_base,
                    self.info.frames_per_second(),
                );
                self.next_frame = number + 1;
                return Ok(Some(number));
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                // Non-fatal read error; try the next packet.
                Err(_) => {}
            }
        }
    }

    /// Copy the converted YUV 4:2:0 planes into one packed payload.
    fn packed_payload(&self) -> Vec<u8> {
        let (width, height) = (self.info.width as usize, self.info.height as usize);
        let (chroma_width, chroma_height) = (width.div_ceil(2), height.div_ceil(2));
        let mut payload = Vec::with_capacity(self.info.frame_size());

        for (plane, plane_width, plane_height) in [
            (0, width, height),
            (1, chroma_width, chroma_height),
            (2, chroma_width, chroma_height),
        ] {
            let stride = self.converted_frame.stride(plane);
            let data = self.converted_frame.data(plane);
            if stride == plane_width {
                payload.extend_from_slice(&data[..plane_width * plane_height]);
            } else {
                for row in 0..plane_height {
                    let row_start = row * stride;
                    payload.extend_from_slice(&data[row_start..row_start + plane_width]);
                }
            }
        }
        payload
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame(&mut self, index: u64) -> Result<Vec<u8>, FramePipeError> {
        let read_error = |reason: String| FramePipeError::SourceRead {
            frame_number: index,
            reason,
        };

        if index < self.next_frame || index > self.next_frame + SEEK_THRESHOLD {
            self.seek_to(index)
                .map_err(|error| read_error(format!("seek failed: {error}")))?;
        }

        loop {
            let number = self
                .decode_next()
                .map_err(|error| read_error(format!("decode failed: {error}")))?
                .ok_or_else(|| read_error("end of stream reached".to_string()))?;

            // Past the target means the stream has a gap; deliver the next
            // available picture rather than failing the whole run.
            if number >= index {
                self.scaler
                    .run(&self.decoded_frame, &mut self.converted_frame)
                    .map_err(|error| read_error(format!("scaling failed: {error}")))?;
                self.next_frame = index + 1;
                return Ok(self.packed_payload());
            }
        }
    }
}

/// Rescale a PTS value to a frame number.
fn pts_to_frame_number(pts: i64, time_base: Rational, frames_per_second: f64) -> u64 {
    let seconds =
        pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator());
    (seconds * frames_per_second).round().max(0.0) as u64
}
