//! # Encoder adapters
//!
//! Native codec libraries are opaque: they take frames and give back
//! compressed payloads, with at most a presentation timestamp and a keyframe
//! bit attached. The adapters in this module turn that into a stream of fully
//! timed [`Packet`](crate::av::Packet)s:
//!
//! - [`video::VideoEncoder`] restores durations and picture types of
//!   reordered video through a [`PtsCache`](crate::av::PtsCache)
//! - [`audio::AudioEncoder`] re-chunks audio into codec frames and rebuilds
//!   timestamps from sample counts and the encoder delay
//! - [`opus::OpusEncoder`] drives a frame-synchronous Opus encoder and builds
//!   the `OpusHead` identification header
//!
//! Every adapter implements [`Encoder`], so containers pick one at
//! configuration time and drive it without knowing the codec.

use bytes::Bytes;

use crate::av::{AudioFrame, CodecId, CompressionInfo, MediaFrame, VideoFrame};
use crate::error::{EncMuxError, Result};
use crate::format::PacketSink;

pub mod audio;
pub mod opus;
pub mod video;

pub use audio::AudioEncoder;
pub use opus::OpusEncoder;
pub use video::{VideoEncoder, VideoEncoderOptions};

/// Uniform interface of every encoder adapter.
///
/// Packets are pushed into the sink passed to each call. Once a call has
/// failed with a fatal error the encoder stays failed and every later call
/// returns [`EncMuxError::EncoderFailed`].
pub trait Encoder {
    /// Opens the native codec and describes the stream it will produce
    fn init(&mut self) -> Result<CompressionInfo>;

    /// Submits one frame; zero or more packets may come out
    fn encode(&mut self, frame: MediaFrame, sink: &mut dyn PacketSink) -> Result<()>;

    /// Drains every packet still buffered inside the codec
    fn flush(&mut self, sink: &mut dyn PacketSink) -> Result<()>;

    /// Flushes if needed and releases the native codec
    fn close(&mut self, sink: &mut dyn PacketSink) -> Result<()>;
}

/// Compressed payload as returned by a native codec.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub keyframe: bool,
}

impl RawPacket {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            keyframe: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_key_flag(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }
}

/// Parameters a native codec reports once it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCodecInfo {
    pub codec: CodecId,
    /// Out-of-band configuration (extradata)
    pub extradata: Bytes,
    pub bitrate: u32,
    /// Audio: samples the output lags behind the input
    pub delay: u32,
    /// Audio: samples per channel in one frame, 0 or 1 if variable
    pub frame_size: usize,
    /// Video: keyframe interval, negative when unbounded
    pub gop_size: i32,
    /// Video: maximum consecutive B-frames
    pub max_b_frames: u32,
    /// Video: every frame is a keyframe
    pub intra_only: bool,
}

impl NativeCodecInfo {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            extradata: Bytes::new(),
            bitrate: 0,
            delay: 0,
            frame_size: 0,
            gop_size: 1,
            max_b_frames: 0,
            intra_only: false,
        }
    }
}

/// A native video encoder with a send/receive interface.
pub trait NativeVideoCodec {
    fn open(&mut self) -> Result<NativeCodecInfo>;

    /// Submits a frame, or signals end of stream with `None`.
    ///
    /// Fails with [`EncMuxError::EncoderRejectedFrame`] when the codec refuses it.
    fn send_frame(&mut self, frame: Option<VideoFrame>) -> Result<()>;

    /// Returns the next finished packet, `None` when more input is needed
    fn receive_packet(&mut self) -> Result<Option<RawPacket>>;

    fn close(&mut self) {}
}

/// A native audio encoder with a send/receive interface.
pub trait NativeAudioCodec {
    fn open(&mut self) -> Result<NativeCodecInfo>;

    /// Submits exactly one codec frame (the last one may be short), or
    /// signals end of stream with `None`.
    fn send_frame(&mut self, frame: Option<AudioFrame>) -> Result<()>;

    fn receive_packet(&mut self) -> Result<Option<RawPacket>>;

    fn close(&mut self) {}
}

/// Latches the first fatal error of an encoder.
#[derive(Debug, Default)]
pub(crate) struct ErrorLatch {
    failed: bool,
}

impl ErrorLatch {
    pub(crate) fn check(&self) -> Result<()> {
        if self.failed {
            Err(EncMuxError::EncoderFailed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            log::error!("encoder failed: {}", err);
            self.failed = true;
        }
        result
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed
    }
}
