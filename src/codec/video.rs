use crate::av::{
    CodecId, CompressionFlags, CompressionInfo, FrameTypeTracker, MediaFrame, Packet,
    PacketFlags, PtsCache, VideoFrame, VideoTimebase, DEFAULT_PTS_CACHE_DEPTH,
};
use crate::config::Config;
use crate::error::{EncMuxError, Result};
use crate::format::PacketSink;

use super::{Encoder, ErrorLatch, NativeVideoCodec, RawPacket};

/// Settings of a [`VideoEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoderOptions {
    pub timebase: VideoTimebase,
    /// Reorder window; must be at least the encoder's frame delay
    pub pts_cache_depth: usize,
    pub stream_index: usize,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            timebase: VideoTimebase::Variable,
            pts_cache_depth: DEFAULT_PTS_CACHE_DEPTH,
            stream_index: 0,
        }
    }
}

impl VideoEncoderOptions {
    /// Default options with the reorder window taken from `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            pts_cache_depth: config.pts_cache_depth,
            ..Self::default()
        }
    }
}

/// Wraps a native video encoder that may reorder frames.
///
/// The timing of each submitted frame is cached until the packet carrying
/// its pts comes out, which restores the duration. Picture types are derived
/// from the output order. A cache miss is logged and the packet goes out
/// flagged [`PacketFlags::UNRELIABLE_TIMESTAMP`]; a cache overflow is fatal.
pub struct VideoEncoder<C: NativeVideoCodec> {
    codec: C,
    options: VideoEncoderOptions,
    cache: PtsCache,
    types: FrameTypeTracker,
    info: Option<CompressionInfo>,
    latch: ErrorLatch,
    flushed: bool,
    cache_misses: u64,
}

impl<C: NativeVideoCodec> VideoEncoder<C> {
    pub fn new(codec: C, options: VideoEncoderOptions) -> Self {
        Self {
            codec,
            cache: PtsCache::new(options.pts_cache_depth),
            options,
            types: FrameTypeTracker::new(),
            info: None,
            latch: ErrorLatch::default(),
            flushed: false,
            cache_misses: 0,
        }
    }

    /// Packets whose timing could not be recovered so far
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    /// Frames submitted but not yet returned by the codec
    pub fn pending_frames(&self) -> usize {
        self.cache.len()
    }

    fn codec_id(&self) -> Result<CodecId> {
        self.info
            .as_ref()
            .map(|info| info.codec)
            .ok_or(EncMuxError::NotInitialized)
    }

    fn open(&mut self) -> Result<CompressionInfo> {
        let native = self.codec.open()?;
        let mut info = CompressionInfo::new(native.codec).with_header(native.extradata);
        info.bitrate = native.bitrate;
        if !native.intra_only && (native.gop_size > 1 || native.gop_size < 0) {
            info.flags.insert(CompressionFlags::HAS_P_FRAMES);
        }
        if native.max_b_frames > 0 {
            info.flags
                .insert(CompressionFlags::HAS_B_FRAMES | CompressionFlags::HAS_P_FRAMES);
        }
        log::debug!(
            "opened {:?} video encoder, flags {:?}",
            info.codec,
            info.flags
        );
        self.info = Some(info.clone());
        Ok(info)
    }

    fn encode_frame(&mut self, frame: VideoFrame, sink: &mut dyn PacketSink) -> Result<()> {
        self.codec_id()?;
        self.cache.push_frame(&frame)?;
        let mut frame = frame;
        frame.timestamp = self.options.timebase.to_codec(frame.timestamp);
        self.codec.send_frame(Some(frame))?;
        self.drain(sink)
    }

    fn drain(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        let codec = self.codec_id()?;
        while let Some(raw) = self.codec.receive_packet()? {
            let packet = self.finish_packet(codec, raw);
            sink.put(packet)?;
        }
        Ok(())
    }

    fn finish_packet(&mut self, codec: CodecId, raw: RawPacket) -> Packet {
        let timebase = self.options.timebase;
        let mut packet = Packet::new(raw.data)
            .with_stream_index(self.options.stream_index)
            .with_key_flag(raw.keyframe);
        packet.pts = raw.pts.map(|pts| timebase.from_codec(pts));
        packet.dts = raw.dts.map(|dts| timebase.from_codec(dts));

        // VP8 alternate reference frames are never shown and have no input frame.
        if codec == CodecId::Vp8 && packet.data.first().map_or(false, |b| b & 0x10 == 0) {
            packet.flags.insert(PacketFlags::NO_OUTPUT);
            return packet;
        }

        let pts = match packet.pts {
            Some(pts) => pts,
            None => {
                log::warn!("video encoder returned a packet without pts");
                packet.flags.insert(PacketFlags::UNRELIABLE_TIMESTAMP);
                return packet;
            }
        };

        packet.set_frame_type(self.types.classify(pts, raw.keyframe));

        match self.cache.pop(pts) {
            Ok(entry) => packet.duration = entry.duration,
            Err(err) => {
                log::warn!("{}, timestamps may be wrong", err);
                self.cache_misses += 1;
                packet.flags.insert(PacketFlags::UNRELIABLE_TIMESTAMP);
            }
        }
        packet
    }

    fn flush_codec(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        self.codec.send_frame(None)?;
        self.drain(sink)?;
        if !self.cache.is_empty() {
            log::warn!(
                "{} frames never came out of the video encoder",
                self.cache.len()
            );
            self.cache.clear();
        }
        Ok(())
    }
}

impl<C: NativeVideoCodec> Encoder for VideoEncoder<C> {
    fn init(&mut self) -> Result<CompressionInfo> {
        self.latch.check()?;
        let result = self.open();
        self.latch.record(result)
    }

    fn encode(&mut self, frame: MediaFrame, sink: &mut dyn PacketSink) -> Result<()> {
        self.latch.check()?;
        if self.flushed {
            return Err(EncMuxError::StreamClosed);
        }
        let frame = match frame {
            MediaFrame::Video(frame) => frame,
            MediaFrame::Audio(_) => {
                return Err(EncMuxError::InvalidData(
                    "audio frame sent to a video encoder".to_string(),
                ))
            }
        };
        let result = self.encode_frame(frame, sink);
        self.latch.record(result)
    }

    fn flush(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        self.latch.check()?;
        let result = self.flush_codec(sink);
        self.latch.record(result)
    }

    fn close(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        let result = if self.latch.is_failed() || self.info.is_none() {
            Ok(())
        } else {
            let result = self.flush_codec(sink);
            self.latch.record(result)
        };
        self.codec.close();
        result
    }
}
