use bytes::BytesMut;

use crate::av::{
    AudioFormat, AudioFrame, AudioTimeline, CompressionInfo, MediaFrame, Packet,
};
use crate::error::{EncMuxError, Result};
use crate::format::PacketSink;

use super::{Encoder, ErrorLatch, NativeAudioCodec};

/// Codec frame size used when the native codec accepts any size
pub const DEFAULT_SAMPLES_PER_FRAME: usize = 1024;

/// Wraps a native audio encoder with a send/receive interface.
///
/// Input of any length is cut into codec frames of the size the codec asks
/// for. Output timestamps are rebuilt from the number of samples submitted:
/// the first packet starts `delay` samples before the first input sample and
/// every packet is clipped so it never extends past the submitted input.
pub struct AudioEncoder<C: NativeAudioCodec> {
    codec: C,
    format: AudioFormat,
    stream_index: usize,
    timeline: Option<AudioTimeline>,
    pending: BytesMut,
    pending_samples: usize,
    latch: ErrorLatch,
    flushed: bool,
}

impl<C: NativeAudioCodec> AudioEncoder<C> {
    pub fn new(codec: C, format: AudioFormat) -> Self {
        Self {
            codec,
            format,
            stream_index: 0,
            timeline: None,
            pending: BytesMut::new(),
            pending_samples: 0,
            latch: ErrorLatch::default(),
            flushed: false,
        }
    }

    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Sample layout, with `samples_per_frame` filled in after [`Encoder::init`]
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn open(&mut self) -> Result<CompressionInfo> {
        let native = self.codec.open()?;
        self.format.samples_per_frame = if native.frame_size <= 1 {
            DEFAULT_SAMPLES_PER_FRAME
        } else {
            native.frame_size
        };
        self.timeline = Some(AudioTimeline::new(native.delay as i64));

        let mut info = CompressionInfo::new(native.codec).with_header(native.extradata);
        info.bitrate = native.bitrate;
        info.pre_skip = native.delay;
        log::debug!(
            "opened {:?} audio encoder: {} samples per frame, delay {}",
            info.codec,
            self.format.samples_per_frame,
            native.delay
        );
        Ok(info)
    }

    fn encode_frame(&mut self, frame: AudioFrame, sink: &mut dyn PacketSink) -> Result<()> {
        let timeline = self.timeline.as_mut().ok_or(EncMuxError::NotInitialized)?;
        frame.validate(&self.format)?;
        timeline.start(frame.timestamp);

        let align = self.format.block_align();
        let frame_bytes = self.format.samples_per_frame * align;
        let mut offset = 0;
        let input = &frame.data[..frame.valid_samples * align];
        while offset < input.len() {
            let room = frame_bytes - self.pending.len();
            let take = room.min(input.len() - offset);
            self.pending.extend_from_slice(&input[offset..offset + take]);
            self.pending_samples += take / align;
            offset += take;

            if self.pending.len() == frame_bytes {
                self.send_pending(sink)?;
            }
        }
        Ok(())
    }

    fn send_pending(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        let timeline = self.timeline.as_mut().ok_or(EncMuxError::NotInitialized)?;
        let samples = self.pending_samples;
        let timestamp = timeline.in_pts().unwrap_or_default();
        let data = self.pending.split().freeze();
        self.pending_samples = 0;

        self.codec
            .send_frame(Some(AudioFrame::new(data, samples, timestamp)))?;
        timeline.advance_input(samples)?;
        self.drain(sink)
    }

    fn drain(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        let timeline = self.timeline.as_mut().ok_or(EncMuxError::NotInitialized)?;
        while let Some(raw) = self.codec.receive_packet()? {
            let (pts, duration) = timeline.next_packet(self.format.samples_per_frame)?;
            let packet = Packet::new(raw.data)
                .with_pts(pts)
                .with_dts(pts)
                .with_duration(duration)
                .with_key_flag(true)
                .with_stream_index(self.stream_index);
            sink.put(packet)?;
        }
        Ok(())
    }

    fn flush_codec(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let started = self.timeline.as_ref().map_or(false, |t| t.is_started());
        if !started {
            // Nothing was ever submitted.
            return Ok(());
        }
        if self.pending_samples > 0 {
            self.send_pending(sink)?;
        }
        self.codec.send_frame(None)?;
        self.drain(sink)
    }
}

impl<C: NativeAudioCodec> Encoder for AudioEncoder<C> {
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
            MediaFrame::Audio(frame) => frame,
            MediaFrame::Video(_) => {
                return Err(EncMuxError::InvalidData(
                    "video frame sent to an audio encoder".to_string(),
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
        let result = if self.latch.is_failed() || self.timeline.is_none() {
            Ok(())
        } else {
            let result = self.flush_codec(sink);
            self.latch.record(result)
        };
        self.codec.close();
        result
    }
}
