use bytes::{Bytes, BytesMut};

use super::types::{
    nearest_sample_rate, ChannelLayout, ChannelMapping, FrameDuration, OpusHead, OPUS_CLOCK,
};
use crate::av::{AudioFormat, AudioFrame, CodecId, CompressionInfo, MediaFrame, Packet, PacketFlags};
use crate::codec::{Encoder, ErrorLatch};
use crate::error::{EncMuxError, Result};
use crate::format::PacketSink;

/// Largest packet one Opus stream can produce for a single frame
const MAX_STREAM_PACKET: usize = 1275 * 3 + 7;

/// Coding mode requested from the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Application {
    Audio,
    Voip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateMode {
    Vbr,
    ConstrainedVbr,
    Cbr,
}

/// Tuning of an Opus encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusSettings {
    pub application: Application,
    pub bitrate_mode: BitrateMode,
    /// Bits per second, 0 lets the encoder choose
    pub bitrate: u32,
    /// 1 (fastest) to 10 (best)
    pub complexity: u8,
    pub frame_duration: FrameDuration,
    pub dtx: bool,
    pub inband_fec: bool,
    /// Expected packet loss in percent
    pub loss_percent: u8,
    pub layout: ChannelLayout,
}

impl Default for OpusSettings {
    fn default() -> Self {
        Self {
            application: Application::Audio,
            bitrate_mode: BitrateMode::Vbr,
            bitrate: 0,
            complexity: 10,
            frame_duration: FrameDuration::default(),
            dtx: false,
            inband_fec: false,
            loss_percent: 0,
            layout: ChannelLayout::Vorbis,
        }
    }
}

/// A native multistream Opus encoder.
///
/// Unlike the send/receive codecs, Opus encodes exactly one frame per call.
pub trait OpusBackend {
    /// Creates the encoder for the given rate and channel mapping.
    fn open(
        &mut self,
        sample_rate: u32,
        mapping: &ChannelMapping,
        settings: &OpusSettings,
    ) -> Result<()>;

    /// Samples, at the input rate, by which the output lags the input
    fn lookahead(&self) -> Result<u32>;

    /// Encodes one full frame of interleaved samples into `out` and returns
    /// the packet length.
    fn encode(&mut self, pcm: &[u8], frame_samples: usize, out: &mut [u8]) -> Result<usize>;

    /// Name and version of the library
    fn version(&self) -> String {
        String::from("libopus")
    }

    fn close(&mut self) {}
}

/// Frame-synchronous Opus encoder adapter.
///
/// Input is collected into frames of the configured duration. The encoder's
/// lookahead is filled with silence up front and announced as pre-skip, so
/// the first packet starts at `-pre_skip`. Timestamps are in 48 kHz units
/// regardless of the input rate. The final, zero-padded frame is flagged
/// [`PacketFlags::LAST`].
pub struct OpusEncoder<B: OpusBackend> {
    backend: B,
    settings: OpusSettings,
    format: AudioFormat,
    stream_index: usize,
    head: Option<OpusHead>,
    lookahead_pending: usize,
    frame: BytesMut,
    frame_samples: usize,
    enc_buffer: Vec<u8>,
    pts: i64,
    latch: ErrorLatch,
    finished: bool,
}

impl<B: OpusBackend> OpusEncoder<B> {
    pub fn new(backend: B, format: AudioFormat, settings: OpusSettings) -> Self {
        Self {
            backend,
            settings,
            format,
            stream_index: 0,
            head: None,
            lookahead_pending: 0,
            frame: BytesMut::new(),
            frame_samples: 0,
            enc_buffer: Vec::new(),
            pts: 0,
            latch: ErrorLatch::default(),
            finished: false,
        }
    }

    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Format the input must have; the sample rate is adjusted by [`Encoder::init`]
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Identification header, available after [`Encoder::init`]
    pub fn head(&self) -> Option<&OpusHead> {
        self.head.as_ref()
    }

    fn open(&mut self) -> Result<CompressionInfo> {
        let rate = nearest_sample_rate(self.format.sample_rate);
        if rate != self.format.sample_rate {
            log::info!(
                "opus needs resampling from {} to {}",
                self.format.sample_rate,
                rate
            );
            self.format.sample_rate = rate;
        }
        self.format.samples_per_frame = self.settings.frame_duration.samples(rate);

        let mapping = ChannelMapping::new(self.format.channels as usize, self.settings.layout)?;
        self.backend.open(rate, &mapping, &self.settings)?;

        let lookahead = self.backend.lookahead()?;
        let pre_skip = u16::try_from(lookahead as u64 * OPUS_CLOCK as u64 / rate as u64)
            .map_err(|_| EncMuxError::InvalidData(format!("lookahead {} too large", lookahead)))?;

        self.enc_buffer = vec![0u8; mapping.stream_count() as usize * MAX_STREAM_PACKET];
        let mut head = OpusHead::new(mapping, rate);
        head.pre_skip = pre_skip;
        self.lookahead_pending = lookahead as usize;
        self.pts = -(pre_skip as i64);

        let mut info = CompressionInfo::new(CodecId::Opus).with_header(head.to_bytes());
        info.pre_skip = pre_skip as u32;
        info.bitrate = self.settings.bitrate;
        info.software = Some(self.backend.version());
        log::debug!(
            "opened opus encoder: {} Hz, {} channels, pre-skip {}",
            rate,
            self.format.channels,
            pre_skip
        );
        self.head = Some(head);
        Ok(info)
    }

    fn frame_bytes(&self) -> usize {
        self.format.samples_per_frame * self.format.block_align()
    }

    fn encode_frame(&mut self, frame: AudioFrame, sink: &mut dyn PacketSink) -> Result<()> {
        if self.head.is_none() {
            return Err(EncMuxError::NotInitialized);
        }
        frame.validate(&self.format)?;
        let align = self.format.block_align();
        let frame_bytes = self.frame_bytes();

        while self.lookahead_pending > 0 {
            let room = self.format.samples_per_frame - self.frame_samples;
            let silent = self.lookahead_pending.min(room);
            self.frame.resize(self.frame.len() + silent * align, 0);
            self.frame_samples += silent;
            self.lookahead_pending -= silent;
            if self.frame.len() == frame_bytes {
                self.encode_pending(false, sink)?;
            }
        }

        let input = &frame.data[..frame.valid_samples * align];
        let mut offset = 0;
        while offset < input.len() {
            let take = (frame_bytes - self.frame.len()).min(input.len() - offset);
            self.frame.extend_from_slice(&input[offset..offset + take]);
            self.frame_samples += take / align;
            offset += take;
            if self.frame.len() == frame_bytes {
                self.encode_pending(false, sink)?;
            }
        }
        Ok(())
    }

    fn encode_pending(&mut self, last: bool, sink: &mut dyn PacketSink) -> Result<()> {
        if self.frame_samples == 0 {
            return Ok(());
        }
        let frame_bytes = self.frame_bytes();
        self.frame.resize(frame_bytes, 0);

        let len = self.backend.encode(
            &self.frame,
            self.format.samples_per_frame,
            &mut self.enc_buffer,
        )?;
        if len > self.enc_buffer.len() {
            return Err(EncMuxError::InvalidData(format!(
                "opus packet of {} bytes overruns the {} byte buffer",
                len,
                self.enc_buffer.len()
            )));
        }

        let duration =
            (self.frame_samples as i64 * OPUS_CLOCK as i64) / self.format.sample_rate as i64;
        let mut packet = Packet::new(Bytes::copy_from_slice(&self.enc_buffer[..len]))
            .with_pts(self.pts)
            .with_dts(self.pts)
            .with_duration(duration)
            .with_key_flag(true)
            .with_stream_index(self.stream_index);
        if last {
            packet.flags.insert(PacketFlags::LAST);
        }
        self.pts += duration;
        self.frame.clear();
        self.frame_samples = 0;
        sink.put(packet)
    }

    fn finish(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encode_pending(true, sink)
    }
}

impl<B: OpusBackend> Encoder for OpusEncoder<B> {
    fn init(&mut self) -> Result<CompressionInfo> {
        self.latch.check()?;
        let result = self.open();
        self.latch.record(result)
    }

    fn encode(&mut self, frame: MediaFrame, sink: &mut dyn PacketSink) -> Result<()> {
        self.latch.check()?;
        if self.finished {
            return Err(EncMuxError::StreamClosed);
        }
        let frame = match frame {
            MediaFrame::Audio(frame) => frame,
            MediaFrame::Video(_) => {
                return Err(EncMuxError::InvalidData(
                    "video frame sent to an opus encoder".to_string(),
                ))
            }
        };
        let result = self.encode_frame(frame, sink);
        self.latch.record(result)
    }

    fn flush(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        self.latch.check()?;
        let result = self.finish(sink);
        self.latch.record(result)
    }

    fn close(&mut self, sink: &mut dyn PacketSink) -> Result<()> {
        let result = if self.latch.is_failed() || self.head.is_none() {
            Ok(())
        } else {
            let result = self.finish(sink);
            self.latch.record(result)
        };
        self.backend.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Produces one byte per frame holding the sum of its input bytes.
    #[derive(Default)]
    struct FakeOpus {
        lookahead: u32,
        frames: Vec<usize>,
        opened: Option<(u32, u8)>,
    }

    impl OpusBackend for FakeOpus {
        fn open(
            &mut self,
            sample_rate: u32,
            mapping: &ChannelMapping,
            _settings: &OpusSettings,
        ) -> Result<()> {
            self.opened = Some((sample_rate, mapping.stream_count()));
            Ok(())
        }

        fn lookahead(&self) -> Result<u32> {
            Ok(self.lookahead)
        }

        fn encode(&mut self, pcm: &[u8], frame_samples: usize, out: &mut [u8]) -> Result<usize> {
            self.frames.push(frame_samples);
            out[0] = pcm.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            Ok(1)
        }
    }

    fn stereo_16k() -> AudioFormat {
        AudioFormat::new(16000, 2, 2)
    }

    #[test]
    fn test_header_and_pre_skip() {
        let backend = FakeOpus {
            lookahead: 104,
            ..FakeOpus::default()
        };
        let mut encoder = OpusEncoder::new(backend, stereo_16k(), OpusSettings::default());
        let info = encoder.init().unwrap();

        assert_eq!(info.codec, CodecId::Opus);
        assert_eq!(info.pre_skip, 312);
        assert_eq!(encoder.format().samples_per_frame, 320);
        let head = OpusHead::parse(&info.codec_header).unwrap();
        assert_eq!(head.pre_skip, 312);
        assert_eq!(head.input_sample_rate, 16000);
        assert_eq!(encoder.backend.opened, Some((16000, 1)));
        assert_eq!(encoder.enc_buffer.len(), MAX_STREAM_PACKET);
    }

    #[test]
    fn test_packet_timing_in_48k_units() {
        let backend = FakeOpus {
            lookahead: 104,
            ..FakeOpus::default()
        };
        let format = stereo_16k();
        let mut encoder = OpusEncoder::new(backend, format, OpusSettings::default());
        encoder.init().unwrap();

        let mut out: Vec<Packet> = Vec::new();
        // 104 silent + 500 input samples = 604 = one full frame of 320 plus 284.
        encoder
            .encode(AudioFrame::silence(&format, 500, 0).into(), &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
        encoder.close(&mut out).unwrap();

        let timing: Vec<(i64, i64, bool)> = out
            .iter()
            .map(|p| (p.pts.unwrap(), p.duration, p.is_last()))
            .collect();
        assert_eq!(timing, vec![(-312, 960, false), (648, 852, true)]);
        assert_eq!(encoder.backend.frames, vec![320, 320]);
    }

    #[test]
    fn test_resamples_to_supported_rate() {
        let mut encoder = OpusEncoder::new(
            FakeOpus::default(),
            AudioFormat::new(44100, 1, 2),
            OpusSettings::default(),
        );
        encoder.init().unwrap();
        assert_eq!(encoder.format().sample_rate, 48000);
        assert_eq!(encoder.format().samples_per_frame, 960);
    }

    #[test]
    fn test_encode_after_flush_is_rejected() {
        let mut encoder = OpusEncoder::new(
            FakeOpus::default(),
            AudioFormat::new(48000, 1, 2),
            OpusSettings::default(),
        );
        encoder.init().unwrap();
        let mut out: Vec<Packet> = Vec::new();
        encoder.flush(&mut out).unwrap();
        assert!(out.is_empty());
        let frame = AudioFrame::silence(encoder.format(), 10, 0);
        let err = encoder.encode(frame.into(), &mut out).unwrap_err();
        assert!(matches!(err, EncMuxError::StreamClosed));
    }
}
