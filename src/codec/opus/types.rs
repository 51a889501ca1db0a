use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{EncMuxError, Result};

/// Sample rates an Opus encoder accepts
pub const SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Opus timestamps always count 48 kHz samples
pub const OPUS_CLOCK: u32 = 48000;

/// Most channels one Opus stream can describe
pub const MAX_CHANNELS: usize = 255;

/// Picks the supported sample rate closest to `rate`.
pub fn nearest_sample_rate(rate: u32) -> u32 {
    SAMPLE_RATES
        .iter()
        .copied()
        .min_by_key(|&supported| (supported as i64 - rate as i64).abs())
        .unwrap_or(OPUS_CLOCK)
}

/// How input channels are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// Channels in Vorbis order (L, C, R, rear L, rear R, LFE, ...)
    Vorbis,
    /// Channels with no speaker position
    Auxiliary,
}

/// Stream and channel mapping table of a multistream Opus encoder.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelMapping {
    family: u8,
    channels: u8,
    stream_count: u8,
    coupled_count: u8,
    map: [u8; MAX_CHANNELS],
}

impl fmt::Debug for ChannelMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelMapping")
            .field("family", &self.family)
            .field("stream_count", &self.stream_count)
            .field("coupled_count", &self.coupled_count)
            .field("map", &self.map())
            .finish()
    }
}

impl ChannelMapping {
    /// Builds the mapping for `channels` channels laid out as `layout`
    ///
    /// # Errors
    ///
    /// Returns [`EncMuxError::InvalidData`] for zero channels or more than
    /// [`MAX_CHANNELS`].
    pub fn new(channels: usize, layout: ChannelLayout) -> Result<Self> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(EncMuxError::InvalidData(format!(
                "opus cannot map {} channels",
                channels
            )));
        }
        let vorbis: Option<(u8, u8, u8, &[u8])> = match (layout, channels) {
            (ChannelLayout::Vorbis, 1) => Some((0, 1, 0, &[0])),
            (ChannelLayout::Vorbis, 2) => Some((0, 1, 1, &[0, 1])),
            (ChannelLayout::Vorbis, 3) => Some((1, 2, 1, &[0, 2, 1])),
            (ChannelLayout::Vorbis, 4) => Some((1, 2, 2, &[0, 1, 2, 3])),
            (ChannelLayout::Vorbis, 5) => Some((1, 3, 2, &[0, 4, 1, 2, 3])),
            (ChannelLayout::Vorbis, 6) => Some((1, 4, 2, &[0, 4, 1, 2, 3, 5])),
            (ChannelLayout::Vorbis, 7) => Some((1, 5, 2, &[0, 4, 1, 2, 3, 5, 6])),
            (ChannelLayout::Vorbis, 8) => Some((1, 5, 2, &[0, 6, 1, 2, 3, 4, 5, 7])),
            _ => None,
        };

        let mut mapping = Self {
            family: 255,
            channels: channels as u8,
            stream_count: channels as u8,
            coupled_count: 0,
            map: [0; MAX_CHANNELS],
        };
        match vorbis {
            Some((family, streams, coupled, map)) => {
                mapping.family = family;
                mapping.stream_count = streams;
                mapping.coupled_count = coupled;
                mapping.map[..map.len()].copy_from_slice(map);
            }
            None => {
                for (i, slot) in mapping.map[..channels].iter_mut().enumerate() {
                    *slot = i as u8;
                }
            }
        }
        Ok(mapping)
    }

    /// Mapping family written to the header (0, 1 or 255)
    pub fn family(&self) -> u8 {
        self.family
    }

    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    pub fn stream_count(&self) -> u8 {
        self.stream_count
    }

    pub fn coupled_count(&self) -> u8 {
        self.coupled_count
    }

    /// Output channel to stream channel table
    pub fn map(&self) -> &[u8] {
        &self.map[..self.channels as usize]
    }
}

/// The `OpusHead` identification header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub pre_skip: u16,
    /// Sample rate of the input, informational only
    pub input_sample_rate: u32,
    /// Gain in Q7.8 dB
    pub output_gain: i16,
    pub mapping: ChannelMapping,
}

impl OpusHead {
    pub const MAGIC: &'static [u8; 8] = b"OpusHead";

    /// Largest possible serialized header
    pub const MAX_LEN: usize = 8 + 1 + 1 + 2 + 4 + 2 + 1 + 1 + 1 + 256;

    pub fn new(mapping: ChannelMapping, input_sample_rate: u32) -> Self {
        Self {
            version: 1,
            pre_skip: 0,
            input_sample_rate,
            output_gain: 0,
            mapping,
        }
    }

    /// Serializes the header, little endian as Ogg Opus requires
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::MAX_LEN);
        buf.put_slice(Self::MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.mapping.channels);
        buf.put_u16_le(self.pre_skip);
        buf.put_u32_le(self.input_sample_rate);
        buf.put_i16_le(self.output_gain);
        buf.put_u8(self.mapping.family);
        if self.mapping.family != 0 {
            buf.put_u8(self.mapping.stream_count);
            buf.put_u8(self.mapping.coupled_count);
            buf.put_slice(self.mapping.map());
        }
        debug_assert!(buf.len() <= Self::MAX_LEN);
        buf.freeze()
    }

    /// Parses a serialized header
    ///
    /// # Errors
    ///
    /// Returns [`EncMuxError::InvalidData`] if the magic is wrong or the
    /// buffer is too short for the channel table it announces.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 19 || &data[..8] != Self::MAGIC {
            return Err(EncMuxError::InvalidData("not an OpusHead".to_string()));
        }
        let channels = data[9] as usize;
        if channels == 0 {
            return Err(EncMuxError::InvalidData("OpusHead without channels".to_string()));
        }
        let family = data[18];
        let mut mapping = ChannelMapping {
            family,
            channels: channels as u8,
            stream_count: 1,
            coupled_count: (channels > 1) as u8,
            map: [0; MAX_CHANNELS],
        };
        if family == 0 {
            if channels > 2 {
                return Err(EncMuxError::InvalidData(format!(
                    "mapping family 0 with {} channels",
                    channels
                )));
            }
            if channels == 2 {
                mapping.map[1] = 1;
            }
        } else {
            if data.len() < 21 + channels {
                return Err(EncMuxError::InvalidData("truncated OpusHead".to_string()));
            }
            mapping.stream_count = data[19];
            mapping.coupled_count = data[20];
            mapping.map[..channels].copy_from_slice(&data[21..21 + channels]);
        }
        Ok(Self {
            version: data[8],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
            input_sample_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
            output_gain: i16::from_le_bytes([data[16], data[17]]),
            mapping,
        })
    }
}

/// Duration of one Opus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDuration {
    Ms2_5,
    Ms5,
    Ms10,
    Ms20,
    Ms40,
    Ms60,
}

impl FrameDuration {
    /// Duration in units of 100 microseconds
    pub fn tenths_of_ms(self) -> u32 {
        match self {
            FrameDuration::Ms2_5 => 25,
            FrameDuration::Ms5 => 50,
            FrameDuration::Ms10 => 100,
            FrameDuration::Ms20 => 200,
            FrameDuration::Ms40 => 400,
            FrameDuration::Ms60 => 600,
        }
    }

    pub fn from_tenths_of_ms(value: u32) -> Option<Self> {
        match value {
            25 => Some(FrameDuration::Ms2_5),
            50 => Some(FrameDuration::Ms5),
            100 => Some(FrameDuration::Ms10),
            200 => Some(FrameDuration::Ms20),
            400 => Some(FrameDuration::Ms40),
            600 => Some(FrameDuration::Ms60),
            _ => None,
        }
    }

    /// Samples per channel in one frame at `sample_rate`
    pub fn samples(self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.tenths_of_ms() as usize) / 10000
    }
}

impl Default for FrameDuration {
    fn default() -> Self {
        FrameDuration::Ms20
    }
}
