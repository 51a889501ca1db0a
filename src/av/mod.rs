use bytes::Bytes;
use std::ops::BitOr;

/// Identifies the compression format of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Opus,
    Flac,
    Vorbis,
    Aac,
    Mp3,
    Vp8,
    Vp9,
    Theora,
    H264,
    Mpeg4,
}

impl CodecId {
    pub fn kind(self) -> MediaKind {
        match self {
            CodecId::Opus | CodecId::Flac | CodecId::Vorbis | CodecId::Aac | CodecId::Mp3 => {
                MediaKind::Audio
            }
            CodecId::Vp8 | CodecId::Vp9 | CodecId::Theora | CodecId::H264 | CodecId::Mpeg4 => {
                MediaKind::Video
            }
        }
    }
}

/// Whether a stream carries audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Capabilities of a compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionFlags(u8);

impl CompressionFlags {
    pub const NONE: CompressionFlags = CompressionFlags(0);
    /// The stream contains predicted frames
    pub const HAS_P_FRAMES: CompressionFlags = CompressionFlags(1 << 0);
    /// The stream contains frames predicted from later frames
    pub const HAS_B_FRAMES: CompressionFlags = CompressionFlags(1 << 1);
    /// AAC with spectral band replication, timestamps run at half rate
    pub const SBR: CompressionFlags = CompressionFlags(1 << 2);

    pub const fn contains(self, other: CompressionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CompressionFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for CompressionFlags {
    type Output = CompressionFlags;

    fn bitor(self, rhs: CompressionFlags) -> CompressionFlags {
        CompressionFlags(self.0 | rhs.0)
    }
}

/// Describes the compressed format of a stream.
///
/// Produced by an encoder once at initialisation and attached to the output
/// stream when it is opened. It is not changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionInfo {
    pub codec: CodecId,
    /// Out-of-band codec configuration, e.g. an `OpusHead` or FLAC `STREAMINFO`
    pub codec_header: Bytes,
    /// Samples to discard at the start of decoding
    pub pre_skip: u32,
    /// Nominal bitrate in bits per second, 0 if unknown
    pub bitrate: u32,
    pub flags: CompressionFlags,
    /// Name and version of the library that produced the stream
    pub software: Option<String>,
}

impl CompressionInfo {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            codec_header: Bytes::new(),
            pre_skip: 0,
            bitrate: 0,
            flags: CompressionFlags::NONE,
            software: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<Bytes>) -> Self {
        self.codec_header = header.into();
        self
    }

    pub fn with_flags(mut self, flags: CompressionFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    pub fn has_b_frames(&self) -> bool {
        self.flags.contains(CompressionFlags::HAS_B_FRAMES)
    }
}

/// Ordered `key = value` tags, e.g. title and artist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    entries: Vec<(String, String)>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key`, replacing an earlier value with the same case-insensitive key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns these tags with every entry of `overrides` applied on top.
    pub fn merged(&self, overrides: &Tags) -> Tags {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.set(key, value);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

mod delay;
mod frame;
mod packet;
pub mod pts_cache;
pub mod timestamp;

pub use delay::DelaySlot;
pub use frame::*;
pub use packet::*;
pub use pts_cache::{CachedFrame, FrameTypeTracker, PtsCache, DEFAULT_PTS_CACHE_DEPTH};
pub use timestamp::{rescale, AudioTimeline, DtsGenerator, Rational, VideoTimebase};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_merge_overrides_case_insensitively() {
        let global = Tags::new().with("TITLE", "Album").with("ARTIST", "Band");
        let stream = Tags::new().with("title", "Track 1");
        let merged = global.merged(&stream);
        assert_eq!(merged.get("Title"), Some("Track 1"));
        assert_eq!(merged.get("artist"), Some("Band"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_codec_kind() {
        assert_eq!(CodecId::Opus.kind(), MediaKind::Audio);
        assert_eq!(CodecId::Vp8.kind(), MediaKind::Video);
    }
}
