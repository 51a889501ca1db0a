//! Opus encoding with Ogg Opus conventions: `OpusHead` identification
//! header, 48 kHz timestamps and pre-skip.

mod encoder;
mod types;

pub use encoder::{Application, BitrateMode, OpusBackend, OpusEncoder, OpusSettings};
pub use types::{
    nearest_sample_rate, ChannelLayout, ChannelMapping, FrameDuration, OpusHead, MAX_CHANNELS,
    OPUS_CLOCK, SAMPLE_RATES,
};
