use bytes::Bytes;

use crate::error::{EncMuxError, Result};

/// A decoded video picture.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Pixel planes in the layout the codec expects
    pub planes: Vec<Bytes>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in stream timescale units
    pub timestamp: i64,
    /// Display duration in stream timescale units
    pub duration: i64,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp: i64, duration: i64) -> Self {
        Self {
            planes: Vec::new(),
            width,
            height,
            timestamp,
            duration,
        }
    }

    pub fn with_plane(mut self, plane: impl Into<Bytes>) -> Self {
        self.planes.push(plane.into());
        self
    }
}

/// Sample layout of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u8,
    /// Bytes per sample of one channel
    pub bytes_per_sample: u8,
    /// Samples per channel in one codec frame, 0 when not yet known
    pub samples_per_frame: usize,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u8, bytes_per_sample: u8) -> Self {
        Self {
            sample_rate,
            channels,
            bytes_per_sample,
            samples_per_frame: 0,
        }
    }

    /// Bytes occupied by one sample of every channel.
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }
}

/// A run of interleaved decoded audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved samples
    pub data: Bytes,
    /// Number of valid samples per channel in `data`
    pub valid_samples: usize,
    /// Timestamp of the first sample in stream timescale units
    pub timestamp: i64,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, valid_samples: usize, timestamp: i64) -> Self {
        Self {
            data: data.into(),
            valid_samples,
            timestamp,
        }
    }

    /// Builds a frame of `samples` silent samples per channel.
    pub fn silence(format: &AudioFormat, samples: usize, timestamp: i64) -> Self {
        Self::new(vec![0u8; samples * format.block_align()], samples, timestamp)
    }

    /// Checks that `data` holds at least `valid_samples` samples of `format`.
    pub fn validate(&self, format: &AudioFormat) -> Result<()> {
        let needed = self.valid_samples * format.block_align();
        if self.data.len() < needed {
            return Err(EncMuxError::InvalidData(format!(
                "audio frame holds {} bytes, {} samples need {}",
                self.data.len(),
                self.valid_samples,
                needed
            )));
        }
        Ok(())
    }
}

/// A decoded frame of either kind, as handed to an [`Encoder`](crate::codec::Encoder).
#[derive(Debug, Clone, PartialEq)]
pub enum MediaFrame {
    Audio(AudioFrame),
    Video(VideoFrame),
}

impl From<AudioFrame> for MediaFrame {
    fn from(frame: AudioFrame) -> Self {
        MediaFrame::Audio(frame)
    }
}

impl From<VideoFrame> for MediaFrame {
    fn from(frame: VideoFrame) -> Self {
        MediaFrame::Video(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_validation() {
        let format = AudioFormat::new(48000, 2, 2);
        assert!(AudioFrame::silence(&format, 960, 0).validate(&format).is_ok());

        let short = AudioFrame::new(vec![0u8; 10], 960, 0);
        assert!(matches!(
            short.validate(&format),
            Err(EncMuxError::InvalidData(_))
        ));
    }
}
