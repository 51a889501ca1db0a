use std::fmt;

use crate::error::{EncMuxError, Result};

/// A rational number, used for time bases.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Time base of a stream counting `timescale` ticks per second.
    pub const fn from_timescale(timescale: u32) -> Self {
        Self {
            num: 1,
            den: timescale as i64,
        }
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Converts `value` from time base `from` to time base `to`, rounding to the
/// nearest tick with halves away from zero.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    if den == 0 {
        return value;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Presentation timing of an audio encoder's output.
///
/// Audio encoders only return payloads; the timestamps are reconstructed from
/// the number of samples fed in and the encoder's delay. The first output packet
/// starts `delay` samples before the first input sample, and no packet may end
/// after the last sample submitted so far.
#[derive(Debug, Clone)]
pub struct AudioTimeline {
    delay: i64,
    in_pts: Option<i64>,
    out_pts: i64,
}

impl AudioTimeline {
    pub fn new(delay: i64) -> Self {
        Self {
            delay,
            in_pts: None,
            out_pts: 0,
        }
    }

    /// Anchors the timeline on the first input timestamp. Later calls are ignored.
    pub fn start(&mut self, first_timestamp: i64) {
        if self.in_pts.is_none() {
            self.in_pts = Some(first_timestamp);
            self.out_pts = first_timestamp - self.delay;
        }
    }

    pub fn is_started(&self) -> bool {
        self.in_pts.is_some()
    }

    /// Accounts for `samples` more input samples handed to the encoder.
    pub fn advance_input(&mut self, samples: usize) -> Result<()> {
        let in_pts = self.in_pts.as_mut().ok_or(EncMuxError::NotInitialized)?;
        *in_pts += samples as i64;
        Ok(())
    }

    /// Returns `(pts, duration)` for the next output packet of nominally
    /// `frame_samples` samples.
    pub fn next_packet(&mut self, frame_samples: usize) -> Result<(i64, i64)> {
        let in_pts = self.in_pts.ok_or(EncMuxError::NotInitialized)?;
        let pts = self.out_pts;
        let mut duration = frame_samples as i64;
        if pts + duration > in_pts {
            duration = (in_pts - pts).max(0);
        }
        self.out_pts += duration;
        Ok((pts, duration))
    }

    pub fn delay(&self) -> i64 {
        self.delay
    }

    pub fn in_pts(&self) -> Option<i64> {
        self.in_pts
    }

    pub fn out_pts(&self) -> i64 {
        self.out_pts
    }
}

/// Produces decoding timestamps for containers that store them.
///
/// Streams without B-frames decode in presentation order, so `dts = pts`.
/// Streams with B-frames start three frame durations before the first pts and
/// advance by each packet's duration, which keeps dts monotonic and never ahead
/// of pts for the usual reorder depths.
#[derive(Debug, Clone)]
pub struct DtsGenerator {
    has_b_frames: bool,
    next_dts: Option<i64>,
}

impl DtsGenerator {
    pub fn new(has_b_frames: bool) -> Self {
        Self {
            has_b_frames,
            next_dts: None,
        }
    }

    pub fn next(&mut self, pts: i64, duration: i64) -> i64 {
        if !self.has_b_frames {
            return pts;
        }
        let dts = *self.next_dts.get_or_insert(pts - 3 * duration);
        self.next_dts = Some(dts + duration);
        dts
    }
}

/// How video timestamps are presented to a native encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTimebase {
    /// Every frame lasts `frame_duration` ticks; the encoder sees frame indices.
    Constant { frame_duration: i64 },
    /// The encoder sees stream timestamps unchanged.
    Variable,
}

impl VideoTimebase {
    pub fn to_codec(self, timestamp: i64) -> i64 {
        match self {
            VideoTimebase::Constant { frame_duration } if frame_duration > 0 => {
                timestamp / frame_duration
            }
            _ => timestamp,
        }
    }

    pub fn from_codec(self, pts: i64) -> i64 {
        match self {
            VideoTimebase::Constant { frame_duration } if frame_duration > 0 => {
                pts * frame_duration
            }
            _ => pts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let ms = Rational::new(1, 1000);
        let khz90 = Rational::from_timescale(90000);
        assert_eq!(rescale(1, ms, khz90), 90);
        assert_eq!(rescale(90, khz90, ms), 1);
        assert_eq!(rescale(45, khz90, ms), 1);
        assert_eq!(rescale(44, khz90, ms), 0);
        assert_eq!(rescale(-45, khz90, ms), -1);
        assert_eq!(rescale(1024, Rational::from_timescale(44100), Rational::from_timescale(48000)), 1115);
    }

    #[quickcheck]
    fn prop_rescale_identity(value: i32, timescale: u16) -> bool {
        let base = Rational::from_timescale(timescale as u32 + 1);
        rescale(value as i64, base, base) == value as i64
    }

    #[test]
    fn test_audio_timeline_with_delay() {
        let mut timeline = AudioTimeline::new(576);
        timeline.start(0);
        timeline.advance_input(1152).unwrap();
        assert_eq!(timeline.next_packet(1152).unwrap(), (-576, 1152));
        timeline.advance_input(100).unwrap();
        // Only 100 samples remain before the input end.
        assert_eq!(timeline.next_packet(1152).unwrap(), (576, 676));
        assert_eq!(timeline.out_pts(), 1252);
    }

    #[test]
    fn test_audio_timeline_requires_start() {
        let mut timeline = AudioTimeline::new(0);
        assert!(matches!(
            timeline.next_packet(1024),
            Err(EncMuxError::NotInitialized)
        ));
        timeline.start(500);
        timeline.start(9000);
        assert_eq!(timeline.in_pts(), Some(500));
    }

    #[test]
    fn test_dts_generation() {
        let mut plain = DtsGenerator::new(false);
        assert_eq!(plain.next(40, 10), 40);

        let mut reordered = DtsGenerator::new(true);
        let dts: Vec<i64> = [(0, 10), (30, 10), (10, 10), (20, 10)]
            .iter()
            .map(|&(pts, duration)| reordered.next(pts, duration))
            .collect();
        assert_eq!(dts, vec![-30, -20, -10, 0]);
    }

    #[test]
    fn test_constant_timebase() {
        let tb = VideoTimebase::Constant { frame_duration: 3003 };
        assert_eq!(tb.to_codec(6006), 2);
        assert_eq!(tb.from_codec(2), 6006);
        assert_eq!(VideoTimebase::Variable.to_codec(6006), 6006);
    }
}
