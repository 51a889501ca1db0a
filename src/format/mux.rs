use crate::av::{
    rescale, CompressionFlags, CompressionInfo, DtsGenerator, MediaKind, Packet, PacketFlags,
    Rational, VideoTimebase,
};
use crate::error::Result;

use super::PacketSink;

/// Prepares the packets of one stream for a container that stores
/// timestamps in its own time base and needs decoding timestamps.
///
/// Packets without a pts cannot be placed and are dropped. Everything else is
/// rescaled with round-to-nearest, gets a dts from a [`DtsGenerator`] and goes
/// on to the inner sink tagged with the container's stream index.
///
/// Audio with spectral band replication is timed at the output rate by its
/// encoder while the container expects the core rate, so its timestamps are
/// halved.
#[derive(Debug)]
pub struct MuxStream<S: PacketSink> {
    inner: S,
    kind: MediaKind,
    source: Rational,
    target: Rational,
    timebase: VideoTimebase,
    sbr: bool,
    dts: DtsGenerator,
    container_index: usize,
    dropped: u64,
}

impl<S: PacketSink> MuxStream<S> {
    /// Audio timed in samples at `sample_rate`
    pub fn audio(inner: S, sample_rate: u32, target: Rational, info: &CompressionInfo) -> Self {
        Self {
            inner,
            kind: MediaKind::Audio,
            source: Rational::from_timescale(sample_rate),
            target,
            timebase: VideoTimebase::Variable,
            sbr: info.flags.contains(CompressionFlags::SBR),
            dts: DtsGenerator::new(false),
            container_index: 0,
            dropped: 0,
        }
    }

    /// Video timed in ticks of `timescale`
    ///
    /// With a constant frame rate the container counts frames, so timestamps
    /// are converted to frame indices before rescaling.
    pub fn video(
        inner: S,
        timescale: u32,
        timebase: VideoTimebase,
        target: Rational,
        info: &CompressionInfo,
    ) -> Self {
        let source = match timebase {
            VideoTimebase::Constant { frame_duration } if frame_duration > 0 => {
                Rational::new(frame_duration, timescale as i64)
            }
            _ => Rational::from_timescale(timescale),
        };
        Self {
            inner,
            kind: MediaKind::Video,
            source,
            target,
            timebase,
            sbr: false,
            dts: DtsGenerator::new(info.has_b_frames()),
            container_index: 0,
            dropped: 0,
        }
    }

    pub fn with_container_index(mut self, index: usize) -> Self {
        self.container_index = index;
        self
    }

    /// Packets dropped for lack of a pts
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn to_container(&self, ts: i64) -> i64 {
        rescale(self.timebase.to_codec(ts), self.source, self.target)
    }
}

impl<S: PacketSink> PacketSink for MuxStream<S> {
    fn put(&mut self, mut packet: Packet) -> Result<()> {
        let pts = match packet.pts {
            Some(pts) => pts,
            None => {
                self.dropped += 1;
                log::debug!("dropping packet without pts ({} bytes)", packet.data.len());
                return Ok(());
            }
        };

        let mut out_pts = self.to_container(pts);
        let mut out_duration = self.to_container(packet.duration);
        let mut out_dts = match self.kind {
            MediaKind::Video => {
                let dts = self.dts.next(pts, packet.duration);
                self.to_container(dts)
            }
            MediaKind::Audio => out_pts,
        };

        if self.sbr {
            out_pts /= 2;
            out_dts /= 2;
            out_duration /= 2;
        }

        if self.kind == MediaKind::Audio {
            packet.flags.insert(PacketFlags::KEYFRAME);
        }
        packet.pts = Some(out_pts);
        packet.dts = Some(out_dts);
        packet.duration = out_duration;
        packet.stream_index = self.container_index;
        self.inner.put(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::CodecId;
    use pretty_assertions::assert_eq;

    fn timing(packets: &[Packet]) -> Vec<(Option<i64>, Option<i64>, i64)> {
        packets.iter().map(|p| (p.pts, p.dts, p.duration)).collect()
    }

    #[test]
    fn test_drops_packets_without_pts() {
        let info = CompressionInfo::new(CodecId::Aac);
        let mut stream = MuxStream::audio(Vec::<Packet>::new(), 48000, Rational::new(1, 48000), &info);
        stream.put(Packet::new(vec![1])).unwrap();
        stream.put(Packet::new(vec![2]).with_pts(0).with_duration(1024)).unwrap();
        assert_eq!(stream.dropped(), 1);
        assert_eq!(stream.get_ref().len(), 1);
        assert!(stream.get_ref()[0].is_key());
    }

    #[test]
    fn test_audio_rescale_rounds() {
        let info = CompressionInfo::new(CodecId::Mp3);
        let mut stream = MuxStream::audio(Vec::<Packet>::new(), 44100, Rational::new(1, 1000), &info)
            .with_container_index(2);
        stream.put(Packet::new(vec![0]).with_pts(1152).with_duration(1152)).unwrap();
        let out = stream.into_inner();
        assert_eq!(timing(&out), vec![(Some(26), Some(26), 26)]);
        assert_eq!(out[0].stream_index, 2);
    }

    #[test]
    fn test_sbr_halves_timestamps() {
        let info = CompressionInfo::new(CodecId::Aac).with_flags(CompressionFlags::SBR);
        let mut stream = MuxStream::audio(Vec::<Packet>::new(), 44100, Rational::new(1, 44100), &info);
        stream.put(Packet::new(vec![0]).with_pts(2048).with_duration(2048)).unwrap();
        assert_eq!(timing(stream.get_ref()), vec![(Some(1024), Some(1024), 1024)]);
    }

    #[test]
    fn test_video_dts_with_b_frames() {
        let info = CompressionInfo::new(CodecId::H264)
            .with_flags(CompressionFlags::HAS_B_FRAMES | CompressionFlags::HAS_P_FRAMES);
        let mut stream = MuxStream::video(
            Vec::<Packet>::new(),
            90000,
            VideoTimebase::Variable,
            Rational::new(1, 90000),
            &info,
        );
        for pts in [0, 9000, 3000, 6000] {
            stream
                .put(Packet::new(vec![0]).with_pts(pts).with_duration(3000))
                .unwrap();
        }
        let dts: Vec<Option<i64>> = stream.get_ref().iter().map(|p| p.dts).collect();
        assert_eq!(dts, vec![Some(-9000), Some(-6000), Some(-3000), Some(0)]);
        assert!(stream.get_ref().iter().all(|p| p.dts <= p.pts));
    }

    #[test]
    fn test_constant_frame_rate_counts_frames() {
        let info = CompressionInfo::new(CodecId::Mpeg4);
        let mut stream = MuxStream::video(
            Vec::<Packet>::new(),
            30000,
            VideoTimebase::Constant {
                frame_duration: 1001,
            },
            Rational::new(1001, 30000),
            &info,
        );
        stream
            .put(
                Packet::new(vec![0])
                    .with_pts(2002)
                    .with_duration(1001)
                    .with_key_flag(true),
            )
            .unwrap();
        stream.put(Packet::new(vec![0]).with_pts(3003).with_duration(1001)).unwrap();
        let out = stream.into_inner();
        assert_eq!(
            timing(&out),
            vec![(Some(2), Some(2), 1), (Some(3), Some(3), 1)]
        );
        assert!(out[0].is_key());
        assert!(!out[1].is_key());
    }
}
