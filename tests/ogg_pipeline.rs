mod common;

use common::{init_logging, MockFlac, MockH264, MockOpus};
use encmux::av::{
    AudioFormat, AudioFrame, CodecId, CompressionInfo, FrameType, Packet, Rational, Tags,
    VideoFrame, VideoTimebase,
};
use encmux::codec::opus::{OpusHead, OpusSettings};
use encmux::codec::{AudioEncoder, Encoder, OpusEncoder, VideoEncoder, VideoEncoderOptions};
use encmux::config::Config;
use encmux::format::ogg::page::{read_packets, read_pages, Page};
use encmux::format::ogg::SequentialSerials;
use encmux::format::{MuxStream, OggMuxer};
use encmux::EncMuxError;
use pretty_assertions::assert_eq;

fn opus_encoder(lookahead: u32) -> Box<dyn Encoder> {
    Box::new(OpusEncoder::new(
        MockOpus::new(lookahead),
        AudioFormat::new(48000, 2, 2),
        OpusSettings::default(),
    ))
}

fn flac_encoder() -> Box<dyn Encoder> {
    Box::new(AudioEncoder::new(
        MockFlac::new(4096),
        AudioFormat::new(44100, 1, 2),
    ))
}

fn pages_of(pages: &[Page], serial: u32) -> Vec<&Page> {
    pages.iter().filter(|p| p.serial() == serial).collect()
}

#[test]
fn test_opus_file_layout() {
    init_logging();
    let mut out: Vec<u8> = Vec::new();
    let mut muxer =
        OggMuxer::new(&mut out, Config::default()).with_serials(SequentialSerials::new(0x1000));
    let opus = muxer.add_audio_stream(opus_encoder(312), Tags::new().with("title", "Tone"));
    muxer.start().unwrap();
    assert_eq!(muxer.compression_info(opus).unwrap().pre_skip, 312);

    let format = AudioFormat::new(48000, 2, 2);
    muxer
        .write_audio_frame(opus, AudioFrame::silence(&format, 4800, 0))
        .unwrap();
    muxer.close(false).unwrap();
    drop(muxer);

    let pages = read_pages(&out).unwrap();
    assert!(pages[0].is_bos());
    assert_eq!(pages[0].granule_position(), 0);
    let head = OpusHead::parse(&pages[0].body).unwrap();
    assert_eq!(head.pre_skip, 312);
    assert_eq!(head.input_sample_rate, 48000);

    let packets = read_packets(&pages, 0x1000);
    // OpusHead, OpusTags, five full frames and the padded remainder
    assert_eq!(packets.len(), 8);
    assert_eq!(&packets[1][..8], b"OpusTags");
    let tags = String::from_utf8_lossy(&packets[1]);
    assert!(tags.contains("mock opus 1.0"));
    assert!(tags.contains("TITLE=Tone"));

    let last = pages.last().unwrap();
    assert!(last.is_eos());
    assert_eq!(last.granule_position(), 4800);
    assert_eq!(pages.iter().filter(|p| p.is_eos()).count(), 1);
}

#[test]
fn test_flac_granules_follow_samples() {
    init_logging();
    let mut out: Vec<u8> = Vec::new();
    let config = Config {
        flush_every_packet: true,
        ..Config::default()
    };
    let mut muxer = OggMuxer::new(&mut out, config).with_serials(SequentialSerials::new(9));
    let flac = muxer.add_audio_stream(flac_encoder(), Tags::new());
    muxer.start().unwrap();

    let format = AudioFormat::new(44100, 1, 2);
    for n in 0..5 {
        muxer
            .write_audio_frame(flac, AudioFrame::silence(&format, 2000, n * 2000))
            .unwrap();
    }
    muxer.close(false).unwrap();
    drop(muxer);

    let pages = read_pages(&out).unwrap();
    let id = &pages[0].body;
    assert_eq!(&id[..5], b"\x7FFLAC");
    assert_eq!(id[13] & 0x80, 0);

    let granules: Vec<i64> = pages
        .iter()
        .skip(2)
        .map(|p| p.granule_position())
        .collect();
    assert_eq!(granules, vec![4096, 8192, 10000]);
    assert!(pages.last().unwrap().is_eos());
}

#[test]
fn test_multiplexed_streams_start_with_bos_pages() {
    init_logging();
    let mut out: Vec<u8> = Vec::new();
    let mut muxer =
        OggMuxer::new(&mut out, Config::default()).with_serials(SequentialSerials::new(1));
    let opus = muxer.add_audio_stream(opus_encoder(0), Tags::new());
    let flac = muxer.add_audio_stream(flac_encoder(), Tags::new());
    muxer.start().unwrap();

    let opus_format = AudioFormat::new(48000, 2, 2);
    let flac_format = AudioFormat::new(44100, 1, 2);
    for n in 0..3 {
        muxer
            .write_audio_frame(opus, AudioFrame::silence(&opus_format, 960, n * 960))
            .unwrap();
        muxer
            .write_audio_frame(flac, AudioFrame::silence(&flac_format, 4096, n * 4096))
            .unwrap();
    }
    muxer.close(false).unwrap();
    drop(muxer);

    let pages = read_pages(&out).unwrap();
    let bos: Vec<u32> = pages
        .iter()
        .take_while(|p| p.is_bos())
        .map(|p| p.serial())
        .collect();
    assert_eq!(bos, vec![1, 2]);
    assert_eq!(pages.iter().filter(|p| p.is_bos()).count(), 2);

    for serial in [1, 2] {
        let own = pages_of(&pages, serial);
        let sequences: Vec<u32> = own.iter().map(|p| p.sequence()).collect();
        let expected: Vec<u32> = (0..own.len() as u32).collect();
        assert_eq!(sequences, expected);
        assert!(own.last().unwrap().is_eos());
    }
}

#[test]
fn test_metadata_update_chains_segments() {
    init_logging();
    let mut out: Vec<u8> = Vec::new();
    let mut muxer =
        OggMuxer::new(&mut out, Config::default()).with_serials(SequentialSerials::new(40));
    let opus = muxer.add_audio_stream(opus_encoder(0), Tags::new());
    muxer.set_global_tags(Tags::new().with("title", "First"));
    muxer.start().unwrap();

    let format = AudioFormat::new(48000, 2, 2);
    muxer
        .write_audio_frame(opus, AudioFrame::silence(&format, 1920, 0))
        .unwrap();
    muxer
        .update_metadata(Tags::new().with("title", "Second"))
        .unwrap();
    muxer
        .write_audio_frame(opus, AudioFrame::silence(&format, 1920, 1920))
        .unwrap();
    muxer.close(false).unwrap();
    drop(muxer);

    let pages = read_pages(&out).unwrap();
    let first = read_packets(&pages, 40);
    let second = read_packets(&pages, 41);
    assert!(String::from_utf8_lossy(&first[1]).contains("TITLE=First"));
    assert!(String::from_utf8_lossy(&second[1]).contains("TITLE=Second"));
    assert_eq!(&second[0][..8], b"OpusHead");

    // The first segment ends before the second begins.
    let first_eos = pages.iter().position(|p| p.serial() == 40 && p.is_eos());
    let second_bos = pages.iter().position(|p| p.serial() == 41 && p.is_bos());
    assert!(first_eos.unwrap() < second_bos.unwrap());
}

#[test]
fn test_video_streams_have_no_ogg_mapping() {
    init_logging();
    let mut muxer = OggMuxer::new(Vec::<u8>::new(), Config::default());
    let encoder = VideoEncoder::new(MockH264::default(), VideoEncoderOptions::default());
    muxer.add_video_stream(Box::new(encoder), Tags::new());
    assert!(matches!(
        muxer.start(),
        Err(EncMuxError::UnsupportedCodec(CodecId::H264))
    ));
}

#[test]
fn test_video_packets_for_timebase_containers() {
    init_logging();
    let mut encoder = VideoEncoder::new(MockH264::default(), VideoEncoderOptions::default());
    let info = encoder.init().unwrap();
    assert!(info.has_b_frames());

    let mut stream = MuxStream::video(
        Vec::<Packet>::new(),
        25,
        VideoTimebase::Variable,
        Rational::new(1, 1000),
        &info,
    );
    for n in 0..5 {
        encoder
            .encode(VideoFrame::new(32, 32, n, 1).into(), &mut stream)
            .unwrap();
    }
    encoder.close(&mut stream).unwrap();

    let packets: Vec<Packet> = stream.into_inner();
    let summary: Vec<(Option<i64>, Option<i64>, i64, Option<FrameType>)> = packets
        .iter()
        .map(|p| (p.pts, p.dts, p.duration, p.frame_type()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some(0), Some(-120), 40, Some(FrameType::I)),
            (Some(80), Some(-80), 40, Some(FrameType::P)),
            (Some(40), Some(-40), 40, Some(FrameType::B)),
            (Some(160), Some(0), 40, Some(FrameType::P)),
            (Some(120), Some(40), 40, Some(FrameType::B)),
        ]
    );
}

#[test]
fn test_compressed_passthrough_to_file() {
    init_logging();
    let path = std::env::temp_dir().join(format!("encmux-pipeline-{}.ogg", std::process::id()));
    let mut muxer = OggMuxer::create(&path, Config::default()).unwrap();
    let info = CompressionInfo::new(CodecId::Flac).with_header(common::flac_streaminfo());
    let index = muxer.add_audio_stream_compressed(info, Tags::new());
    muxer.start().unwrap();
    for n in 0..3 {
        muxer
            .write_packet(
                index,
                Packet::new(vec![0xFF, 0xF8]).with_pts(n * 1152).with_duration(1152),
            )
            .unwrap();
    }
    muxer.close(false).unwrap();
    drop(muxer);

    let data = std::fs::read(&path).unwrap();
    let pages = read_pages(&data).unwrap();
    assert_eq!(pages.last().unwrap().granule_position(), 3 * 1152);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_discard_removes_file() {
    init_logging();
    let path = std::env::temp_dir().join(format!("encmux-discard-it-{}.ogg", std::process::id()));
    let mut muxer = OggMuxer::create(&path, Config::default()).unwrap();
    let opus = muxer.add_audio_stream(opus_encoder(0), Tags::new());
    muxer.start().unwrap();
    let format = AudioFormat::new(48000, 2, 2);
    muxer
        .write_audio_frame(opus, AudioFrame::silence(&format, 960, 0))
        .unwrap();
    muxer.close(true).unwrap();
    assert!(!path.exists());
}
