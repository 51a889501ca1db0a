#![allow(dead_code)]

use std::collections::VecDeque;

use encmux::av::{AudioFrame, CodecId, VideoFrame};
use encmux::codec::opus::{ChannelMapping, OpusBackend, OpusSettings};
use encmux::codec::{NativeAudioCodec, NativeCodecInfo, NativeVideoCodec, RawPacket};
use encmux::Result;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `fLaC` marker followed by a last-block STREAMINFO
pub fn flac_streaminfo() -> Vec<u8> {
    let mut header = b"fLaC".to_vec();
    header.extend_from_slice(&[0x80, 0x00, 0x00, 0x22]);
    header.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]);
    header.extend_from_slice(&[0u8; 30]);
    header
}

/// Opus backend that returns a two byte packet per frame
#[derive(Debug, Default)]
pub struct MockOpus {
    pub lookahead: u32,
    pub frames: usize,
}

impl MockOpus {
    pub fn new(lookahead: u32) -> Self {
        Self {
            lookahead,
            frames: 0,
        }
    }
}

impl OpusBackend for MockOpus {
    fn open(&mut self, _rate: u32, _mapping: &ChannelMapping, _settings: &OpusSettings) -> Result<()> {
        Ok(())
    }

    fn lookahead(&self) -> Result<u32> {
        Ok(self.lookahead)
    }

    fn encode(&mut self, _pcm: &[u8], _frame_samples: usize, out: &mut [u8]) -> Result<usize> {
        out[0] = 0xFC;
        out[1] = self.frames as u8;
        self.frames += 1;
        Ok(2)
    }

    fn version(&self) -> String {
        "mock opus 1.0".to_string()
    }
}

/// FLAC-like codec: fixed frame size, no delay, one packet per frame
#[derive(Debug)]
pub struct MockFlac {
    frame_size: usize,
    ready: VecDeque<RawPacket>,
}

impl MockFlac {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            ready: VecDeque::new(),
        }
    }
}

impl NativeAudioCodec for MockFlac {
    fn open(&mut self) -> Result<NativeCodecInfo> {
        let mut info = NativeCodecInfo::new(CodecId::Flac);
        info.extradata = flac_streaminfo().into();
        info.frame_size = self.frame_size;
        Ok(info)
    }

    fn send_frame(&mut self, frame: Option<AudioFrame>) -> Result<()> {
        if let Some(frame) = frame {
            let samples = frame.valid_samples as u16;
            let mut data = vec![0xFF, 0xF8];
            data.extend_from_slice(&samples.to_be_bytes());
            self.ready.push_back(RawPacket::new(data));
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<RawPacket>> {
        Ok(self.ready.pop_front())
    }
}

/// Video codec with one B-frame between references (I P B P B ...)
#[derive(Debug, Default)]
pub struct MockH264 {
    held: Option<i64>,
    count: usize,
    ready: VecDeque<RawPacket>,
}

impl NativeVideoCodec for MockH264 {
    fn open(&mut self) -> Result<NativeCodecInfo> {
        let mut info = NativeCodecInfo::new(CodecId::H264);
        info.gop_size = 30;
        info.max_b_frames = 1;
        Ok(info)
    }

    fn send_frame(&mut self, frame: Option<VideoFrame>) -> Result<()> {
        match frame {
            Some(frame) => {
                let index = self.count;
                self.count += 1;
                if index == 0 {
                    self.ready
                        .push_back(RawPacket::new(vec![0x65]).with_pts(frame.timestamp).with_key_flag(true));
                } else if let Some(b) = self.held.take() {
                    self.ready.push_back(RawPacket::new(vec![0x41]).with_pts(frame.timestamp));
                    self.ready.push_back(RawPacket::new(vec![0x01]).with_pts(b));
                } else {
                    self.held = Some(frame.timestamp);
                }
            }
            None => {
                if let Some(last) = self.held.take() {
                    self.ready.push_back(RawPacket::new(vec![0x41]).with_pts(last));
                }
            }
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<RawPacket>> {
        Ok(self.ready.pop_front())
    }
}
