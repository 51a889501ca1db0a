use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::mapping::{header_packets, is_supported};
use super::page::{IoPageSink, PageBuilder, PageSink};
use super::serial::{SequentialSerials, SerialAllocator};
use super::stream::OggStream;
use crate::av::{AudioFrame, CompressionInfo, MediaFrame, MediaKind, Packet, Tags, VideoFrame};
use crate::codec::Encoder;
use crate::config::Config;
use crate::error::{EncMuxError, Result};
use crate::format::PacketSink;

/// Where the packets of a stream come from
enum Source {
    Encoder(Box<dyn Encoder>),
    Compressed,
}

struct MuxerStream {
    kind: MediaKind,
    source: Source,
    info: Option<CompressionInfo>,
    tags: Tags,
    ogg: OggStream,
}

/// Feeds encoder output into one logical stream.
struct StreamWriter<'a, S: PageSink> {
    ogg: &'a mut OggStream,
    pages: &'a mut S,
}

impl<S: PageSink> PacketSink for StreamWriter<'_, S> {
    fn put(&mut self, packet: Packet) -> Result<()> {
        self.ogg.accept(packet, &mut *self.pages)
    }
}

/// Ogg file writer.
///
/// Streams are added before [`start`](Self::start), either with an encoder
/// that turns raw frames into packets or as compressed streams that take
/// finished packets. Each stream becomes one logical bitstream with its own
/// serial number; every page goes to the same [`PageSink`].
///
/// Once a page write fails nothing more is written to the sink. Later calls
/// return [`EncMuxError::OutputFailed`], and so does [`close`](Self::close).
///
/// # Examples
///
/// ```
/// use encmux::av::{CodecId, CompressionInfo, Packet, Tags};
/// use encmux::config::Config;
/// use encmux::format::OggMuxer;
///
/// let mut out: Vec<u8> = Vec::new();
/// let mut muxer = OggMuxer::new(&mut out, Config::default());
///
/// let mut streaminfo = b"fLaC\x80\x00\x00\x22".to_vec();
/// streaminfo.extend_from_slice(&[0u8; 34]);
/// let info = CompressionInfo::new(CodecId::Flac).with_header(streaminfo);
/// let index = muxer.add_audio_stream_compressed(info, Tags::new());
///
/// muxer.start().unwrap();
/// muxer
///     .write_packet(index, Packet::new(vec![0xFF, 0xF8]).with_pts(0).with_duration(4096))
///     .unwrap();
/// muxer.close(false).unwrap();
/// drop(muxer);
/// assert_eq!(&out[..4], b"OggS");
/// ```
pub struct OggMuxer<S: PageSink> {
    sink: S,
    config: Config,
    serials: Box<dyn SerialAllocator>,
    streams: Vec<MuxerStream>,
    global_tags: Tags,
    path: Option<PathBuf>,
    started: bool,
    closed: bool,
    failed: bool,
}

impl OggMuxer<IoPageSink<BufWriter<File>>> {
    /// Creates the file at `path`
    ///
    /// A muxer created this way can remove the file again when it is closed
    /// with `discard`.
    pub fn create<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        log::info!("writing ogg file {}", path.display());
        let mut muxer = Self::new(IoPageSink::new(BufWriter::new(file)), config);
        muxer.path = Some(path.to_path_buf());
        Ok(muxer)
    }
}

impl<S: PageSink> OggMuxer<S> {
    pub fn new(sink: S, config: Config) -> Self {
        let serials = Box::new(SequentialSerials::from_seed(config.serial_seed));
        Self {
            sink,
            config,
            serials,
            streams: Vec::new(),
            global_tags: Tags::new(),
            path: None,
            started: false,
            closed: false,
            failed: false,
        }
    }

    /// Replaces the serial number source
    pub fn with_serials(mut self, serials: impl SerialAllocator + 'static) -> Self {
        self.serials = Box::new(serials);
        self
    }

    /// Tags written to every stream, overridden by stream tags
    pub fn set_global_tags(&mut self, tags: Tags) {
        self.global_tags = tags;
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Serial number of the current logical stream at `index`
    pub fn serial(&self, index: usize) -> Option<u32> {
        self.streams.get(index).map(|s| s.ogg.serial())
    }

    /// Compression info of a stream, known once the muxer is started
    pub fn compression_info(&self, index: usize) -> Option<&CompressionInfo> {
        self.streams.get(index).and_then(|s| s.info.as_ref())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether writing to the sink failed
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn add_audio_stream(&mut self, encoder: Box<dyn Encoder>, tags: Tags) -> usize {
        self.add_stream(MediaKind::Audio, Source::Encoder(encoder), None, tags)
    }

    pub fn add_video_stream(&mut self, encoder: Box<dyn Encoder>, tags: Tags) -> usize {
        self.add_stream(MediaKind::Video, Source::Encoder(encoder), None, tags)
    }

    /// Adds an audio stream that takes already compressed packets
    pub fn add_audio_stream_compressed(&mut self, info: CompressionInfo, tags: Tags) -> usize {
        self.add_stream(MediaKind::Audio, Source::Compressed, Some(info), tags)
    }

    pub fn add_video_stream_compressed(&mut self, info: CompressionInfo, tags: Tags) -> usize {
        self.add_stream(MediaKind::Video, Source::Compressed, Some(info), tags)
    }

    fn add_stream(
        &mut self,
        kind: MediaKind,
        source: Source,
        info: Option<CompressionInfo>,
        tags: Tags,
    ) -> usize {
        let serial = self.serials.next_serial();
        let pages = PageBuilder::with_fill_target(serial, self.config.page_fill_target);
        let ogg = OggStream::new(pages).with_flush_every_packet(self.config.flush_every_packet);
        self.streams.push(MuxerStream {
            kind,
            source,
            info,
            tags,
            ogg,
        });
        log::debug!("added {:?} stream with serial {:08x}", kind, serial);
        self.streams.len() - 1
    }

    /// Opens every encoder and writes the stream headers
    ///
    /// The identification packet of each stream gets a page of its own, so
    /// all beginning-of-stream pages come first. Remaining header pages follow.
    /// Nothing is written unless every stream has an Ogg mapping.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.failed {
            return Err(EncMuxError::OutputFailed);
        }
        if self.closed {
            return Err(EncMuxError::StreamClosed);
        }
        for stream in &mut self.streams {
            if let Source::Encoder(encoder) = &mut stream.source {
                stream.info = Some(encoder.init()?);
            }
        }
        for stream in &self.streams {
            let info = stream.info.as_ref().ok_or(EncMuxError::NotInitialized)?;
            if !is_supported(info.codec) {
                log::error!("{:?} has no ogg mapping", info.codec);
                return Err(EncMuxError::UnsupportedCodec(info.codec));
            }
        }
        let result = self.write_headers();
        self.track_failure(result)?;
        self.started = true;
        Ok(())
    }

    fn write_headers(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            let info = stream.info.as_ref().ok_or(EncMuxError::NotInitialized)?;
            for packet in header_packets(info, &self.global_tags, &stream.tags)? {
                stream.ogg.write_header_packet(packet, &mut self.sink)?;
            }
        }
        for stream in &mut self.streams {
            stream.ogg.flush(true, &mut self.sink)?;
        }
        Ok(())
    }

    /// Marks the whole output failed once any stream saw a page write fail
    fn track_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if !self.failed && self.streams.iter().any(|s| s.ogg.is_failed()) {
            log::error!("ogg output failed, no further pages are written");
            self.failed = true;
        }
        result
    }

    pub fn write_audio_frame(&mut self, index: usize, frame: AudioFrame) -> Result<()> {
        self.encode(index, MediaKind::Audio, frame.into())
    }

    pub fn write_video_frame(&mut self, index: usize, frame: VideoFrame) -> Result<()> {
        self.encode(index, MediaKind::Video, frame.into())
    }

    fn encode(&mut self, index: usize, kind: MediaKind, frame: MediaFrame) -> Result<()> {
        self.check_running()?;
        let stream = self
            .streams
            .get_mut(index)
            .ok_or(EncMuxError::NoSuchStream(index))?;
        if stream.kind != kind {
            return Err(EncMuxError::InvalidData(format!(
                "{:?} frame for {:?} stream {}",
                kind, stream.kind, index
            )));
        }
        let result = match &mut stream.source {
            Source::Encoder(encoder) => {
                let mut writer = StreamWriter {
                    ogg: &mut stream.ogg,
                    pages: &mut self.sink,
                };
                encoder.encode(frame, &mut writer)
            }
            Source::Compressed => Err(EncMuxError::InvalidData(format!(
                "stream {} takes compressed packets",
                index
            ))),
        };
        self.track_failure(result)
    }

    /// Writes a compressed packet to a stream added with `add_*_compressed`
    pub fn write_packet(&mut self, index: usize, packet: Packet) -> Result<()> {
        self.check_running()?;
        let stream = self
            .streams
            .get_mut(index)
            .ok_or(EncMuxError::NoSuchStream(index))?;
        if !matches!(stream.source, Source::Compressed) {
            return Err(EncMuxError::InvalidData(format!(
                "stream {} is fed by an encoder",
                index
            )));
        }
        let result = stream.ogg.accept(packet, &mut self.sink);
        self.track_failure(result)
    }

    /// Replaces the global tags
    ///
    /// Once started, every logical stream is ended and restarted under a new
    /// serial number with fresh headers, which chains a new segment carrying
    /// the new tags.
    pub fn update_metadata(&mut self, tags: Tags) -> Result<()> {
        self.global_tags = tags;
        if !self.started {
            return Ok(());
        }
        self.check_running()?;
        let result = self.chain_segment();
        self.track_failure(result)
    }

    fn chain_segment(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            let serial = self.serials.next_serial();
            stream.ogg.reset(serial, &mut self.sink)?;
        }
        log::info!("chained new segment after metadata update");
        self.write_headers()
    }

    /// Drains the encoders, ends every stream and finishes the output
    ///
    /// All streams are closed even if one fails; the first error is returned.
    /// After a failed page write nothing more is written and the result is
    /// [`EncMuxError::OutputFailed`]. The output file is removed when `discard`
    /// is set, or when closing failed and [`Config::delete_on_error`] is set,
    /// but only if the muxer created it.
    pub fn close(&mut self, discard: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        for (index, stream) in self.streams.iter_mut().enumerate() {
            if self.failed {
                break;
            }
            if let Source::Encoder(encoder) = &mut stream.source {
                let mut writer = StreamWriter {
                    ogg: &mut stream.ogg,
                    pages: &mut self.sink,
                };
                if let Err(err) = encoder.close(&mut writer) {
                    log::error!("closing encoder of stream {} failed: {}", index, err);
                    result = result.and(Err(err));
                }
            }
            if let Err(err) = stream.ogg.close(&mut self.sink) {
                log::error!("closing stream {} failed: {}", index, err);
                result = result.and(Err(err));
            }
            self.failed |= stream.ogg.is_failed();
        }
        if self.failed {
            result = result.and(Err(EncMuxError::OutputFailed));
        } else {
            result = result.and(self.sink.finish());
        }

        let delete = discard || (result.is_err() && self.config.delete_on_error);
        if delete {
            if let Some(path) = &self.path {
                log::info!("removing {}", path.display());
                if let Err(err) = fs::remove_file(path) {
                    result = result.and(Err(err.into()));
                }
            }
        }
        result
    }

    fn check_running(&self) -> Result<()> {
        if self.failed {
            Err(EncMuxError::OutputFailed)
        } else if self.closed {
            Err(EncMuxError::StreamClosed)
        } else if !self.started {
            Err(EncMuxError::NotInitialized)
        } else {
            Ok(())
        }
    }
}
