use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;

use crate::error::{EncMuxError, Result};
use crate::utils::OggCrc;

/// Capture pattern at the start of every page
pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Body size at which a page is emitted without being forced
pub const DEFAULT_FILL_TARGET: usize = 4096;

/// Fixed part of the page header, before the segment table
pub const HEADER_FIXED_LEN: usize = 27;

const MAX_SEGMENTS: usize = 255;

/// Header type flag: the first segment continues a packet from the previous page
pub const FLAG_CONTINUED: u8 = 0x01;
/// Header type flag: first page of a logical stream
pub const FLAG_BOS: u8 = 0x02;
/// Header type flag: last page of a logical stream
pub const FLAG_EOS: u8 = 0x04;

/// A logical packet handed to the page layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OggPacket {
    pub data: Bytes,
    /// Granule position at the end of this packet, -1 if none
    pub granule_position: i64,
    /// First packet of the logical stream
    pub bos: bool,
    /// Last packet of the logical stream
    pub eos: bool,
    /// Sequence number among the stream's physical packets
    pub packet_no: i64,
}

/// One serialized page.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    pub header: Bytes,
    pub body: Bytes,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("serial", &self.serial())
            .field("sequence", &self.sequence())
            .field("granule_position", &self.granule_position())
            .field("header_type", &self.header_type())
            .field("segments", &self.lacing().len())
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl Page {
    pub fn header_type(&self) -> u8 {
        self.header[5]
    }

    pub fn is_continued(&self) -> bool {
        self.header_type() & FLAG_CONTINUED != 0
    }

    pub fn is_bos(&self) -> bool {
        self.header_type() & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type() & FLAG_EOS != 0
    }

    pub fn granule_position(&self) -> i64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.header[6..14]);
        i64::from_le_bytes(raw)
    }

    pub fn serial(&self) -> u32 {
        u32::from_le_bytes([self.header[14], self.header[15], self.header[16], self.header[17]])
    }

    pub fn sequence(&self) -> u32 {
        u32::from_le_bytes([self.header[18], self.header[19], self.header[20], self.header[21]])
    }

    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes([self.header[22], self.header[23], self.header[24], self.header[25]])
    }

    /// Segment table
    pub fn lacing(&self) -> &[u8] {
        &self.header[HEADER_FIXED_LEN..]
    }

    /// Number of packets that end on this page
    pub fn packets_completed(&self) -> usize {
        self.lacing().iter().filter(|&&v| v < 255).count()
    }

    /// Header followed by body
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header.len() + self.body.len());
        buf.put_slice(&self.header);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Splits a physical bitstream into pages, verifying each checksum
///
/// # Errors
///
/// Returns [`EncMuxError::InvalidData`] on a missing capture pattern, a
/// truncated page or a checksum mismatch.
pub fn read_pages(data: &[u8]) -> Result<Vec<Page>> {
    let crc = OggCrc::new();
    let mut pages = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < HEADER_FIXED_LEN || &rest[..4] != CAPTURE_PATTERN {
            return Err(EncMuxError::InvalidData(format!(
                "no ogg page at offset {}",
                offset
            )));
        }
        let segments = rest[26] as usize;
        let header_len = HEADER_FIXED_LEN + segments;
        if rest.len() < header_len {
            return Err(EncMuxError::InvalidData("truncated page header".to_string()));
        }
        let body_len: usize = rest[HEADER_FIXED_LEN..header_len]
            .iter()
            .map(|&v| v as usize)
            .sum();
        if rest.len() < header_len + body_len {
            return Err(EncMuxError::InvalidData("truncated page body".to_string()));
        }

        let mut header = BytesMut::from(&rest[..header_len]);
        let stored = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
        header[22..26].fill(0);
        let body = &rest[header_len..header_len + body_len];
        let computed = crc.update(crc.calculate(&header), body);
        if computed != stored {
            return Err(EncMuxError::InvalidData(format!(
                "page checksum mismatch at offset {}: stored {:08x}, computed {:08x}",
                offset, stored, computed
            )));
        }
        header[22..26].copy_from_slice(&stored.to_le_bytes());
        pages.push(Page {
            header: header.freeze(),
            body: Bytes::copy_from_slice(body),
        });
        offset += header_len + body_len;
    }
    Ok(pages)
}

/// Reassembles the packets of logical stream `serial` from `pages`.
///
/// A packet still open after the last page is dropped.
pub fn read_packets(pages: &[Page], serial: u32) -> Vec<Bytes> {
    let mut packets = Vec::new();
    let mut current = BytesMut::new();
    for page in pages.iter().filter(|page| page.serial() == serial) {
        let mut offset = 0;
        for &value in page.lacing() {
            let len = value as usize;
            current.put_slice(&page.body[offset..offset + len]);
            offset += len;
            if value < 255 {
                packets.push(current.split().freeze());
            }
        }
    }
    packets
}

/// Receiver of finished pages.
pub trait PageSink {
    /// Writes one page; any failure is fatal for the output
    fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()>;

    /// Pushes buffered output to its destination, called once at close
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl PageSink for Vec<u8> {
    fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        self.extend_from_slice(header);
        self.extend_from_slice(body);
        Ok(())
    }
}

impl<S: PageSink + ?Sized> PageSink for &mut S {
    fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        (**self).write_page(header, body)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

impl<S: PageSink + ?Sized> PageSink for Box<S> {
    fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        (**self).write_page(header, body)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Writes pages to any [`Write`] implementation.
#[derive(Debug)]
pub struct IoPageSink<W: Write> {
    writer: W,
    bytes_written: u64,
    pages_written: u64,
}

impl<W: Write> IoPageSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            pages_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn pages_written(&self) -> u64 {
        self.pages_written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PageSink for IoPageSink<W> {
    fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        self.writer.write_all(header)?;
        self.writer.write_all(body)?;
        self.bytes_written += (header.len() + body.len()) as u64;
        self.pages_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Page layer of one logical stream.
///
/// Accepts packets and hands back pages once they are due. Implementations
/// decide the physical framing; [`OggStream`](super::OggStream) only relies
/// on this interface.
pub trait PageAccumulator {
    /// Queues one packet
    fn packet_in(&mut self, packet: OggPacket);

    /// Returns the next page if one is due
    fn page_out(&mut self) -> Option<Page>;

    /// Returns the next page from whatever is queued, due or not
    fn flush(&mut self) -> Option<Page>;

    /// Discards queued data and starts a new logical stream with `serial`
    fn reset(&mut self, serial: u32);

    fn serial(&self) -> u32;
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    value: u8,
    granule: i64,
    packet_start: bool,
}

/// Ogg page framing in the manner of libogg.
///
/// Packets are laced into 255-byte segments. A page is due when its body
/// passes the fill target, when 255 segments are queued, while the first page
/// of the stream is still pending, or once end of stream was queued. The first
/// page only ever carries the first packet.
pub struct PageBuilder {
    serial: u32,
    sequence: u32,
    fill_target: usize,
    body: BytesMut,
    segments: VecDeque<Segment>,
    bos_done: bool,
    eos_queued: bool,
    crc: OggCrc,
}

impl fmt::Debug for PageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuilder")
            .field("serial", &self.serial)
            .field("sequence", &self.sequence)
            .field("queued_segments", &self.segments.len())
            .field("queued_bytes", &self.body.len())
            .finish()
    }
}

impl PageBuilder {
    pub fn new(serial: u32) -> Self {
        Self::with_fill_target(serial, DEFAULT_FILL_TARGET)
    }

    pub fn with_fill_target(serial: u32, fill_target: usize) -> Self {
        Self {
            serial,
            sequence: 0,
            fill_target,
            body: BytesMut::new(),
            segments: VecDeque::new(),
            bos_done: false,
            eos_queued: false,
            crc: OggCrc::new(),
        }
    }

    /// Sequence number the next page will get
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    pub fn queued_bytes(&self) -> usize {
        self.body.len()
    }

    fn build_page(&mut self, force: bool) -> Option<Page> {
        let max = self.segments.len().min(MAX_SEGMENTS);
        if max == 0 {
            return None;
        }

        let mut force = force;
        let mut count = 0;
        let mut granule = -1i64;
        if !self.bos_done {
            granule = 0;
            for segment in self.segments.iter().take(max) {
                count += 1;
                if segment.value < 255 {
                    break;
                }
            }
        } else {
            let mut acc = 0usize;
            let mut packets_done = 0;
            let mut packet_just_done = 0;
            for segment in self.segments.iter().take(max) {
                if acc > self.fill_target && packet_just_done >= 4 {
                    force = true;
                    break;
                }
                acc += segment.value as usize;
                if segment.value < 255 {
                    granule = segment.granule;
                    packets_done += 1;
                    packet_just_done = packets_done;
                } else {
                    packet_just_done = 0;
                }
                count += 1;
            }
            if count == MAX_SEGMENTS {
                force = true;
            }
        }
        if !force {
            return None;
        }

        let mut header_type = 0u8;
        if !self.segments[0].packet_start {
            header_type |= FLAG_CONTINUED;
        }
        if !self.bos_done {
            header_type |= FLAG_BOS;
        }
        if self.eos_queued && self.segments.len() == count {
            header_type |= FLAG_EOS;
        }
        self.bos_done = true;

        let mut header = BytesMut::with_capacity(HEADER_FIXED_LEN + count);
        header.put_slice(CAPTURE_PATTERN);
        header.put_u8(0);
        header.put_u8(header_type);
        header.put_i64_le(granule);
        header.put_u32_le(self.serial);
        header.put_u32_le(self.sequence);
        header.put_u32_le(0);
        header.put_u8(count as u8);
        let mut body_len = 0;
        for segment in self.segments.drain(..count) {
            header.put_u8(segment.value);
            body_len += segment.value as usize;
        }
        self.sequence = self.sequence.wrapping_add(1);

        let body = self.body.split_to(body_len).freeze();
        let checksum = self.crc.update(self.crc.calculate(&header), &body);
        header[22..26].copy_from_slice(&checksum.to_le_bytes());

        Some(Page {
            header: header.freeze(),
            body,
        })
    }
}

impl PageAccumulator for PageBuilder {
    fn packet_in(&mut self, packet: OggPacket) {
        let len = packet.data.len();
        let full = len / 255;
        for i in 0..=full {
            let value = if i < full { 255 } else { (len % 255) as u8 };
            self.segments.push_back(Segment {
                value,
                granule: packet.granule_position,
                packet_start: i == 0,
            });
        }
        self.body.put_slice(&packet.data);
        if packet.eos {
            self.eos_queued = true;
        }
    }

    fn page_out(&mut self) -> Option<Page> {
        let queued = !self.segments.is_empty();
        let force = (self.eos_queued && queued)
            || self.body.len() > self.fill_target
            || self.segments.len() >= MAX_SEGMENTS
            || (queued && !self.bos_done);
        self.build_page(force)
    }

    fn flush(&mut self) -> Option<Page> {
        self.build_page(true)
    }

    fn reset(&mut self, serial: u32) {
        self.serial = serial;
        self.sequence = 0;
        self.body.clear();
        self.segments.clear();
        self.bos_done = false;
        self.eos_queued = false;
    }

    fn serial(&self) -> u32 {
        self.serial
    }
}
