use bytes::Bytes;

use super::page::{OggPacket, PageAccumulator, PageBuilder, PageSink};
use crate::av::{DelaySlot, Packet};
use crate::error::{EncMuxError, Result};

/// One logical stream of an Ogg physical bitstream.
///
/// Data packets are held back by one position: a packet only reaches the page
/// layer once its successor arrives or the stream is closed, so the packet that
/// finally carries end-of-stream is always the last one written. End-of-stream
/// is decided here and never taken from the incoming packet.
///
/// ```text
///            accept(p)                    accept(q)
///   EMPTY ─────────────▶ HOLDING(p) ─────────────────▶ HOLDING(q)   p written, eos off
///                            │
///                            │ close()                 p written, eos on, pages flushed
///                            ▼
///                          CLOSED
/// ```
///
/// Packet numbers count every physical packet, headers included, and the
/// packet written while the number is zero carries beginning-of-stream.
///
/// A failed page write leaves a gap in the output, so the stream refuses
/// every further write with [`EncMuxError::OutputFailed`].
#[derive(Debug)]
pub struct OggStream<A: PageAccumulator = PageBuilder> {
    pages: A,
    held: DelaySlot<Packet>,
    packet_no: i64,
    num_headers: usize,
    packets_written: u64,
    flush_every_packet: bool,
    closed: bool,
    failed: bool,
}

impl OggStream<PageBuilder> {
    /// Creates a stream with the standard page layer
    pub fn with_serial(serial: u32) -> Self {
        Self::new(PageBuilder::new(serial))
    }
}

impl<A: PageAccumulator> OggStream<A> {
    pub fn new(pages: A) -> Self {
        Self {
            pages,
            held: DelaySlot::new(),
            packet_no: 0,
            num_headers: 0,
            packets_written: 0,
            flush_every_packet: false,
            closed: false,
            failed: false,
        }
    }

    /// Emits a page after every packet instead of filling pages
    pub fn with_flush_every_packet(mut self, enabled: bool) -> Self {
        self.flush_every_packet = enabled;
        self
    }

    pub fn serial(&self) -> u32 {
        self.pages.serial()
    }

    /// Number the next physical packet will get
    pub fn packet_no(&self) -> i64 {
        self.packet_no
    }

    pub fn header_count(&self) -> usize {
        self.num_headers
    }

    pub fn is_holding(&self) -> bool {
        self.held.is_holding()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a page write failed
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Physical packets handed to the page layer since creation
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn page_layer(&self) -> &A {
        &self.pages
    }

    /// Writes a codec header packet
    ///
    /// The first header of a stream is put on a page of its own right away, as
    /// Ogg requires the identification page first. Later headers stay queued
    /// until [`flush`](Self::flush) is called.
    ///
    /// # Errors
    ///
    /// Returns [`EncMuxError::StreamClosed`] after [`close`](Self::close),
    /// [`EncMuxError::OutputFailed`] after a failed page write,
    /// [`EncMuxError::InvalidData`] once data packets have been accepted or if
    /// the first header produced no page, and any error of the sink.
    pub fn write_header_packet<S: PageSink + ?Sized>(
        &mut self,
        data: Bytes,
        sink: &mut S,
    ) -> Result<()> {
        self.check_writable()?;
        if self.held.is_holding() {
            return Err(EncMuxError::InvalidData(
                "header packet after data packets".to_string(),
            ));
        }
        self.write_physical(data, 0, false);
        if self.num_headers == 0 && !self.write_page(true, sink)? {
            log::error!("stream {:08x}: got no identification page", self.serial());
            return Err(EncMuxError::InvalidData(
                "header packet produced no page".to_string(),
            ));
        }
        self.num_headers += 1;
        Ok(())
    }

    /// Accepts the next data packet
    ///
    /// The previously held packet, if any, is written without end-of-stream and
    /// every page that became due is emitted. `packet` is held in its place.
    pub fn accept<S: PageSink + ?Sized>(&mut self, packet: Packet, sink: &mut S) -> Result<()> {
        self.check_writable()?;
        if let Some(previous) = self.held.push(packet) {
            self.write_data(previous, false);
            self.flush(false, sink)?;
        }
        Ok(())
    }

    /// Writes the held packet as the last one and flushes every page
    ///
    /// A stream that never accepted a packet writes nothing. After closing,
    /// [`accept`](Self::accept) fails until the stream is [`reset`](Self::reset).
    /// After a failed page write nothing is written and the result is
    /// [`EncMuxError::OutputFailed`].
    pub fn close<S: PageSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if self.failed {
            self.closed = true;
            return Err(EncMuxError::OutputFailed);
        }
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.finish(sink)
    }

    /// Ends the current logical stream and starts a new one with `serial`
    ///
    /// The held packet is written as terminal, the packet and header counters
    /// restart and the page layer is re-initialised. The next packet written
    /// carries beginning-of-stream again.
    pub fn reset<S: PageSink + ?Sized>(&mut self, serial: u32, sink: &mut S) -> Result<()> {
        if self.failed {
            return Err(EncMuxError::OutputFailed);
        }
        let result = if self.closed { Ok(()) } else { self.finish(sink) };
        log::debug!("stream {:08x}: reset to serial {:08x}", self.serial(), serial);
        self.packet_no = 0;
        self.num_headers = 0;
        self.closed = false;
        self.pages.reset(serial);
        result
    }

    /// Emits pending pages
    ///
    /// With `force` everything queued goes out; otherwise only pages that are
    /// due. Returns whether any page was written.
    pub fn flush<S: PageSink + ?Sized>(&mut self, force: bool, sink: &mut S) -> Result<bool> {
        if self.failed {
            return Err(EncMuxError::OutputFailed);
        }
        let mut wrote = false;
        while self.write_page(force, sink)? {
            wrote = true;
        }
        Ok(wrote)
    }

    fn finish<S: PageSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        if let Some(last) = self.held.take() {
            self.write_data(last, true);
            self.flush(true, sink)?;
        }
        Ok(())
    }

    fn write_page<S: PageSink + ?Sized>(&mut self, force: bool, sink: &mut S) -> Result<bool> {
        let page = if force || self.flush_every_packet {
            self.pages.flush()
        } else {
            self.pages.page_out()
        };
        match page {
            Some(page) => {
                if let Err(err) = sink.write_page(&page.header, &page.body) {
                    log::error!("stream {:08x}: page write failed: {}", self.serial(), err);
                    self.failed = true;
                    return Err(err);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.failed {
            Err(EncMuxError::OutputFailed)
        } else if self.closed {
            Err(EncMuxError::StreamClosed)
        } else {
            Ok(())
        }
    }

    fn write_data(&mut self, packet: Packet, eos: bool) {
        let granule = packet.end_pts().unwrap_or(-1);
        self.write_physical(packet.data, granule, eos);
    }

    fn write_physical(&mut self, data: Bytes, granule_position: i64, eos: bool) {
        let packet = OggPacket {
            data,
            granule_position,
            bos: self.packet_no == 0,
            eos,
            packet_no: self.packet_no,
        };
        self.packet_no += 1;
        self.packets_written += 1;
        self.pages.packet_in(packet);
    }
}
