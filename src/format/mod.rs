use crate::av::Packet;
use crate::Result;

pub mod mux;
pub mod ogg;

/// Receiver of encoded packets.
///
/// Encoders push every packet they produce into a sink, which takes
/// ownership of it. A failing sink aborts the current encode call.
pub trait PacketSink {
    /// Consume one packet
    fn put(&mut self, packet: Packet) -> Result<()>;
}

impl PacketSink for Vec<Packet> {
    fn put(&mut self, packet: Packet) -> Result<()> {
        self.push(packet);
        Ok(())
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn put(&mut self, packet: Packet) -> Result<()> {
        (**self).put(packet)
    }
}

pub mod tests {
    use super::*;
    use crate::error::EncMuxError;
    use crate::format::ogg::PageSink;

    /// A sink that fails after accepting a fixed number of packets
    #[derive(Debug)]
    pub struct FailingSink {
        pub packets: Vec<Packet>,
        pub accept: usize,
    }

    impl FailingSink {
        pub fn new(accept: usize) -> Self {
            Self {
                packets: Vec::new(),
                accept,
            }
        }
    }

    impl PacketSink for FailingSink {
        fn put(&mut self, packet: Packet) -> Result<()> {
            if self.packets.len() >= self.accept {
                return Err(EncMuxError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "sink full",
                )));
            }
            self.packets.push(packet);
            Ok(())
        }
    }

    /// A page sink that fails the writes numbered in `fail_at`, counting from
    /// zero, and keeps the bytes of the others
    #[derive(Debug, Default)]
    pub struct FlakyPageSink {
        pub fail_at: Vec<usize>,
        pub attempts: usize,
        pub out: Vec<u8>,
    }

    impl FlakyPageSink {
        pub fn failing_at(fail_at: &[usize]) -> Self {
            Self {
                fail_at: fail_at.to_vec(),
                ..Self::default()
            }
        }
    }

    impl PageSink for FlakyPageSink {
        fn write_page(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
            let attempt = self.attempts;
            self.attempts += 1;
            if self.fail_at.contains(&attempt) {
                return Err(EncMuxError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "page write failed",
                )));
            }
            self.out.extend_from_slice(header);
            self.out.extend_from_slice(body);
            Ok(())
        }
    }
}

pub use self::mux::MuxStream;
pub use self::ogg::{OggMuxer, OggStream, PageSink};
