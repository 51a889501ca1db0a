//! # Ogg container
//!
//! Writing is split in three layers:
//!
//! - [`page::PageBuilder`] packs packets into checksummed pages
//! - [`OggStream`] is one logical stream; it holds back the latest packet so
//!   the end-of-stream flag lands on the last one
//! - [`OggMuxer`] owns the streams of a physical file, writes their headers
//!   and drives the encoders
//!
//! Opus and FLAC are mapped, see [`mapping`].

pub mod comment;
pub mod mapping;
pub mod muxer;
pub mod page;
pub mod serial;
pub mod stream;

pub use self::muxer::OggMuxer;
pub use self::page::{IoPageSink, Page, PageAccumulator, PageBuilder, PageSink};
pub use self::serial::{SequentialSerials, SerialAllocator};
pub use self::stream::OggStream;
