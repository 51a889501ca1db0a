#![doc(html_root_url = "https://docs.rs/encmux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # encmux - encoder adapters and an Ogg muxer
//!
//! `encmux` sits between native audio and video encoders and the container
//! writers that store their output. Native encoders take frames and give back
//! bare payloads; this crate restores the timing and picture types the
//! containers need and writes the result into Ogg files.
//!
//! ## Features
//!
//! ### Encoder adapters
//! - Video: duration and I/P/B type recovery for reordering encoders
//! - Audio: frame re-chunking and timestamps from sample counts and encoder delay
//! - Opus: frame-synchronous encoding with `OpusHead` and pre-skip handling
//!
//! ### Containers
//! - Ogg page writer with lacing, checksums and BOS/EOS handling
//! - Opus and FLAC Ogg mappings with Vorbis comments
//! - Chained Ogg segments on metadata updates
//! - Timestamp preparation for time-base based containers
//!
//! ## Quick Start
//!
//! ```rust
//! use encmux::av::{CodecId, CompressionInfo, Packet, Tags};
//! use encmux::config::Config;
//! use encmux::format::OggMuxer;
//!
//! fn main() -> encmux::Result<()> {
//!     let mut out: Vec<u8> = Vec::new();
//!     let mut muxer = OggMuxer::new(&mut out, Config::default());
//!
//!     let mut streaminfo = b"fLaC\x80\x00\x00\x22".to_vec();
//!     streaminfo.extend_from_slice(&[0u8; 34]);
//!     let flac = muxer.add_audio_stream_compressed(
//!         CompressionInfo::new(CodecId::Flac).with_header(streaminfo),
//!         Tags::new().with("title", "Example"),
//!     );
//!
//!     muxer.start()?;
//!     for n in 0..4 {
//!         let packet = Packet::new(vec![0xFF, 0xF8])
//!             .with_pts(n * 4096)
//!             .with_duration(4096);
//!         muxer.write_packet(flac, packet)?;
//!     }
//!     muxer.close(false)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: packets, frames, compression info and timestamp helpers
//!   - PTS reorder cache and frame type classification
//!   - One-packet delay slot
//! - `codec`: encoder adapters over native codec traits
//! - `format`: packet sinks, the Ogg writer and container stream timing
//! - `config`: tuning loaded from the environment or a file
//! - `error`: error type and result alias
//! - `utils`: checksums

/// Audio/Video base types and utilities
pub mod av;

/// Encoder adapters
pub mod codec;

/// Error types and utilities
pub mod error;

/// Container writers
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use error::{EncMuxError, Result};
