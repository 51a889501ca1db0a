//! # Utility Functions and Types
//!
//! Checksums shared by the container writers.
//!
//! ```rust
//! use encmux::utils::OggCrc;
//!
//! let crc = OggCrc::new();
//! println!("CRC32: {:08x}", crc.calculate(b"OggS"));
//! ```

/// CRC calculation implementations
pub mod crc;

pub use crc::OggCrc;
