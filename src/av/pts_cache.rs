//! # Presentation timestamp reorder cache
//!
//! Encoders with B-frames emit packets in decoding order, and many native
//! encoders only hand back the presentation timestamp of each packet. The
//! [`PtsCache`] remembers the timing of every submitted frame until the packet
//! carrying it comes out, so the adapter can restore the frame's duration.
//!
//! [`FrameTypeTracker`] derives the picture type of each packet from the
//! order in which presentation timestamps come back.
//!
//! ## Example
//!
//! ```rust
//! use encmux::av::{FrameType, FrameTypeTracker, PtsCache};
//!
//! let mut cache = PtsCache::new(8);
//! let mut tracker = FrameTypeTracker::new();
//!
//! for pts in [0, 1024, 2048] {
//!     cache.push(pts, 1024).unwrap();
//! }
//!
//! // The encoder emits the second frame after the third one.
//! let mut types = Vec::new();
//! for pts in [0, 2048, 1024] {
//!     let entry = cache.pop(pts).unwrap();
//!     assert_eq!(entry.duration, 1024);
//!     types.push(tracker.classify(pts, false));
//! }
//! assert_eq!(types, vec![FrameType::P, FrameType::P, FrameType::B]);
//! ```

use std::collections::VecDeque;
use std::fmt;

use super::{FrameType, VideoFrame};
use crate::error::{EncMuxError, Result};

/// Reorder window used when the configuration does not name one
pub const DEFAULT_PTS_CACHE_DEPTH: usize = 32;

/// Timing of a frame that was handed to the encoder but has not come out yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedFrame {
    /// Presentation timestamp of the submitted frame
    pub pts: i64,
    /// Duration of the submitted frame
    pub duration: i64,
}

/// A bounded FIFO of pending frame timings, looked up by exact pts.
pub struct PtsCache {
    /// Pending entries in submission order
    entries: VecDeque<CachedFrame>,
    /// Maximum number of pending entries
    capacity: usize,
}

impl fmt::Debug for PtsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtsCache")
            .field("capacity", &self.capacity)
            .field("pending", &self.entries.len())
            .field("oldest_pts", &self.entries.front().map(|e| e.pts))
            .finish()
    }
}

impl PtsCache {
    /// Creates a cache that holds at most `capacity` pending frames
    ///
    /// # Arguments
    ///
    /// * `capacity` - Reorder window; must cover the encoder's lookahead
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records the timing of a frame that is about to be sent to the encoder
    ///
    /// # Errors
    ///
    /// Returns [`EncMuxError::CacheOverflow`] if `capacity` frames are already
    /// pending. The reorder window is then too small for the encoder and the
    /// stream cannot continue.
    pub fn push(&mut self, pts: i64, duration: i64) -> Result<()> {
        if self.entries.len() >= self.capacity {
            log::error!(
                "pts cache overflow: {} frames pending, dropping pts {}",
                self.entries.len(),
                pts
            );
            return Err(EncMuxError::CacheOverflow {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(CachedFrame { pts, duration });
        Ok(())
    }

    /// Records the timing of `frame`
    pub fn push_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        self.push(frame.timestamp, frame.duration)
    }

    /// Removes and returns the pending entry whose pts equals `pts`
    ///
    /// Entries are searched in submission order, so the oldest of several
    /// entries with the same pts wins.
    ///
    /// # Errors
    ///
    /// Returns [`EncMuxError::CacheMiss`] if no pending entry has this pts.
    /// The cache is left untouched in that case.
    pub fn pop(&mut self, pts: i64) -> Result<CachedFrame> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.pts == pts)
            .ok_or(EncMuxError::CacheMiss { pts })?;
        self.entries
            .remove(index)
            .ok_or(EncMuxError::CacheMiss { pts })
    }

    /// Drops every pending entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the maximum number of pending entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if no frame is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of pending frames
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PtsCache {
    fn default() -> Self {
        Self::new(DEFAULT_PTS_CACHE_DEPTH)
    }
}

/// Classifies packets as I, P or B from their output order.
///
/// A packet whose pts is lower than the highest pts seen so far is a B-frame.
/// Any other packet is an I-frame if it is a keyframe and a P-frame otherwise,
/// and becomes the new reference point. Equal timestamps never count as B.
#[derive(Debug, Clone, Default)]
pub struct FrameTypeTracker {
    out_pts: Option<i64>,
}

impl FrameTypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, pts: i64, keyframe: bool) -> FrameType {
        if matches!(self.out_pts, Some(out_pts) if pts < out_pts) {
            return FrameType::B;
        }
        self.out_pts = Some(pts);
        if keyframe {
            FrameType::I
        } else {
            FrameType::P
        }
    }

    /// Highest non-B pts seen so far
    pub fn out_pts(&self) -> Option<i64> {
        self.out_pts
    }

    pub fn reset(&mut self) {
        self.out_pts = None;
    }
}
