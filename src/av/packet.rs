use bytes::Bytes;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of per-packet flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketFlags(u32);

impl PacketFlags {
    /// No flags set
    pub const NONE: PacketFlags = PacketFlags(0);
    /// Packet can be decoded without reference to earlier packets
    pub const KEYFRAME: PacketFlags = PacketFlags(1 << 0);
    /// Intra coded picture
    pub const TYPE_I: PacketFlags = PacketFlags(1 << 1);
    /// Forward predicted picture
    pub const TYPE_P: PacketFlags = PacketFlags(1 << 2);
    /// Bidirectionally predicted picture
    pub const TYPE_B: PacketFlags = PacketFlags(1 << 3);
    /// Last packet of the stream
    pub const LAST: PacketFlags = PacketFlags(1 << 4);
    /// Decoded but never displayed (VP8 alternate reference frames)
    pub const NO_OUTPUT: PacketFlags = PacketFlags(1 << 5);
    /// The timestamp could not be recovered from the reorder cache
    pub const UNRELIABLE_TIMESTAMP: PacketFlags = PacketFlags(1 << 6);

    const TYPE_MASK: u32 = Self::TYPE_I.0 | Self::TYPE_P.0 | Self::TYPE_B.0;

    /// Returns the raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set
    pub const fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the flags in `other`
    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }

    /// Clears the flags in `other`
    pub fn remove(&mut self, other: PacketFlags) {
        self.0 &= !other.0;
    }

    /// Returns true if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PacketFlags {
    type Output = PacketFlags;

    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        PacketFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: PacketFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(PacketFlags, &str); 7] = [
            (PacketFlags::KEYFRAME, "KEYFRAME"),
            (PacketFlags::TYPE_I, "TYPE_I"),
            (PacketFlags::TYPE_P, "TYPE_P"),
            (PacketFlags::TYPE_B, "TYPE_B"),
            (PacketFlags::LAST, "LAST"),
            (PacketFlags::NO_OUTPUT, "NO_OUTPUT"),
            (PacketFlags::UNRELIABLE_TIMESTAMP, "UNRELIABLE_TIMESTAMP"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}

/// Picture coding type of a video packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Intra coded
    I,
    /// Forward predicted
    P,
    /// Bidirectionally predicted
    B,
}

impl FrameType {
    /// Flag corresponding to this frame type
    pub fn flag(self) -> PacketFlags {
        match self {
            FrameType::I => PacketFlags::TYPE_I,
            FrameType::P => PacketFlags::TYPE_P,
            FrameType::B => PacketFlags::TYPE_B,
        }
    }
}

/// An encoded unit of compressed data.
///
/// Timestamps are expressed in the timescale of the stream the packet belongs to.
/// A packet is handed to exactly one [`PacketSink`](crate::format::PacketSink),
/// which takes ownership of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Compressed payload
    pub data: Bytes,
    /// Presentation timestamp, `None` while undefined
    pub pts: Option<i64>,
    /// Decoding timestamp, `None` while undefined
    pub dts: Option<i64>,
    /// Duration in stream timescale units
    pub duration: i64,
    /// Index of the stream inside its container
    pub stream_index: usize,
    /// Packet flags
    pub flags: PacketFlags,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: 0,
            stream_index: 0,
            flags: PacketFlags::NONE,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        if is_key {
            self.flags.insert(PacketFlags::KEYFRAME);
        } else {
            self.flags.remove(PacketFlags::KEYFRAME);
        }
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }

    pub fn is_last(&self) -> bool {
        self.flags.contains(PacketFlags::LAST)
    }

    /// Replaces any previously set picture type.
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.flags.0 &= !PacketFlags::TYPE_MASK;
        self.flags.insert(frame_type.flag());
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        if self.flags.contains(PacketFlags::TYPE_B) {
            Some(FrameType::B)
        } else if self.flags.contains(PacketFlags::TYPE_P) {
            Some(FrameType::P)
        } else if self.flags.contains(PacketFlags::TYPE_I) {
            Some(FrameType::I)
        } else {
            None
        }
    }

    /// End of the presentation interval, `pts + duration`.
    pub fn end_pts(&self) -> Option<i64> {
        self.pts.map(|pts| pts + self.duration)
    }
}
