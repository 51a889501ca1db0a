use bytes::{BufMut, Bytes, BytesMut};

use crate::av::Tags;

/// Builds a Vorbis comment block.
///
/// Layout, all lengths little endian:
///
/// ```text
/// vendor_length: u32, vendor: [u8]
/// count: u32, count * (length: u32, "KEY=value")
/// [framing: u8 = 1]
/// ```
///
/// `stream` entries override `global` entries with the same key. Keys are
/// written upper case.
pub fn write_vorbis_comment(vendor: &str, global: &Tags, stream: &Tags, framing: bool) -> Bytes {
    let tags = global.merged(stream);
    let entries: Vec<String> = tags
        .iter()
        .filter(|(key, _)| !key.is_empty() && !key.contains('='))
        .map(|(key, value)| format!("{}={}", key.to_ascii_uppercase(), value))
        .collect();

    let len = 8
        + vendor.len()
        + entries.iter().map(|e| 4 + e.len()).sum::<usize>()
        + usize::from(framing);
    let mut buf = BytesMut::with_capacity(len);
    buf.put_u32_le(vendor.len() as u32);
    buf.put_slice(vendor.as_bytes());
    buf.put_u32_le(entries.len() as u32);
    for entry in &entries {
        buf.put_u32_le(entry.len() as u32);
        buf.put_slice(entry.as_bytes());
    }
    if framing {
        buf.put_u8(1);
    }
    buf.freeze()
}

/// Prepends a codec specific magic, e.g. `OpusTags`, to a comment block.
pub fn comment_packet(magic: &[u8], vendor: &str, global: &Tags, stream: &Tags) -> Bytes {
    let comment = write_vorbis_comment(vendor, global, stream, false);
    let mut buf = BytesMut::with_capacity(magic.len() + comment.len());
    buf.put_slice(magic);
    buf.put_slice(&comment);
    buf.freeze()
}
