//! Header packets of the codecs that can be carried in Ogg.

use bytes::{BufMut, Bytes, BytesMut};

use super::comment::{comment_packet, write_vorbis_comment};
use crate::av::{CodecId, CompressionInfo, Tags};
use crate::error::{EncMuxError, Result};

const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";
const FLAC_MAGIC: &[u8; 4] = b"fLaC";
const FLAC_MAPPING_VERSION: [u8; 2] = [1, 0];
/// Metadata block type 4 with the last-block bit set
const FLAC_LAST_COMMENT_BLOCK: u8 = 0x84;
const FALLBACK_VENDOR: &str = concat!("encmux ", env!("CARGO_PKG_VERSION"));

/// Whether `codec` has an Ogg mapping
pub fn is_supported(codec: CodecId) -> bool {
    matches!(codec, CodecId::Opus | CodecId::Flac)
}

/// Returns the header packets of a stream, identification packet first.
///
/// # Errors
///
/// [`EncMuxError::UnsupportedCodec`] for codecs without a mapping and
/// [`EncMuxError::InvalidData`] for a malformed codec header.
pub fn header_packets(ci: &CompressionInfo, global: &Tags, stream: &Tags) -> Result<Vec<Bytes>> {
    let vendor = stream
        .get("software")
        .or(ci.software.as_deref())
        .unwrap_or_else(|| {
            log::warn!("no vendor string, using {}", FALLBACK_VENDOR);
            FALLBACK_VENDOR
        });

    match ci.codec {
        CodecId::Opus => {
            if !ci.codec_header.starts_with(OPUS_HEAD_MAGIC) {
                return Err(EncMuxError::InvalidData(
                    "codec header is not an OpusHead".to_string(),
                ));
            }
            Ok(vec![
                ci.codec_header.clone(),
                comment_packet(OPUS_TAGS_MAGIC, vendor, global, stream),
            ])
        }
        CodecId::Flac => Ok(vec![
            flac_id_packet(&ci.codec_header)?,
            flac_comment_packet(vendor, global, stream),
        ]),
        other => Err(EncMuxError::UnsupportedCodec(other)),
    }
}

/// `0x7F "FLAC"`, mapping version, header count, then `fLaC` and STREAMINFO
fn flac_id_packet(codec_header: &[u8]) -> Result<Bytes> {
    // "fLaC" + 4 byte block header + 34 byte STREAMINFO
    if codec_header.len() < 42 || &codec_header[..4] != FLAC_MAGIC {
        return Err(EncMuxError::InvalidData(
            "codec header is not a FLAC STREAMINFO".to_string(),
        ));
    }
    let mut buf = BytesMut::with_capacity(9 + codec_header.len());
    buf.put_u8(0x7F);
    buf.put_slice(b"FLAC");
    buf.put_slice(&FLAC_MAPPING_VERSION);
    buf.put_u16(1);
    buf.put_slice(codec_header);
    // The comment block follows, so STREAMINFO is not the last one.
    buf[9 + 4] &= 0x7F;
    Ok(buf.freeze())
}

fn flac_comment_packet(vendor: &str, global: &Tags, stream: &Tags) -> Bytes {
    let comment = write_vorbis_comment(vendor, global, stream, false);
    let mut buf = BytesMut::with_capacity(4 + comment.len());
    buf.put_u8(FLAC_LAST_COMMENT_BLOCK);
    buf.put_uint(comment.len() as u64, 3);
    buf.put_slice(&comment);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::opus::{ChannelLayout, ChannelMapping, OpusHead};
    use pretty_assertions::assert_eq;

    fn streaminfo() -> Vec<u8> {
        let mut header = b"fLaC".to_vec();
        header.extend_from_slice(&[0x80, 0, 0, 34]);
        header.extend_from_slice(&[0xAB; 34]);
        header
    }

    #[test]
    fn test_flac_packets() {
        let ci = CompressionInfo::new(CodecId::Flac).with_header(streaminfo());
        let tags = Tags::new().with("title", "x");
        let packets = header_packets(&ci, &Tags::new(), &tags).unwrap();
        assert_eq!(packets.len(), 2);

        let id = &packets[0];
        assert_eq!(&id[..9], &[0x7F, b'F', b'L', b'A', b'C', 1, 0, 0, 1]);
        assert_eq!(&id[9..13], b"fLaC");
        assert_eq!(id[13], 0x00);
        assert_eq!(id.len(), 9 + 42);

        let comment = &packets[1];
        assert_eq!(comment[0], 0x84);
        let len = u32::from_be_bytes([0, comment[1], comment[2], comment[3]]) as usize;
        assert_eq!(len, comment.len() - 4);
    }

    #[test]
    fn test_opus_packets() {
        let mapping = ChannelMapping::new(2, ChannelLayout::Vorbis).unwrap();
        let mut head = OpusHead::new(mapping, 48000);
        head.pre_skip = 312;
        let ci = CompressionInfo::new(CodecId::Opus).with_header(head.to_bytes());
        let tags = Tags::new().with("software", "libopus 1.4");
        let packets = header_packets(&ci, &Tags::new(), &tags).unwrap();

        assert_eq!(packets[0], ci.codec_header);
        assert_eq!(&packets[1][..8], b"OpusTags");
        assert_eq!(&packets[1][8..12], &11u32.to_le_bytes());
        assert_eq!(&packets[1][12..23], b"libopus 1.4");
    }

    #[test]
    fn test_unsupported_codec() {
        let ci = CompressionInfo::new(CodecId::H264);
        assert!(matches!(
            header_packets(&ci, &Tags::new(), &Tags::new()),
            Err(EncMuxError::UnsupportedCodec(CodecId::H264))
        ));
        assert!(!is_supported(CodecId::Vp8));
    }

    #[test]
    fn test_rejects_bad_headers() {
        let flac = CompressionInfo::new(CodecId::Flac).with_header(vec![0u8; 8]);
        assert!(header_packets(&flac, &Tags::new(), &Tags::new()).is_err());
        let opus = CompressionInfo::new(CodecId::Opus).with_header(vec![0u8; 19]);
        assert!(header_packets(&opus, &Tags::new(), &Tags::new()).is_err());
    }
}
