use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};

use crate::crc32::crc32_update;
use crate::{
    BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE, CRC32_RANGE, EOS_VALUE,
    GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, PAGE_SEQUENCE_NUMBER_RANGE, SEGMENT_COUNT_INDEX,
    SEGMENT_TABLE_INDEX, VERSION_INDEX,
};

/// A view of a single page inside a buffer owned by someone else.
///
/// Pages are handed out by [`SyncState`](crate::SyncState) when reading and by
/// [`StreamWriter`](crate::StreamWriter) when writing. They borrow the buffer of their
/// producer, so a page has to be consumed (or copied) before the producer is driven again.
///
/// The header is expected to hold at least `27 + segment count` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page<'a> {
    header: &'a [u8],
    body: &'a [u8],
}

impl<'a> Page<'a> {
    pub(crate) fn new(header: &'a [u8], body: &'a [u8]) -> Self {
        Self { header, body }
    }

    /// The raw header bytes including the segment table.
    pub fn header(&self) -> &'a [u8] {
        self.header
    }

    /// The raw body bytes.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Size of the whole page in bytes.
    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    /// A page always has a header, so it is never empty. Provided for symmetry with `len()`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The version of the bitstream format. Always `0` for valid pages.
    pub fn version(&self) -> u8 {
        self.header[VERSION_INDEX]
    }

    /// The raw header type bit mask.
    pub fn header_type(&self) -> u8 {
        self.header[HEADER_TYPE_INDEX]
    }

    /// True if the first segment continues a packet started on a previous page.
    pub fn is_continued(&self) -> bool {
        self.header_type() & CONTINUATION_VALUE != 0
    }

    /// True if this is the first page of a logical bitstream.
    pub fn is_bos(&self) -> bool {
        self.header_type() & BOS_VALUE != 0
    }

    /// True if this is the last page of a logical bitstream.
    pub fn is_eos(&self) -> bool {
        self.header_type() & EOS_VALUE != 0
    }

    /// The granule position of the last packet completed on this page, or `-1` if no
    /// packet is completed on it.
    pub fn granule_position(&self) -> i64 {
        LittleEndian::read_i64(&self.header[GRANULE_POSITION_RANGE])
    }

    /// The serial number of the logical bitstream this page belongs to.
    pub fn serial(&self) -> u32 {
        LittleEndian::read_u32(&self.header[BITSTREAM_SERIAL_NUMBER_RANGE])
    }

    /// The sequence number of the page inside its logical bitstream.
    pub fn sequence_number(&self) -> u32 {
        LittleEndian::read_u32(&self.header[PAGE_SEQUENCE_NUMBER_RANGE])
    }

    /// The checksum as stored in the header.
    pub fn checksum(&self) -> u32 {
        LittleEndian::read_u32(&self.header[CRC32_RANGE])
    }

    /// Number of segments on this page.
    pub fn segment_count(&self) -> usize {
        usize::from(self.header[SEGMENT_COUNT_INDEX])
    }

    /// The lacing values of this page.
    pub fn segment_table(&self) -> &'a [u8] {
        &self.header[SEGMENT_TABLE_INDEX..SEGMENT_TABLE_INDEX + self.segment_count()]
    }

    /// Number of packets that end on this page.
    pub fn packet_count(&self) -> usize {
        self.segment_table().iter().filter(|&&v| v < 255).count()
    }

    /// Calculates the checksum of the page as if the checksum field was zeroed.
    ///
    /// A page is valid if this matches [`checksum()`](Self::checksum).
    pub fn compute_checksum(&self) -> u32 {
        page_checksum(self.header, self.body)
    }

    /// Writes the header followed by the body into the writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.header)?;
        writer.write_all(self.body)
    }
}

/// Location of a page inside a buffer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PageSpan {
    pub(crate) start: usize,
    pub(crate) header_len: usize,
    pub(crate) body_len: usize,
}

impl PageSpan {
    pub(crate) fn view(self, data: &[u8]) -> Page<'_> {
        let body_start = self.start + self.header_len;
        Page::new(
            &data[self.start..body_start],
            &data[body_start..body_start + self.body_len],
        )
    }
}

/// Checksum of a page with the checksum field of the header treated as zero.
pub(crate) fn page_checksum(header: &[u8], body: &[u8]) -> u32 {
    let mut crc = crc32_update(0, &header[..CRC32_RANGE.start]);
    crc = crc32_update(crc, &[0; 4]);
    crc = crc32_update(crc, &header[CRC32_RANGE.end..]);
    crc32_update(crc, body)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::crc32::crc32;

    fn hello_header() -> Vec<u8> {
        let mut header = vec![0_u8; 28];
        header[0..4].copy_from_slice(b"OggS");
        header[HEADER_TYPE_INDEX] = BOS_VALUE;
        header[GRANULE_POSITION_RANGE].copy_from_slice(&(-1_i64).to_le_bytes());
        header[BITSTREAM_SERIAL_NUMBER_RANGE].copy_from_slice(&7_u32.to_le_bytes());
        header[PAGE_SEQUENCE_NUMBER_RANGE].copy_from_slice(&3_u32.to_le_bytes());
        header[SEGMENT_COUNT_INDEX] = 1;
        header[SEGMENT_TABLE_INDEX] = 5;
        header
    }

    #[test]
    fn test_accessors() {
        let header = hello_header();
        let page = Page::new(&header, b"HELLO");

        assert_eq!(page.version(), 0);
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert!(!page.is_continued());
        assert_eq!(page.granule_position(), -1);
        assert_eq!(page.serial(), 7);
        assert_eq!(page.sequence_number(), 3);
        assert_eq!(page.segment_count(), 1);
        assert_eq!(page.segment_table(), &[5]);
        assert_eq!(page.packet_count(), 1);
        assert_eq!(page.len(), 33);
    }

    #[test]
    fn test_checksum_ignores_stored_value() {
        let mut header = hello_header();
        let mut whole = header.clone();
        whole.extend_from_slice(b"HELLO");
        let expected = crc32(&whole);

        header[CRC32_RANGE].copy_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());
        let page = Page::new(&header, b"HELLO");

        assert_eq!(page.checksum(), 0xDEAD_BEEF);
        assert_eq!(page.compute_checksum(), expected);
    }

    #[test]
    fn test_packet_count() {
        let mut header = hello_header();
        header[SEGMENT_COUNT_INDEX] = 4;
        header.truncate(SEGMENT_TABLE_INDEX);
        header.extend_from_slice(&[255, 255, 0, 255]);
        let body = vec![0_u8; 255 * 3];
        let page = Page::new(&header, &body);

        assert_eq!(page.packet_count(), 1);
    }

    #[test]
    fn test_write_to() {
        let header = hello_header();
        let page = Page::new(&header, b"HELLO");

        let mut out = Vec::new();
        page.write_to(&mut out).unwrap();

        assert_eq!(out.len(), page.len());
        assert_eq!(&out[28..], b"HELLO");
    }
}
