//! Page assembly for a single logical bitstream.

use std::cmp::min;
use std::convert::TryFrom;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::crc32::crc32;
use crate::page::PageSpan;
use crate::{
    Packet, Page, WriteError, BITSTREAM_SERIAL_NUMBER_RANGE, BOS_VALUE, CONTINUATION_VALUE,
    CRC32_RANGE, EOS_VALUE, GRANULE_POSITION_RANGE, HEADER_TYPE_INDEX, MAX_SEGMENTS,
    PAGER_MARKER, PAGER_MARKER_RANGE, PAGE_SEQUENCE_NUMBER_RANGE, SEGMENT_COUNT_INDEX,
    SEGMENT_TABLE_INDEX,
};

/// Configures when a [`StreamWriter`] emits pages on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamWriterConfig {
    /// Also emit a page from `page_out()` once more than this many body bytes are pending.
    ///
    /// `None` only emits full pages (255 segments).
    pub fill_threshold: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    len: u8,
    granule_position: i64,
    /// First segment of a packet.
    packet_start: bool,
}

/// Laces the packets of one logical bitstream into pages.
///
/// Packets are queued with [`packet_in()`](Self::packet_in). Pages are taken out either when
/// they are full with [`page_out()`](Self::page_out), or right away with
/// [`flush()`](Self::flush). The first page is marked as the beginning of the stream, the page
/// holding the end of a packet flagged `eos` as its end.
#[derive(Clone, Debug)]
pub struct StreamWriter {
    serial: u32,
    config: StreamWriterConfig,
    body: Vec<u8>,
    lacing: Vec<Segment>,
    page_sequence_number: u32,
    packet_number: i64,
    bos_written: bool,
    eos: bool,
    /// Holds the pages handed out by the last call.
    page_buffer: Vec<u8>,
    spans: Vec<PageSpan>,
}

impl StreamWriter {
    /// Creates a new `StreamWriter` for the logical bitstream with the given serial number.
    pub fn new(serial: u32) -> Self {
        Self::with_config(serial, StreamWriterConfig::default())
    }

    /// Creates a new `StreamWriter` with the given configuration.
    pub fn with_config(serial: u32, config: StreamWriterConfig) -> Self {
        Self {
            serial,
            config,
            body: Vec::new(),
            lacing: Vec::new(),
            page_sequence_number: 0,
            packet_number: 0,
            bos_written: false,
            eos: false,
            page_buffer: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// The serial number of the logical bitstream.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// True once the last packet of the logical bitstream was queued.
    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// Returns true if no packet data is waiting to be written.
    pub fn page_is_empty(&self) -> bool {
        self.lacing.is_empty()
    }

    /// Number of packets queued so far.
    pub fn packet_number(&self) -> i64 {
        self.packet_number
    }

    /// Drops all queued data and starts the logical bitstream over.
    pub fn reset(&mut self) {
        self.body.clear();
        self.lacing.clear();
        self.page_sequence_number = 0;
        self.packet_number = 0;
        self.bos_written = false;
        self.eos = false;
        self.page_buffer.clear();
        self.spans.clear();
    }

    /// Marks the logical bitstream as ended without queuing another packet.
    ///
    /// The last page written afterwards carries the end of stream flag.
    pub fn set_eos(&mut self) {
        self.eos = true;
    }

    /// Queues a packet.
    ///
    /// The data is split into 255 byte segments followed by a terminating segment of less
    /// than 255 bytes. That last segment is empty if the size is a multiple of 255.
    pub fn packet_in(&mut self, packet: &Packet<'_>) -> Result<(), WriteError> {
        if self.eos {
            return Err(WriteError::EndOfStream(self.serial));
        }

        self.body.extend_from_slice(packet.data);

        let full_segments = packet.data.len() / 255;
        let remainder = packet.data.len() % 255;
        for index in 0..=full_segments {
            let len = if index < full_segments {
                255
            } else {
                // Always below 255.
                u8::try_from(remainder).unwrap_or(u8::MAX)
            };
            self.lacing.push(Segment {
                len,
                granule_position: packet.granule_position,
                packet_start: index == 0,
            });
        }

        self.packet_number += 1;
        if packet.eos {
            self.eos = true;
        }

        Ok(())
    }

    /// Returns a page if enough data is queued to fill one.
    pub fn page_out(&mut self) -> Option<Page<'_>> {
        self.page_buffer.clear();
        let span = self.assemble(false)?;
        Some(span.view(&self.page_buffer))
    }

    /// Returns a page holding the queued data, even if it is not full.
    ///
    /// At most 255 segments fit on a page. If more are queued, call again. Returns `None`
    /// once nothing is queued.
    pub fn flush(&mut self) -> Option<Page<'_>> {
        self.page_buffer.clear();
        let span = self.assemble(true)?;
        Some(span.view(&self.page_buffer))
    }

    /// Returns all pages that can be written right now.
    ///
    /// Without `force_flush` only full pages are returned, otherwise all queued data.
    pub fn drain_pages(&mut self, force_flush: bool) -> impl Iterator<Item = Page<'_>> + '_ {
        self.page_buffer.clear();
        self.spans.clear();
        while let Some(span) = self.assemble(force_flush) {
            self.spans.push(span);
        }

        let page_buffer = &self.page_buffer;
        self.spans.iter().map(move |span| span.view(page_buffer))
    }

    /// Appends the next page to the page buffer.
    fn assemble(&mut self, force: bool) -> Option<PageSpan> {
        if self.lacing.is_empty() {
            return None;
        }

        let full = self.lacing.len() >= MAX_SEGMENTS;
        let over_threshold = self
            .config
            .fill_threshold
            .map_or(false, |threshold| self.body.len() > threshold);
        if !(force || full || over_threshold) {
            return None;
        }

        let segment_count = min(self.lacing.len(), MAX_SEGMENTS);
        let segments = &self.lacing[..segment_count];

        let body_len: usize = segments.iter().map(|s| usize::from(s.len)).sum();
        let granule_position = segments
            .iter()
            .rev()
            .find(|s| s.len < 255)
            .map_or(-1, |s| s.granule_position);

        let mut header_type = 0;
        if !segments[0].packet_start {
            header_type |= CONTINUATION_VALUE;
        }
        if !self.bos_written {
            header_type |= BOS_VALUE;
        }
        if self.eos && segment_count == self.lacing.len() {
            header_type |= EOS_VALUE;
        }

        // Write out the header with a zeroed checksum.
        let start = self.page_buffer.len();
        let header_len = SEGMENT_TABLE_INDEX + segment_count;
        self.page_buffer.resize(start + header_len, 0);
        {
            let header = &mut self.page_buffer[start..];
            header[PAGER_MARKER_RANGE].copy_from_slice(&PAGER_MARKER);
            header[HEADER_TYPE_INDEX] = header_type;
            LittleEndian::write_i64(&mut header[GRANULE_POSITION_RANGE], granule_position);
            LittleEndian::write_u32(&mut header[BITSTREAM_SERIAL_NUMBER_RANGE], self.serial);
            LittleEndian::write_u32(
                &mut header[PAGE_SEQUENCE_NUMBER_RANGE],
                self.page_sequence_number,
            );
            header[SEGMENT_COUNT_INDEX] = u8::try_from(segment_count).unwrap_or(u8::MAX);
            for (slot, segment) in header[SEGMENT_TABLE_INDEX..].iter_mut().zip(segments) {
                *slot = segment.len;
            }
        }
        self.page_buffer.extend_from_slice(&self.body[..body_len]);

        let crc32 = crc32(&self.page_buffer[start..]);
        LittleEndian::write_u32(
            &mut self.page_buffer[start + CRC32_RANGE.start..start + CRC32_RANGE.end],
            crc32,
        );

        trace!(
            "bitstream {}: emitted page {} with {} segments",
            self.serial,
            self.page_sequence_number,
            segment_count
        );

        // Drop the written data and advance the state of the stream.
        let remaining = self.body.len() - body_len;
        self.body.copy_within(body_len.., 0);
        self.body.truncate(remaining);

        let remaining = self.lacing.len() - segment_count;
        self.lacing.copy_within(segment_count.., 0);
        self.lacing.truncate(remaining);

        self.page_sequence_number = self.page_sequence_number.wrapping_add(1);
        self.bos_written = true;

        Some(PageSpan {
            start,
            header_len,
            body_len,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_flush_empty() {
        let mut writer = StreamWriter::new(1);
        assert!(writer.flush().is_none());
        assert!(writer.page_out().is_none());
        assert!(writer.page_is_empty());
    }

    #[test]
    fn test_single_page() {
        let mut writer = StreamWriter::new(42);
        writer.packet_in(&Packet::new(b"HELLO", 0)).unwrap();
        assert!(writer.page_out().is_none());

        let page = writer.flush().unwrap();
        assert_eq!(&page.header()[0..4], b"OggS");
        assert_eq!(page.version(), 0);
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert!(!page.is_continued());
        assert_eq!(page.serial(), 42);
        assert_eq!(page.sequence_number(), 0);
        assert_eq!(page.granule_position(), 0);
        assert_eq!(page.segment_table(), &[5]);
        assert_eq!(page.body(), b"HELLO");
        assert_eq!(page.checksum(), page.compute_checksum());

        assert!(writer.flush().is_none());
    }

    #[test]
    fn test_exact_multiple_of_255() {
        let data = vec![1_u8; 255 * 3];
        let mut writer = StreamWriter::new(1);
        writer.packet_in(&Packet::new(&data, 1)).unwrap();

        let page = writer.flush().unwrap();
        assert_eq!(page.segment_table(), &[255, 255, 255, 0]);
        assert_eq!(page.body().len(), 765);
    }

    #[test]
    fn test_empty_packet() {
        let mut writer = StreamWriter::new(1);
        writer.packet_in(&Packet::new(&[], 1)).unwrap();

        let page = writer.flush().unwrap();
        assert_eq!(page.segment_table(), &[0]);
        assert!(page.body().is_empty());
    }

    #[test]
    fn test_page_out_waits_for_full_page() {
        let mut writer = StreamWriter::new(1);
        for granule in 0..254 {
            writer.packet_in(&Packet::new(&[7], granule)).unwrap();
            assert!(writer.page_out().is_none());
        }
        writer.packet_in(&Packet::new(&[7], 254)).unwrap();
        writer.packet_in(&Packet::new(&[8], 255)).unwrap();

        let page = writer.page_out().unwrap();
        assert_eq!(page.segment_count(), 255);
        assert_eq!(page.granule_position(), 254);
        assert!(writer.page_out().is_none());

        let page = writer.flush().unwrap();
        assert!(!page.is_bos());
        assert_eq!(page.sequence_number(), 1);
        assert_eq!(page.body(), &[8]);
    }

    #[test]
    fn test_packet_spanning_pages() {
        let data: Vec<u8> = (0..70_000_u32).map(|v| v.to_le_bytes()[0]).collect();
        let mut writer = StreamWriter::new(3);
        writer.packet_in(&Packet::new(&data, 500)).unwrap();

        let mut body = Vec::new();
        {
            let first = writer.flush().unwrap();
            assert!(first.is_bos());
            assert!(!first.is_continued());
            assert_eq!(first.segment_count(), 255);
            assert_eq!(first.granule_position(), -1);
            body.extend_from_slice(first.body());
        }
        {
            let second = writer.flush().unwrap();
            assert!(!second.is_bos());
            assert!(second.is_continued());
            assert_eq!(second.sequence_number(), 1);
            assert_eq!(second.granule_position(), 500);
            body.extend_from_slice(second.body());
        }
        assert!(writer.flush().is_none());
        assert_eq!(body, data);
    }

    #[test]
    fn test_eos_only_on_last_page() {
        let data = vec![0_u8; 255 * 300];
        let mut writer = StreamWriter::new(1);
        writer.packet_in(&Packet::new(&data, 9).with_eos()).unwrap();
        assert!(writer.is_eos());

        let flags: Vec<_> = writer.drain_pages(true).map(|p| p.is_eos()).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_packet_after_eos() {
        let mut writer = StreamWriter::new(5);
        writer.packet_in(&Packet::new(b"x", 1).with_eos()).unwrap();

        assert!(matches!(
            writer.packet_in(&Packet::new(b"y", 2)),
            Err(WriteError::EndOfStream(5))
        ));
    }

    #[test]
    fn test_set_eos() {
        let mut writer = StreamWriter::new(5);
        writer.packet_in(&Packet::new(b"x", 1)).unwrap();
        writer.set_eos();

        assert!(writer.flush().unwrap().is_eos());
    }

    #[test]
    fn test_drain_pages() {
        let mut writer = StreamWriter::new(1);
        for granule in 0..600 {
            writer.packet_in(&Packet::new(b"ab", granule)).unwrap();
        }

        let sequences: Vec<_> = writer
            .drain_pages(false)
            .map(|p| p.sequence_number())
            .collect();
        assert_eq!(sequences, vec![0, 1]);

        let pages: Vec<_> = writer
            .drain_pages(true)
            .map(|p| (p.sequence_number(), p.segment_count()))
            .collect();
        assert_eq!(pages, vec![(2, 90)]);
        assert!(writer.page_is_empty());
    }

    #[test]
    fn test_fill_threshold() {
        let config = StreamWriterConfig {
            fill_threshold: Some(100),
        };
        let mut writer = StreamWriter::with_config(1, config);
        writer.packet_in(&Packet::new(&[1; 60], 1)).unwrap();
        assert!(writer.page_out().is_none());

        writer.packet_in(&Packet::new(&[2; 60], 2)).unwrap();
        let page = writer.page_out().unwrap();
        assert_eq!(page.body().len(), 120);
        assert_eq!(page.granule_position(), 2);
    }

    #[test]
    fn test_reset() {
        let mut writer = StreamWriter::new(1);
        writer.packet_in(&Packet::new(b"x", 1).with_eos()).unwrap();
        writer.reset();

        writer.packet_in(&Packet::new(b"y", 1)).unwrap();
        let page = writer.flush().unwrap();
        assert!(page.is_bos());
        assert!(!page.is_eos());
        assert_eq!(page.sequence_number(), 0);
        assert_eq!(page.body(), b"y");
    }
}
