//! Packet assembly for a single logical bitstream.

use log::{debug, trace, warn};

use crate::{Packet, Page, ReadError};

/// Result of asking a [`StreamReader`] for the next packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketStatus<'a> {
    /// No complete packet is buffered. Feed more pages.
    NeedMoreData,
    /// The next packet.
    Packet(Packet<'a>),
    /// Pages were lost at this point. The packets in flight were dropped.
    Corrupt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lacing {
    /// Marks data lost between two pages.
    Hole,
    Segment {
        len: u8,
        granule_position: i64,
        bos: bool,
        eos: bool,
    },
}

#[derive(Clone, Copy, Debug)]
struct Located {
    bytes: usize,
    segments: usize,
    granule_position: i64,
    bos: bool,
    eos: bool,
}

#[derive(Clone, Copy, Debug)]
enum Next {
    NeedMoreData,
    Hole,
    Packet(Located),
}

/// Reassembles the packets of one logical bitstream from its pages.
///
/// Pages are added with [`page_in()`](Self::page_in) in the order they were read, packets are
/// taken out with [`packet_out()`](Self::packet_out). Packets may span many pages and a page
/// may hold many packets.
#[derive(Clone, Debug)]
pub struct StreamReader {
    serial: u32,
    body: Vec<u8>,
    body_returned: usize,
    lacing: Vec<Lacing>,
    lacing_returned: usize,
    /// Segments before this index form complete packets.
    lacing_packet: usize,
    expected_sequence: Option<u32>,
    packet_number: i64,
    eos: bool,
}

impl StreamReader {
    /// Creates a new `StreamReader` for the logical bitstream with the given serial number.
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            body: Vec::new(),
            body_returned: 0,
            lacing: Vec::new(),
            lacing_returned: 0,
            lacing_packet: 0,
            expected_sequence: None,
            packet_number: 0,
            eos: false,
        }
    }

    /// The serial number of the logical bitstream.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// True once the last page of the logical bitstream was added.
    pub fn is_eos(&self) -> bool {
        self.eos
    }

    /// Drops all buffered data. The next page is accepted without a sequence check.
    pub fn reset(&mut self) {
        self.body.clear();
        self.body_returned = 0;
        self.lacing.clear();
        self.lacing_returned = 0;
        self.lacing_packet = 0;
        self.expected_sequence = None;
        self.packet_number = 0;
        self.eos = false;
    }

    /// Resets the state and assigns a new serial number.
    pub fn reset_serial(&mut self, serial: u32) {
        self.reset();
        self.serial = serial;
    }

    /// Adds the segments of a page.
    ///
    /// Missing pages are not an error here. They show up as [`PacketStatus::Corrupt`] once
    /// [`packet_out()`](Self::packet_out) reaches them.
    pub fn page_in(&mut self, page: &Page<'_>) -> Result<(), ReadError> {
        let _ = self.accept(page)?;
        Ok(())
    }

    /// Adds the segments of a page and reports missing pages right away.
    ///
    /// The page is still added if it is preceded by a gap, so the caller can keep going after
    /// handling the `ReadError::Discontinuity`.
    pub fn feed_page(&mut self, page: &Page<'_>) -> Result<(), ReadError> {
        match self.accept(page)? {
            Some(expected) => Err(ReadError::Discontinuity {
                serial: self.serial,
                expected,
                found: page.sequence_number(),
            }),
            None => Ok(()),
        }
    }

    /// Returns the next packet.
    pub fn packet_out(&mut self) -> PacketStatus<'_> {
        match self.locate() {
            Next::NeedMoreData => PacketStatus::NeedMoreData,
            Next::Hole => {
                self.lacing_returned += 1;
                self.packet_number += 1;
                PacketStatus::Corrupt
            }
            Next::Packet(located) => PacketStatus::Packet(self.take(located)),
        }
    }

    /// Returns the next packet without consuming it.
    pub fn packet_peek(&self) -> PacketStatus<'_> {
        match self.locate() {
            Next::NeedMoreData => PacketStatus::NeedMoreData,
            Next::Hole => PacketStatus::Corrupt,
            Next::Packet(located) => PacketStatus::Packet(Packet {
                data: &self.body[self.body_returned..self.body_returned + located.bytes],
                bos: located.bos,
                eos: located.eos,
                granule_position: located.granule_position,
                packet_number: self.packet_number,
            }),
        }
    }

    /// Returns the next packet, stepping over holes.
    ///
    /// Meant to be used together with [`feed_page()`](Self::feed_page), which already reports
    /// the holes.
    pub fn next_packet(&mut self) -> Option<Packet<'_>> {
        loop {
            match self.locate() {
                Next::NeedMoreData => return None,
                Next::Hole => {
                    debug!("bitstream {}: stepping over a hole", self.serial);
                    self.lacing_returned += 1;
                    self.packet_number += 1;
                }
                Next::Packet(located) => return Some(self.take(located)),
            }
        }
    }

    /// Returns the page sequence number expected next when there is a gap.
    fn accept(&mut self, page: &Page<'_>) -> Result<Option<u32>, ReadError> {
        if page.version() != 0 {
            return Err(ReadError::UnhandledBitstreamVersion(page.version()));
        }
        if page.serial() != self.serial {
            return Err(ReadError::SerialMismatch {
                expected: self.serial,
                found: page.serial(),
            });
        }

        self.compact();

        let sequence = page.sequence_number();
        let mut gap = None;
        if let Some(expected) = self.expected_sequence {
            if sequence != expected {
                debug!(
                    "bitstream {}: expected page {} but got page {}",
                    self.serial, expected, sequence
                );
                self.push_hole();
                gap = Some(expected);
            }
        }

        let mut segments = page.segment_table();
        let mut body = page.body();
        let mut bos = page.is_bos();
        let in_progress = self.lacing_packet < self.lacing.len();

        if page.is_continued() {
            if !in_progress {
                let mut count = 0;
                let mut bytes = 0;
                for &len in segments {
                    count += 1;
                    bytes += usize::from(len);
                    if len < 255 {
                        break;
                    }
                }
                debug!(
                    "bitstream {}: page {} continues no packet, dropped {} bytes",
                    self.serial, sequence, bytes
                );
                segments = &segments[count..];
                body = &body[bytes..];
                bos = false;
            }
        } else if in_progress {
            warn!(
                "bitstream {}: page {} does not continue the packet in progress",
                self.serial, sequence
            );
            self.push_hole();
        }

        self.body.extend_from_slice(body);

        let mut last_complete = None;
        for &len in segments {
            self.lacing.push(Lacing::Segment {
                len,
                granule_position: -1,
                bos,
                eos: false,
            });
            bos = false;
            if len < 255 {
                last_complete = Some(self.lacing.len() - 1);
                self.lacing_packet = self.lacing.len();
            }
        }

        if let Some(index) = last_complete {
            if let Lacing::Segment {
                granule_position, ..
            } = &mut self.lacing[index]
            {
                *granule_position = page.granule_position();
            }
        }

        if page.is_eos() {
            self.eos = true;
            if let Some(Lacing::Segment { eos, .. }) = self.lacing.last_mut() {
                *eos = true;
            }
        }

        self.expected_sequence = Some(sequence.wrapping_add(1));
        trace!(
            "bitstream {}: added page {} with {} segments",
            self.serial,
            sequence,
            segments.len()
        );

        Ok(gap)
    }

    /// Drops the data that was already handed out.
    fn compact(&mut self) {
        if self.body_returned != 0 {
            let remaining = self.body.len() - self.body_returned;
            self.body.copy_within(self.body_returned.., 0);
            self.body.truncate(remaining);
            self.body_returned = 0;
        }

        if self.lacing_returned != 0 {
            let remaining = self.lacing.len() - self.lacing_returned;
            self.lacing.copy_within(self.lacing_returned.., 0);
            self.lacing.truncate(remaining);
            self.lacing_packet -= self.lacing_returned;
            self.lacing_returned = 0;
        }
    }

    /// Drops the packet in progress and marks the loss.
    fn push_hole(&mut self) {
        let partial: usize = self.lacing[self.lacing_packet..]
            .iter()
            .map(|lacing| match lacing {
                Lacing::Segment { len, .. } => usize::from(*len),
                Lacing::Hole => 0,
            })
            .sum();
        self.body.truncate(self.body.len() - partial);
        self.lacing.truncate(self.lacing_packet);

        self.lacing.push(Lacing::Hole);
        self.lacing_packet = self.lacing.len();
    }

    fn locate(&self) -> Next {
        let mut bytes = 0;
        let mut bos = false;
        let mut eos = false;

        let pending = &self.lacing[self.lacing_returned..self.lacing_packet];
        for (offset, lacing) in pending.iter().enumerate() {
            match *lacing {
                Lacing::Hole => return Next::Hole,
                Lacing::Segment {
                    len,
                    granule_position,
                    bos: segment_bos,
                    eos: segment_eos,
                } => {
                    if offset == 0 {
                        bos = segment_bos;
                    }
                    eos |= segment_eos;
                    bytes += usize::from(len);
                    if len < 255 {
                        return Next::Packet(Located {
                            bytes,
                            segments: offset + 1,
                            granule_position,
                            bos,
                            eos,
                        });
                    }
                }
            }
        }

        Next::NeedMoreData
    }

    fn take(&mut self, located: Located) -> Packet<'_> {
        let start = self.body_returned;
        self.body_returned += located.bytes;
        self.lacing_returned += located.segments;

        let packet_number = self.packet_number;
        self.packet_number += 1;

        Packet {
            data: &self.body[start..start + located.bytes],
            bos: located.bos,
            eos: located.eos,
            granule_position: located.granule_position,
            packet_number,
        }
    }
}
