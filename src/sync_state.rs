//! Page acquisition from a raw byte stream.

use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

use crate::page::{page_checksum, PageSpan};
use crate::{
    Page, ReadError, Resynchronized, CRC32_RANGE, MIN_HEADER_SIZE, PAGER_MARKER,
    PAGER_MARKER_RANGE, SEGMENT_COUNT_INDEX, SEGMENT_TABLE_INDEX,
};

/// Extra room added whenever the buffer has to grow.
const SLACK: usize = 4096;

/// Result of a scan for the next page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus<'a> {
    /// No complete page is buffered. Supply more bytes.
    NeedMoreData,
    /// A page with a valid checksum was found.
    PageReady(Page<'a>),
    /// Bytes were skipped while searching for the next page.
    Resynchronized {
        /// Number of bytes skipped.
        skipped: usize,
    },
}

/// Incremental scanner that finds pages in a stream of bytes.
///
/// Bytes are written into the buffer returned by [`buffer()`](Self::buffer) and committed with
/// [`wrote()`](Self::wrote), or copied in with [`supply_bytes()`](Self::supply_bytes). Pages
/// are then pulled with [`next_page()`](Self::next_page) or
/// [`drain_pages()`](Self::drain_pages).
///
/// Returned pages borrow the internal buffer. Bytes of a returned page stay in place until
/// the next call that needs room to write.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    data: Vec<u8>,
    scan: ScanState,
}

#[derive(Clone, Copy, Debug, Default)]
struct ScanState {
    /// End of the written data.
    fill: usize,
    /// Start of the data not yet returned as a page or skipped.
    returned: usize,
    /// Header size of the page at `returned`, once its segment table was read.
    header_bytes: usize,
    /// Body size of the page at `returned`, once its segment table was read.
    body_bytes: usize,
    /// A loss of sync was reported and no page was found since.
    unsynced: bool,
    skipped_total: usize,
}

#[derive(Clone, Copy, Debug)]
enum Step {
    NeedMoreData,
    Page(PageSpan),
    Skipped(usize),
}

impl ScanState {
    /// Tries to verify a page at the read position.
    fn seek(&mut self, data: &[u8]) -> Step {
        let start = self.returned;
        let available = self.fill - self.returned;

        if self.header_bytes == 0 {
            if available < MIN_HEADER_SIZE {
                return Step::NeedMoreData;
            }

            let marker = &data[start + PAGER_MARKER_RANGE.start..start + PAGER_MARKER_RANGE.end];
            if marker != PAGER_MARKER {
                return self.skip(data);
            }

            let header_bytes = MIN_HEADER_SIZE + usize::from(data[start + SEGMENT_COUNT_INDEX]);
            if available < header_bytes {
                return Step::NeedMoreData;
            }

            self.body_bytes = data[start + SEGMENT_TABLE_INDEX..start + header_bytes]
                .iter()
                .map(|&v| usize::from(v))
                .sum();
            self.header_bytes = header_bytes;
        }

        if self.header_bytes + self.body_bytes > available {
            return Step::NeedMoreData;
        }

        let span = PageSpan {
            start,
            header_len: self.header_bytes,
            body_len: self.body_bytes,
        };
        self.header_bytes = 0;
        self.body_bytes = 0;

        let page = span.view(data);
        let stored = LittleEndian::read_u32(&page.header()[CRC32_RANGE]);
        if page_checksum(page.header(), page.body()) != stored {
            // A corrupt page or a capture pattern that was just part of the data.
            return self.skip(data);
        }

        self.returned += page.len();
        self.unsynced = false;
        Step::Page(span)
    }

    /// Skips to the next byte that could start a capture pattern.
    fn skip(&mut self, data: &[u8]) -> Step {
        let start = self.returned;
        let next = data[start + 1..self.fill]
            .iter()
            .position(|&b| b == PAGER_MARKER[0])
            .map_or(self.fill, |offset| start + 1 + offset);

        let skipped = next - start;
        self.returned = next;
        self.skipped_total += skipped;
        Step::Skipped(skipped)
    }

    /// Seeks until a page is found or more data is needed. Only the first skip of a run is
    /// passed on.
    fn next(&mut self, data: &[u8]) -> Step {
        loop {
            match self.seek(data) {
                Step::Skipped(skipped) => {
                    if !self.unsynced {
                        self.unsynced = true;
                        warn!("lost sync, skipped {} bytes", skipped);
                        return Step::Skipped(skipped);
                    }
                }
                step => return step,
            }
        }
    }
}

impl SyncState {
    /// Creates an empty `SyncState`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a buffer with at least `size` bytes free to write into.
    ///
    /// Bytes of already returned pages are discarded first, which invalidates the pages
    /// handed out so far. The buffer grows when needed but never shrinks.
    pub fn buffer(&mut self, size: usize) -> &mut [u8] {
        let scan = &mut self.scan;
        if scan.returned != 0 {
            self.data.copy_within(scan.returned..scan.fill, 0);
            scan.fill -= scan.returned;
            scan.returned = 0;
        }

        if size > self.data.len() - scan.fill {
            let new_size = size + scan.fill + SLACK;
            self.data.resize(new_size, 0);
        }

        &mut self.data[scan.fill..]
    }

    /// Commits `bytes` bytes written into the buffer returned by [`buffer()`](Self::buffer).
    pub fn wrote(&mut self, bytes: usize) -> Result<(), ReadError> {
        let available = self.data.len() - self.scan.fill;
        if bytes > available {
            return Err(ReadError::BufferOverflow {
                requested: bytes,
                available,
            });
        }
        self.scan.fill += bytes;
        Ok(())
    }

    /// Copies the given bytes into the buffer.
    pub fn supply_bytes(&mut self, bytes: &[u8]) {
        let buffer = self.buffer(bytes.len());
        buffer[..bytes.len()].copy_from_slice(bytes);
        self.scan.fill += bytes.len();
    }

    /// Performs a single scan step at the read position.
    ///
    /// Unlike [`next_page()`](Self::next_page), every skip is reported.
    pub fn page_seek(&mut self) -> SyncStatus<'_> {
        match self.scan.seek(&self.data) {
            Step::NeedMoreData => SyncStatus::NeedMoreData,
            Step::Page(span) => SyncStatus::PageReady(span.view(&self.data)),
            Step::Skipped(skipped) => SyncStatus::Resynchronized { skipped },
        }
    }

    /// Returns the next page.
    ///
    /// Corrupt data is skipped. A loss of sync is reported only once until the next page is
    /// found, so a long run of garbage yields a single `Resynchronized`.
    pub fn next_page(&mut self) -> SyncStatus<'_> {
        match self.scan.next(&self.data) {
            Step::NeedMoreData => SyncStatus::NeedMoreData,
            Step::Page(span) => {
                let page = span.view(&self.data);
                trace!(
                    "found page {} of bitstream {} ({} bytes)",
                    page.sequence_number(),
                    page.serial(),
                    page.len()
                );
                SyncStatus::PageReady(page)
            }
            Step::Skipped(skipped) => SyncStatus::Resynchronized { skipped },
        }
    }

    /// Returns an iterator over all pages that are currently buffered.
    ///
    /// The iterator ends when more data is needed. Losses of sync are yielded as errors,
    /// following the same once-per-run rule as [`next_page()`](Self::next_page).
    pub fn drain_pages(&mut self) -> Pages<'_> {
        let fill = self.scan.fill;
        Pages {
            data: &self.data[..fill],
            scan: &mut self.scan,
        }
    }

    /// Forgets all buffered data. Used before seeking inside the underlying stream.
    ///
    /// Keeps the allocated buffer.
    pub fn reset(&mut self) {
        self.scan = ScanState::default();
    }

    /// Number of bytes buffered but not yet returned as a page or skipped.
    pub fn buffered(&self) -> usize {
        self.scan.fill - self.scan.returned
    }

    /// Total number of bytes skipped since creation or the last reset.
    pub fn skipped_bytes(&self) -> usize {
        self.scan.skipped_total
    }
}

/// Iterator over the buffered pages of a [`SyncState`].
#[derive(Debug)]
pub struct Pages<'a> {
    data: &'a [u8],
    scan: &'a mut ScanState,
}

impl<'a> Iterator for Pages<'a> {
    type Item = Result<Page<'a>, Resynchronized>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan.next(self.data) {
            Step::NeedMoreData => None,
            Step::Page(span) => Some(Ok(span.view(self.data))),
            Step::Skipped(skipped) => Some(Err(Resynchronized { skipped })),
        }
    }
}
