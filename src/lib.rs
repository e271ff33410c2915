#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_results)]
#![deny(clippy::as_conversions)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Reads and writes OGG container files / streams.
//!
//! The crate only understands the framing layer of OGG: pages, their segment tables and
//! the packets laced into them. What is carried inside the packets is up to the caller.
//!
//! Reading is a push / pull loop. Raw bytes are pushed into a [`SyncState`], which hands out
//! checksummed [`Page`]s. Pages are fed into the [`StreamReader`] of their logical stream,
//! which hands out whole [`Packet`]s. Writing is the inverse: packets go into a
//! [`StreamWriter`], which laces them into pages.
//!
//! [`Demuxer`] and [`Muxer`] drive these loops for `std::io` readers and writers.

use std::ops::Range;

#[cfg(feature = "decoder")]
pub use demuxer::{Demuxer, DemuxerConfig, ReadStatus};
#[cfg(feature = "encoder")]
pub use muxer::Muxer;
pub use packet::{Packet, PacketBuf};
pub use page::Page;
#[cfg(feature = "decoder")]
pub use read_error::{ReadError, Resynchronized};
#[cfg(feature = "decoder")]
pub use stream_reader::{PacketStatus, StreamReader};
#[cfg(feature = "encoder")]
pub use stream_writer::{StreamWriter, StreamWriterConfig};
#[cfg(feature = "decoder")]
pub use sync_state::{Pages, SyncState, SyncStatus};
#[cfg(feature = "encoder")]
pub use write_error::WriteError;

pub mod crc32;
#[cfg(feature = "decoder")]
mod demuxer;
#[cfg(feature = "encoder")]
mod muxer;
mod packet;
mod page;
#[cfg(feature = "decoder")]
mod read_error;
#[cfg(feature = "decoder")]
mod stream_reader;
#[cfg(feature = "encoder")]
mod stream_writer;
#[cfg(feature = "decoder")]
mod sync_state;
#[cfg(feature = "encoder")]
mod write_error;

/// The capture pattern every page starts with.
pub const PAGER_MARKER: [u8; 4] = *b"OggS";
/// Header type flag: the page continues a packet of the previous page.
pub const CONTINUATION_VALUE: u8 = 0x01;
/// Header type flag: first page of a logical bitstream.
pub const BOS_VALUE: u8 = 0x02;
/// Header type flag: last page of a logical bitstream.
pub const EOS_VALUE: u8 = 0x04;

/// Size of the fixed part of a page header.
pub const MIN_HEADER_SIZE: usize = 27;
/// Maximal number of segments (lacing values) on a page.
pub const MAX_SEGMENTS: usize = 255;
/// Maximal body size of a page.
pub const MAX_PAGE_DATA_SIZE: usize = MAX_SEGMENTS * 255;
/// Maximal size of a page including its header.
pub const MAX_PAGE_SIZE: usize = MIN_HEADER_SIZE + MAX_SEGMENTS + MAX_PAGE_DATA_SIZE;

pub(crate) const PAGER_MARKER_RANGE: Range<usize> = 0..4;
pub(crate) const VERSION_INDEX: usize = 4;
pub(crate) const HEADER_TYPE_INDEX: usize = 5;
pub(crate) const GRANULE_POSITION_RANGE: Range<usize> = 6..14;
pub(crate) const BITSTREAM_SERIAL_NUMBER_RANGE: Range<usize> = 14..18;
pub(crate) const PAGE_SEQUENCE_NUMBER_RANGE: Range<usize> = 18..22;
pub(crate) const CRC32_RANGE: Range<usize> = 22..26;
pub(crate) const SEGMENT_COUNT_INDEX: usize = 26;
pub(crate) const SEGMENT_TABLE_INDEX: usize = 27;
