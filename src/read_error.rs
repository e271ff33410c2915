//! Bitstream read errors.

/// Errors that can occur when reading OGG bitstreams.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// A `std::io::Error`.
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    /// Reader only supports bitstreams of version `0`.
    #[error("reader only supports bitstreams of version `0`. Found version: {0}")]
    UnhandledBitstreamVersion(u8),
    /// A page was handed to the stream state of another logical bitstream.
    #[error("page of bitstream {found} handed to the state of bitstream {expected}")]
    SerialMismatch {
        /// Serial number of the stream state.
        expected: u32,
        /// Serial number of the page.
        found: u32,
    },
    /// More bytes were committed than previously reserved.
    #[error("wrote {requested} bytes into a buffer with only {available} bytes free")]
    BufferOverflow {
        /// Bytes committed.
        requested: usize,
        /// Bytes that were free.
        available: usize,
    },
    /// Pages of the logical bitstream are missing. Packets in flight were dropped.
    #[error("bitstream {serial} expected page {expected} but got page {found}")]
    Discontinuity {
        /// Serial number of the logical bitstream.
        serial: u32,
        /// The page sequence number that was expected.
        expected: u32,
        /// The page sequence number that was received.
        found: u32,
    },
}

/// Bytes had to be skipped to find the next page.
///
/// Recoverable. Reported once per run of skipped bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("lost sync, skipped {skipped} bytes")]
pub struct Resynchronized {
    /// Number of bytes skipped.
    pub skipped: usize,
}
