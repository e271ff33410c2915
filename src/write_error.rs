//! Bitstream write errors.

/// Errors that can occur when writing OGG bitstreams.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A `std::io::Error`.
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    /// Unknown bitstream serial number.
    #[error("unknown bitstream serial number: {0}")]
    UnknownBitstreamSerialNumber(u32),
    /// Logical bitstream already initialized.
    #[error("logical bitstream {0} already initialized")]
    BitstreamAlreadyInitialized(u32),
    /// A packet was submitted after the end of the logical bitstream.
    #[error("logical bitstream {0} already ended")]
    EndOfStream(u32),
}
