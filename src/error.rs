use std::io;

use thiserror::Error;

/// Errors that can occur while quantizing or encoding a stream.
///
/// Once the pipeline observes any of these the stream is aborted; the
/// destination may hold a truncated file and must be discarded.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// Writing, flushing or closing the destination failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Quantization was interrupted by a cancellation request
    #[error("quantization cancelled")]
    Cancelled,

    /// Duplicate frame index, index below the write cursor, mixed indexing
    /// modes, or a gap left when the stream was finished
    #[error("frame ordering violation: {0}")]
    OrderingViolation(&'static str),

    /// Operation invoked before `start` or after the stream was aborted or
    /// completed
    #[error("the stream has not been started")]
    NotStarted,

    /// Pixel data length doesn't match the frame dimensions
    #[error("invalid pixel data: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u16, height: u16 },
}

pub type Result<T> = std::result::Result<T, EncodingError>;
