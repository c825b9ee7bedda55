//! Error types for the histogram stage.

use alloc::string::String;
use thiserror::Error;

/// Errors that can occur while building histograms or the histogram image.
///
/// Broken internal invariants (such as removing counts that were never
/// added) are contract violations checked with debug assertions, not
/// variants of this type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistogramError {
    /// A histogram set could not be reserved.
    #[error("Failed to allocate {histograms} histograms")]
    AllocationFailure {
        /// Number of histograms requested.
        histograms: usize,
    },

    /// A tuning parameter is outside the range allowed by VP8L.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The image has a zero dimension.
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// The image width.
        width: usize,
        /// The image height.
        height: usize,
    },

    /// The token stream covers more pixels than the image holds.
    #[error("Tokens cover {pixels} pixels but the image has {capacity}")]
    TokensExceedImage {
        /// Pixels covered by the token stream.
        pixels: usize,
        /// Pixels in the image.
        capacity: usize,
    },
}

/// Result type for the histogram stage.
pub type HistogramResult<T> = core::result::Result<T, HistogramError>;
