//! Lossless encoder statistics stage

mod error;
/// VP8L (lossless) histogram model and clustering
pub mod vp8l;

pub use error::{HistogramError, HistogramResult};
