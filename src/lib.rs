//! VP8L histogram entropy model and histogram clustering.
//!
//! This crate is the statistics stage of a lossless WebP (VP8L) encoder. It
//! sits between the LZ77 matcher, which turns pixels into a stream of
//! literals and back-references, and the Huffman code builder:
//!
//! - [`Histogram`] counts symbols over the five VP8L alphabets (green/length/cache,
//!   red, blue, alpha and distance).
//! - [`entropy`] estimates, in fractional bits, what a Huffman code fitted to a
//!   histogram would cost, split into code description (header) and payload (bulk).
//! - [`HistogramSet`] owns a fixed number of histograms as one unit.
//! - [`build_histogram_image`] and [`get_histo_image_symbols`] tile the image,
//!   build one histogram per tile and greedily merge them into fewer shared
//!   codes (the meta-Huffman image).
//!
//! ```rust
//! use zenhisto::{get_histo_image_symbols, BackwardRefs, HistoImageConfig, PixOrCopy};
//!
//! // 8x8 image: left half red, right half blue.
//! let mut refs = BackwardRefs::new();
//! for _y in 0..8 {
//!     for x in 0..8 {
//!         refs.push(PixOrCopy::literal(if x < 4 { 0xffff_0000 } else { 0xff00_00ff }));
//!     }
//! }
//!
//! let config = HistoImageConfig::new().with_histogram_bits(2);
//! let image = get_histo_image_symbols(8, 8, &refs, &config)?;
//! assert_eq!(image.histogram_symbols.len(), 4);
//! assert!(image.histograms.len() <= 4);
//! # Ok::<(), zenhisto::HistogramError>(())
//! ```
//!
//! # no_std Support
//!
//! Everything works with `alloc` only:
//! ```toml
//! [dependencies]
//! zenhisto = { version = "...", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod encoder;

pub use encoder::vp8l::entropy;
pub use encoder::vp8l::{
    build_histogram_image, encode_histogram_image, get_histo_image_symbols,
    histo_bits_for_image, make_argb, BackwardRefs, HistoImage, HistoImageConfig, Histogram,
    HistogramSet, PixOrCopy, MAX_COPY_LENGTH, MAX_DISTANCE_CODE,
};
pub use encoder::{HistogramError, HistogramResult};
