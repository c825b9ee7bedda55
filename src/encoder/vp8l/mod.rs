//! VP8L (Lossless WebP) histogram stage.
//!
//! Symbol statistics, entropy estimates and the meta-Huffman histogram
//! image used by the VP8L lossless format:
//! <https://developers.google.com/speed/webp/docs/webp_lossless_bitstream_specification>

pub mod entropy;
mod histogram;
mod histogram_set;
mod meta_huffman;
mod types;

pub use histogram::{
    distance_code_extra_bits, distance_code_to_prefix, length_code_extra_bits, length_to_code,
    literal_alphabet_size, palette_bits_for_cache, trivial_symbol, Histogram,
};
pub use histogram_set::HistogramSet;
pub use meta_huffman::{
    build_histogram_image, encode_histogram_image, get_histo_image_symbols, HistoImage,
};
pub use types::{
    argb_alpha, argb_blue, argb_green, argb_red, histo_bits_for_image, make_argb,
    subsample_size, BackwardRefs, HistoImageConfig, PixOrCopy, ALPHABET_SIZE_ALPHA,
    ALPHABET_SIZE_BLUE, ALPHABET_SIZE_DISTANCE, ALPHABET_SIZE_GREEN, ALPHABET_SIZE_RED,
    MAX_CACHE_BITS, MAX_COPY_LENGTH, MAX_DISTANCE_CODE, MAX_HUFFMAN_BITS, MIN_HUFFMAN_BITS,
    NUM_DISTANCE_CODES, NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};
