//! Core data structures for the VP8L histogram stage.

use alloc::vec::Vec;

/// Number of literal codes (green channel values).
pub const NUM_LITERAL_CODES: usize = 256;
/// Number of copy-length prefix codes.
pub const NUM_LENGTH_CODES: usize = 24;
/// Number of distance prefix codes.
pub const NUM_DISTANCE_CODES: usize = 40;

/// Green + length alphabet size, without color cache codes (280).
pub const ALPHABET_SIZE_GREEN: usize = NUM_LITERAL_CODES + NUM_LENGTH_CODES;
/// Red alphabet size.
pub const ALPHABET_SIZE_RED: usize = 256;
/// Blue alphabet size.
pub const ALPHABET_SIZE_BLUE: usize = 256;
/// Alpha alphabet size.
pub const ALPHABET_SIZE_ALPHA: usize = 256;
/// Distance alphabet size.
pub const ALPHABET_SIZE_DISTANCE: usize = NUM_DISTANCE_CODES;

/// Longest copy a length prefix code can express.
pub const MAX_COPY_LENGTH: u16 = 4096;
/// Largest distance code a distance prefix code can express.
pub const MAX_DISTANCE_CODE: u32 = 1 << 20;

/// Largest color cache (palette code) width allowed by VP8L.
pub const MAX_CACHE_BITS: u8 = 11;

/// Min/max Huffman image bits (VP8L: 3 bits, range [2, 9]).
pub const MIN_HUFFMAN_BITS: u8 = 2;
/// Largest histogram bits value; smaller values (down to 0) are accepted for tuning.
pub const MAX_HUFFMAN_BITS: u8 = 9; // 2 + (1 << 3) - 1
/// Maximum number of histogram tiles picked by [`histo_bits_for_image`].
pub const MAX_HUFF_IMAGE_SIZE: usize = 2600;

/// Histogram clustering configuration.
///
/// `quality` trades encode time for a more compact set of entropy codes:
/// higher values evaluate more merge candidates, accept smaller gains and
/// spend more passes refining the tile assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct HistoImageConfig {
    /// Quality level 0-100. Default: 75.
    pub quality: u8,
    /// Tile side is `1 << histogram_bits` pixels (0-9). Default: 4.
    pub histogram_bits: u8,
    /// Color cache bits (0 = no cache, 1-11). Default: 0.
    pub cache_bits: u8,
}

impl Default for HistoImageConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoImageConfig {
    /// Create a configuration with defaults (quality 75, 16x16 tiles, no cache).
    #[must_use]
    pub fn new() -> Self {
        Self {
            quality: 75,
            histogram_bits: 4,
            cache_bits: 0,
        }
    }

    /// Set quality (clamped to 0-100).
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.min(100);
        self
    }

    /// Set tile size bits. Validated when the histogram image is built.
    #[must_use]
    pub fn with_histogram_bits(mut self, bits: u8) -> Self {
        self.histogram_bits = bits;
        self
    }

    /// Set color cache bits. Validated when the histogram image is built.
    #[must_use]
    pub fn with_cache_bits(mut self, bits: u8) -> Self {
        self.cache_bits = bits;
        self
    }

    /// Smallest merge gain (in bits) that is accepted.
    ///
    /// Zero at quality 100, rising linearly to 8 bits at quality 0.
    pub fn min_gain(&self) -> f64 {
        f64::from(100 - self.quality.min(100)) * 0.08
    }

    /// Far (non-adjacent) merge partners proposed per cluster.
    pub fn extra_candidates(&self) -> usize {
        1 + self.quality as usize / 16
    }

    /// Budget of merge-gain evaluations for `num_tiles` tiles.
    pub fn max_evaluations(&self, num_tiles: usize) -> usize {
        let per_tile = 8 + (self.quality as usize * self.quality as usize) / 128;
        num_tiles.saturating_mul(per_tile).max(64)
    }

    /// Cluster count at or below which every pair of clusters is a merge
    /// candidate instead of only spatial neighbours and sampled partners.
    pub fn exhaustive_clusters(&self) -> usize {
        8 + self.quality as usize / 2
    }

    /// Number of tile reassignment passes after merging.
    pub fn refine_passes(&self) -> usize {
        match self.quality {
            0..=24 => 0,
            25..=74 => 1,
            _ => 2,
        }
    }
}

/// Pick histogram bits for an image from the encoder method (0-6).
///
/// Palette images get larger tiles. The result is clamped so the tile grid
/// stays within [`MAX_HUFF_IMAGE_SIZE`] while not collapsing to one tile
/// needlessly.
pub fn histo_bits_for_image(width: usize, height: usize, method: u8, use_palette: bool) -> u8 {
    let base = if use_palette { 9i32 } else { 7i32 };
    let histo_bits = (base - method as i32).clamp(MIN_HUFFMAN_BITS as i32, MAX_HUFFMAN_BITS as i32);
    let tiles = |bits: u8| {
        subsample_size(width as u32, bits) as usize * subsample_size(height as u32, bits) as usize
    };

    let mut bits = histo_bits as u8;
    while bits < MAX_HUFFMAN_BITS && tiles(bits) > MAX_HUFF_IMAGE_SIZE {
        bits += 1;
    }
    while bits > MIN_HUFFMAN_BITS && tiles(bits - 1) == 1 {
        bits -= 1;
    }
    bits
}

/// One token of the LZ77 stream a histogram is built from.
///
/// Each variant lands in different alphabets: a literal in green, red, blue
/// and alpha; a cache hit in the palette tail of the literal alphabet; a copy
/// in one length code and one distance code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixOrCopy {
    /// ARGB pixel coded channel by channel.
    Literal(u32),
    /// Color cache hit, `0..1 << cache_bits`.
    CacheIdx(u16),
    /// Repeat `len` pixels starting `dist` back (plane code, 1-based).
    Copy {
        /// Pixels copied, `1..=MAX_COPY_LENGTH`.
        len: u16,
        /// VP8L distance code, `1..=MAX_DISTANCE_CODE`.
        dist: u32,
    },
}

impl PixOrCopy {
    /// Literal token.
    #[inline]
    pub fn literal(argb: u32) -> Self {
        Self::Literal(argb)
    }

    /// Color cache token.
    #[inline]
    pub fn cache_idx(idx: u16) -> Self {
        Self::CacheIdx(idx)
    }

    /// Copy token.
    #[inline]
    pub fn copy(len: u16, dist: u32) -> Self {
        Self::Copy { len, dist }
    }

    /// Pixels this token covers in raster order.
    #[inline]
    pub fn pixel_len(&self) -> usize {
        match *self {
            Self::Copy { len, .. } => usize::from(len),
            Self::Literal(_) | Self::CacheIdx(_) => 1,
        }
    }
}

/// Token stream covering an image in raster order.
///
/// The stream may stop short of the last pixel; it may never run past it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardRefs {
    /// Tokens in stream order.
    pub tokens: Vec<PixOrCopy>,
}

impl BackwardRefs {
    /// Empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty stream with room for `tokens` tokens.
    pub fn with_capacity(tokens: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(tokens),
        }
    }

    /// Append a token.
    #[inline]
    pub fn push(&mut self, token: PixOrCopy) {
        self.tokens.push(token);
    }

    /// Number of tokens (not pixels).
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True without tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in stream order.
    pub fn iter(&self) -> core::slice::Iter<'_, PixOrCopy> {
        self.tokens.iter()
    }

    /// Pixels covered by the whole stream.
    pub fn pixel_count(&self) -> usize {
        self.iter().map(PixOrCopy::pixel_len).sum()
    }
}

impl From<Vec<PixOrCopy>> for BackwardRefs {
    fn from(tokens: Vec<PixOrCopy>) -> Self {
        Self { tokens }
    }
}

impl FromIterator<PixOrCopy> for BackwardRefs {
    fn from_iter<I: IntoIterator<Item = PixOrCopy>>(iter: I) -> Self {
        Vec::from_iter(iter).into()
    }
}

impl Extend<PixOrCopy> for BackwardRefs {
    fn extend<I: IntoIterator<Item = PixOrCopy>>(&mut self, iter: I) {
        self.tokens.extend(iter);
    }
}

/// Alpha channel of an ARGB pixel.
#[inline]
pub const fn argb_alpha(argb: u32) -> u8 {
    argb.to_be_bytes()[0]
}

/// Red channel.
#[inline]
pub const fn argb_red(argb: u32) -> u8 {
    argb.to_be_bytes()[1]
}

/// Green channel.
#[inline]
pub const fn argb_green(argb: u32) -> u8 {
    argb.to_be_bytes()[2]
}

/// Blue channel.
#[inline]
pub const fn argb_blue(argb: u32) -> u8 {
    argb.to_be_bytes()[3]
}

/// Pack ARGB channels into a pixel.
#[inline]
pub const fn make_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    u32::from_be_bytes([a, r, g, b])
}

/// Number of `1 << bits` tiles needed to cover `size` pixels.
#[inline]
pub const fn subsample_size(size: u32, bits: u8) -> u32 {
    size.div_ceil(1 << bits)
}
