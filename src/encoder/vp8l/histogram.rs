//! Symbol counts over the five VP8L alphabets.
//!
//! Histograms track symbol frequencies for Huffman code construction. The
//! counts can only change through token ingestion, [`Histogram::add`] and
//! [`Histogram::remove`]; each of these invalidates the cached bit cost.

use alloc::collections::TryReserveError;
use alloc::vec;
use alloc::vec::Vec;

use super::entropy::estimate_bits;
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, BackwardRefs, PixOrCopy, ALPHABET_SIZE_ALPHA,
    ALPHABET_SIZE_BLUE, ALPHABET_SIZE_DISTANCE, ALPHABET_SIZE_GREEN, ALPHABET_SIZE_RED,
    MAX_CACHE_BITS, NUM_LITERAL_CODES,
};

/// Symbol counts for one Huffman code group (five codes).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Green channel + length codes + palette codes (256 + 24 + palette size).
    literal: Vec<u32>,
    red: [u32; ALPHABET_SIZE_RED],
    blue: [u32; ALPHABET_SIZE_BLUE],
    alpha: [u32; ALPHABET_SIZE_ALPHA],
    /// Distance prefix codes.
    distance: [u32; ALPHABET_SIZE_DISTANCE],
    /// Palette code bits (`None` = no palette codes in the literal alphabet).
    palette_code_bits: Option<u8>,
    /// Cached `estimate_bits(self)`; `None` once the counts change.
    bit_cost: Option<f64>,
}

impl Histogram {
    /// Create an empty histogram with the given palette code bits.
    pub fn new(palette_code_bits: Option<u8>) -> Self {
        Self {
            literal: vec![0; literal_alphabet_size(palette_code_bits)],
            red: [0; ALPHABET_SIZE_RED],
            blue: [0; ALPHABET_SIZE_BLUE],
            alpha: [0; ALPHABET_SIZE_ALPHA],
            distance: [0; ALPHABET_SIZE_DISTANCE],
            palette_code_bits,
            bit_cost: None,
        }
    }

    /// Like [`Histogram::new`], but reports allocation failure of the
    /// literal table instead of aborting.
    pub fn try_new(palette_code_bits: Option<u8>) -> Result<Self, TryReserveError> {
        let size = literal_alphabet_size(palette_code_bits);
        let mut literal = Vec::new();
        literal.try_reserve_exact(size)?;
        literal.resize(size, 0);
        Ok(Self {
            literal,
            red: [0; ALPHABET_SIZE_RED],
            blue: [0; ALPHABET_SIZE_BLUE],
            alpha: [0; ALPHABET_SIZE_ALPHA],
            distance: [0; ALPHABET_SIZE_DISTANCE],
            palette_code_bits,
            bit_cost: None,
        })
    }

    /// Count every token of `refs`.
    pub fn create(refs: &BackwardRefs, palette_code_bits: Option<u8>) -> Self {
        let mut h = Self::new(palette_code_bits);
        for token in refs.iter() {
            h.ingest_one(token);
        }
        h
    }

    /// Reset all counts and set new palette code bits.
    pub fn init(&mut self, palette_code_bits: Option<u8>) {
        self.palette_code_bits = palette_code_bits;
        self.literal.clear();
        self.literal.resize(literal_alphabet_size(palette_code_bits), 0);
        self.clear();
    }

    /// Zero every count, keeping the palette size.
    pub fn clear(&mut self) {
        self.literal.fill(0);
        self.red.fill(0);
        self.blue.fill(0);
        self.alpha.fill(0);
        self.distance.fill(0);
        self.bit_cost = None;
    }

    /// Count a single token.
    ///
    /// Pixels count in all four channel alphabets, cache indices in the palette
    /// tail of the literal alphabet, and copies in the length part of the
    /// literal alphabet plus the distance alphabet.
    #[inline]
    pub fn ingest_one(&mut self, token: &PixOrCopy) {
        match *token {
            PixOrCopy::Literal(argb) => self.add_literal(argb),
            PixOrCopy::CacheIdx(idx) => self.add_cache_idx(idx),
            PixOrCopy::Copy { len, dist } => self.add_backward_ref(len, dist),
        }
        self.bit_cost = None;
    }

    #[inline]
    fn add_literal(&mut self, argb: u32) {
        self.literal[argb_green(argb) as usize] += 1;
        self.red[argb_red(argb) as usize] += 1;
        self.blue[argb_blue(argb) as usize] += 1;
        self.alpha[argb_alpha(argb) as usize] += 1;
    }

    #[inline]
    fn add_cache_idx(&mut self, idx: u16) {
        let code = ALPHABET_SIZE_GREEN + idx as usize;
        debug_assert!(
            code < self.literal.len(),
            "cache index {idx} outside palette of {:?} bits",
            self.palette_code_bits
        );
        self.literal[code] += 1;
    }

    #[inline]
    fn add_backward_ref(&mut self, len: u16, dist_code: u32) {
        let (len_code, _) = length_to_code(len);
        let (dist_idx, _) = distance_code_to_prefix(dist_code);

        self.literal[NUM_LITERAL_CODES + len_code as usize] += 1;
        self.distance[dist_idx as usize] += 1;
    }

    /// Size of the literal alphabet: 256 + 24 + palette size.
    #[inline]
    pub fn num_codes(&self) -> usize {
        literal_alphabet_size(self.palette_code_bits)
    }

    /// Palette code bits this histogram was initialized with.
    #[inline]
    pub fn palette_code_bits(&self) -> Option<u8> {
        self.palette_code_bits
    }

    /// Green + length + palette counts.
    #[inline]
    pub fn literal(&self) -> &[u32] {
        &self.literal
    }

    /// Red channel counts.
    #[inline]
    pub fn red(&self) -> &[u32; ALPHABET_SIZE_RED] {
        &self.red
    }

    /// Blue channel counts.
    #[inline]
    pub fn blue(&self) -> &[u32; ALPHABET_SIZE_BLUE] {
        &self.blue
    }

    /// Alpha channel counts.
    #[inline]
    pub fn alpha(&self) -> &[u32; ALPHABET_SIZE_ALPHA] {
        &self.alpha
    }

    /// Distance prefix code counts.
    #[inline]
    pub fn distance(&self) -> &[u32; ALPHABET_SIZE_DISTANCE] {
        &self.distance
    }

    /// The five alphabets in VP8L tree order: literal, red, blue, alpha, distance.
    pub fn alphabets(&self) -> [&[u32]; 5] {
        [
            self.literal.as_slice(),
            &self.red,
            &self.blue,
            &self.alpha,
            &self.distance,
        ]
    }

    /// Number of tokens counted.
    ///
    /// Every token adds exactly one count to the literal alphabet.
    pub fn num_tokens(&self) -> u64 {
        self.literal.iter().map(|&c| u64::from(c)).sum()
    }

    /// True when no token has been counted.
    pub fn is_empty(&self) -> bool {
        self.literal.iter().all(|&c| c == 0)
    }

    /// Cached bit cost, if still valid.
    #[inline]
    pub fn cached_bit_cost(&self) -> Option<f64> {
        self.bit_cost
    }

    /// Estimated bit cost, computed and cached when invalidated.
    pub fn bit_cost(&mut self) -> f64 {
        match self.bit_cost {
            Some(cost) => cost,
            None => {
                let cost = estimate_bits(self);
                self.bit_cost = Some(cost);
                cost
            }
        }
    }

    /// Add the counts of `other` (same palette size) to this histogram.
    pub fn add(&mut self, other: &Histogram) {
        debug_assert_eq!(self.palette_code_bits, other.palette_code_bits);
        add_counts(&mut self.literal, &other.literal);
        add_counts(&mut self.red, &other.red);
        add_counts(&mut self.blue, &other.blue);
        add_counts(&mut self.alpha, &other.alpha);
        add_counts(&mut self.distance, &other.distance);
        self.bit_cost = None;
    }

    /// Subtract a histogram whose counts are contained in this one.
    ///
    /// Every count of `other` must be <= the matching count of `self`. This is
    /// checked in debug builds; release builds clamp at zero.
    pub fn remove(&mut self, other: &Histogram) {
        debug_assert_eq!(self.palette_code_bits, other.palette_code_bits);
        sub_counts(&mut self.literal, &other.literal);
        sub_counts(&mut self.red, &other.red);
        sub_counts(&mut self.blue, &other.blue);
        sub_counts(&mut self.alpha, &other.alpha);
        sub_counts(&mut self.distance, &other.distance);
        self.bit_cost = None;
    }

    /// Sum of `self` and `other` as a new histogram.
    pub fn add_copy(&self, other: &Histogram) -> Histogram {
        let mut combined = self.clone();
        combined.add(other);
        combined
    }

    /// Write `self + other` into `out`, reusing its allocation.
    pub fn add_into(&self, other: &Histogram, out: &mut Histogram) {
        out.copy_from(self);
        out.add(other);
    }

    /// Overwrite this histogram with the counts and cached cost of `other`,
    /// reusing the literal allocation.
    pub fn copy_from(&mut self, other: &Histogram) {
        self.literal.clear();
        self.literal.extend_from_slice(&other.literal);
        self.red = other.red;
        self.blue = other.blue;
        self.alpha = other.alpha;
        self.distance = other.distance;
        self.palette_code_bits = other.palette_code_bits;
        self.bit_cost = other.bit_cost;
    }

    /// The only used symbol of each alphabet (in [`Self::alphabets`]
    /// order), or `None` where zero or several symbols are used.
    pub fn trivial_symbols(&self) -> [Option<usize>; 5] {
        self.alphabets().map(trivial_symbol)
    }
}

/// Index of the single nonzero count, if exactly one exists.
pub fn trivial_symbol(counts: &[u32]) -> Option<usize> {
    let mut used = counts.iter().enumerate().filter(|&(_, &c)| c > 0);
    match (used.next(), used.next()) {
        (Some((symbol, _)), None) => Some(symbol),
        _ => None,
    }
}

#[inline]
fn add_counts(dst: &mut [u32], src: &[u32]) {
    for (a, &b) in dst.iter_mut().zip(src) {
        *a += b;
    }
}

#[inline]
fn sub_counts(dst: &mut [u32], src: &[u32]) {
    for (a, &b) in dst.iter_mut().zip(src) {
        debug_assert!(b <= *a, "removing {b} from count {a}");
        *a = a.saturating_sub(b);
    }
}

/// Calculate literal alphabet size including palette codes.
#[inline]
pub fn literal_alphabet_size(palette_code_bits: Option<u8>) -> usize {
    match palette_code_bits {
        Some(bits) => {
            debug_assert!(bits <= MAX_CACHE_BITS);
            ALPHABET_SIZE_GREEN + (1 << bits)
        }
        None => ALPHABET_SIZE_GREEN,
    }
}

/// Palette code bits for a color cache of `cache_bits` (0 = no cache).
#[inline]
pub fn palette_bits_for_cache(cache_bits: u8) -> Option<u8> {
    (cache_bits > 0).then_some(cache_bits)
}

/// Length prefix code of a copy length and the value of its extra bits.
pub fn length_to_code(len: u16) -> (u8, u16) {
    debug_assert!(len > 0);
    let (code, extra) = prefix_encode(u32::from(len));
    (code, extra as u16)
}

/// Extra bits following a length prefix code.
pub fn length_code_extra_bits(code: u8) -> u8 {
    prefix_extra_bits(code)
}

/// Distance prefix code of a (1-based) distance code and its extra bits value.
pub fn distance_code_to_prefix(dist_code: u32) -> (u8, u32) {
    debug_assert!(dist_code > 0);
    prefix_encode(dist_code)
}

/// Extra bits following a distance prefix code.
pub fn distance_code_extra_bits(code: u8) -> u8 {
    prefix_extra_bits(code)
}

/// VP8L prefix coding: values 1-4 map to codes 0-3 with no extra bits,
/// larger values keep the two highest bits of `value - 1` in the code.
#[inline]
fn prefix_encode(value: u32) -> (u8, u32) {
    if value <= 4 {
        return (value.saturating_sub(1) as u8, 0);
    }

    let v = value - 1;
    let top = v.ilog2();
    let extra_bits = top - 1;
    let code = 2 * top + ((v >> extra_bits) & 1);
    (code as u8, v & ((1 << extra_bits) - 1))
}

#[inline]
fn prefix_extra_bits(code: u8) -> u8 {
    match code {
        0..=3 => 0,
        _ => code / 2 - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{make_argb, NUM_DISTANCE_CODES, NUM_LENGTH_CODES};
    use super::*;

    #[test]
    fn test_length_codes() {
        for len in 1..=4u16 {
            assert_eq!(length_to_code(len), (len as u8 - 1, 0));
        }

        // 5 - 1 = 4: highest bit 2, second bit 0 -> code 4
        assert_eq!(length_to_code(5), (4, 0));
        assert_eq!(length_to_code(6), (4, 1));
        // 7 - 1 = 6: second bit 1 -> code 5
        assert_eq!(length_to_code(7), (5, 0));

        for len in 1..=4095u16 {
            let (code, extra) = length_to_code(len);
            assert!((code as usize) < NUM_LENGTH_CODES, "code {code} for len {len}");
            assert!(extra < (1 << length_code_extra_bits(code)).max(1));
        }
    }

    #[test]
    fn test_distance_codes() {
        for dist in 1..=4u32 {
            assert_eq!(distance_code_to_prefix(dist), (dist as u8 - 1, 0));
        }
        // 100 - 1 = 99 = 0b1100011: code 2*6 + 1, 5 extra bits holding 3.
        assert_eq!(distance_code_to_prefix(100), (13, 3));
        // Largest VP8L distance code stays inside the alphabet.
        let (code, _) = distance_code_to_prefix(1 << 20);
        assert!((code as usize) < NUM_DISTANCE_CODES);
        assert_eq!(distance_code_extra_bits(39), 18);
    }

    #[test]
    fn test_histogram_literal() {
        let mut h = Histogram::new(None);
        h.ingest_one(&PixOrCopy::literal(0xFF112233)); // A=FF, R=11, G=22, B=33

        assert_eq!(h.literal()[0x22], 1); // Green
        assert_eq!(h.red()[0x11], 1);
        assert_eq!(h.blue()[0x33], 1);
        assert_eq!(h.alpha()[0xFF], 1);
        assert_eq!(h.num_tokens(), 1);
    }

    #[test]
    fn test_histogram_copy_and_cache() {
        let mut h = Histogram::new(Some(4));
        h.ingest_one(&PixOrCopy::copy(7, 3));
        h.ingest_one(&PixOrCopy::cache_idx(15));

        assert_eq!(h.literal()[NUM_LITERAL_CODES + 5], 1);
        assert_eq!(h.distance()[2], 1);
        assert_eq!(h.literal()[ALPHABET_SIZE_GREEN + 15], 1);
        // Neither token touches the color channels.
        assert!(h.red().iter().all(|&c| c == 0));
        assert!(h.blue().iter().all(|&c| c == 0));
        assert!(h.alpha().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_longest_copy_then_add_copy() {
        let mut near = Histogram::new(None);
        near.ingest_one(&PixOrCopy::copy(4096, 1));
        let mut far = Histogram::new(None);
        far.ingest_one(&PixOrCopy::copy(1, 1 << 20));

        assert_eq!(near.literal()[NUM_LITERAL_CODES + NUM_LENGTH_CODES - 1], 1);
        assert_eq!(far.distance()[NUM_DISTANCE_CODES - 1], 1);

        let both = near.add_copy(&far);
        assert_eq!(both.num_tokens(), 2);
        assert_eq!(both.literal()[NUM_LITERAL_CODES], 1);
        assert_eq!(both.literal()[NUM_LITERAL_CODES + NUM_LENGTH_CODES - 1], 1);
        assert_eq!(both.distance()[0], 1);
        assert_eq!(both.distance()[NUM_DISTANCE_CODES - 1], 1);
        // Operands are untouched.
        assert_eq!(near.num_tokens(), 1);
        assert_eq!(far.num_tokens(), 1);
    }

    #[test]
    fn test_num_codes() {
        assert_eq!(Histogram::new(None).num_codes(), 280); // 256 + 24
        assert_eq!(Histogram::new(Some(1)).num_codes(), 282); // 280 + 2
        assert_eq!(Histogram::new(Some(5)).num_codes(), 256 + NUM_LENGTH_CODES + 32);
        assert_eq!(Histogram::new(Some(11)).num_codes(), 2328); // 280 + 2048
        assert_eq!(palette_bits_for_cache(0), None);
        assert_eq!(palette_bits_for_cache(10), Some(10));
    }

    #[test]
    fn test_init_resizes_literal() {
        let mut h = Histogram::new(None);
        h.ingest_one(&PixOrCopy::literal(make_argb(1, 2, 3, 4)));
        h.init(Some(3));
        assert_eq!(h.literal().len(), 288);
        assert!(h.is_empty());
        assert_eq!(h.palette_code_bits(), Some(3));
    }

    #[test]
    fn test_add_remove_inverse() {
        let a = Histogram::create(
            &[
                PixOrCopy::literal(make_argb(255, 1, 2, 3)),
                PixOrCopy::copy(40, 12),
                PixOrCopy::literal(make_argb(128, 9, 9, 9)),
            ]
            .into_iter()
            .collect(),
            None,
        );
        let b = Histogram::create(
            &[PixOrCopy::literal(make_argb(255, 1, 2, 3))].into_iter().collect(),
            None,
        );

        let mut sum = a.add_copy(&b);
        assert_eq!(sum.num_tokens(), 4);
        sum.remove(&b);
        assert_eq!(sum.alphabets(), a.alphabets());
    }

    #[test]
    fn test_mutation_invalidates_cost() {
        let mut h = Histogram::new(None);
        h.ingest_one(&PixOrCopy::literal(make_argb(255, 0, 0, 0)));
        h.ingest_one(&PixOrCopy::literal(make_argb(255, 0, 1, 0)));
        let cost = h.bit_cost();
        assert_eq!(h.cached_bit_cost(), Some(cost));

        let other = h.clone();
        h.add(&other);
        assert_eq!(h.cached_bit_cost(), None);
        let doubled = h.bit_cost();
        assert!(doubled > cost);

        h.remove(&other);
        assert_eq!(h.cached_bit_cost(), None);
        assert!((h.bit_cost() - cost).abs() < 1e-9);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "removing")]
    fn test_remove_underflow_panics_in_debug() {
        let mut small = Histogram::new(None);
        let mut big = Histogram::new(None);
        big.ingest_one(&PixOrCopy::literal(0));
        small.remove(&big);
    }

    #[test]
    fn test_trivial_symbols() {
        let mut h = Histogram::new(None);
        for _ in 0..3 {
            h.ingest_one(&PixOrCopy::literal(make_argb(255, 10, 20, 30)));
        }
        assert_eq!(
            h.trivial_symbols(),
            [Some(20), Some(10), Some(30), Some(255), None]
        );
        h.ingest_one(&PixOrCopy::literal(make_argb(255, 11, 20, 30)));
        assert_eq!(h.trivial_symbols()[1], None);
        assert_eq!(trivial_symbol(&[0, 0, 5]), Some(2));
    }
}
