//! Entropy calculation for VP8L encoding.
//!
//! Estimates bit costs for Huffman-coded symbol sequences without building
//! the codes. All results are fractional bits.
//!
//! The estimate of a histogram has two parts:
//!
//! - **bulk**: the payload coded with an ideal code fitted to the histogram
//!   itself, `Σ count(s) * (log2(total) - log2(count(s)))` per alphabet, plus
//!   the raw extra bits of length and distance prefix codes;
//! - **header**: the cost of describing the five codes, paid once per
//!   histogram that becomes its own coding context.

use alloc::vec;
use alloc::vec::Vec;

use super::histogram::{distance_code_extra_bits, length_code_extra_bits, Histogram};
use super::types::{NUM_LENGTH_CODES, NUM_LITERAL_CODES};

/// Size of the code length code alphabet.
const CODE_LENGTH_CODES: usize = 19;
/// Bits for the code length code's own lengths (3 bits each).
const HUFFMAN_CODE_OF_HUFFMAN_CODE_SIZE: f64 = (CODE_LENGTH_CODES * 3) as f64;
/// Code lengths are typically not stored in full length.
const SMALL_BIAS: f64 = 9.1;

/// Used-symbol summary of one alphabet.
struct Population {
    total: u64,
    nonzeros: usize,
    last_symbol: usize,
}

fn population(counts: &[u32]) -> Population {
    let mut pop = Population {
        total: 0,
        nonzeros: 0,
        last_symbol: 0,
    };
    for (i, &c) in counts.iter().enumerate() {
        if c > 0 {
            pop.total += u64::from(c);
            pop.nonzeros += 1;
            pop.last_symbol = i;
        }
    }
    pop
}

#[inline]
fn log2_count(v: u64) -> f64 {
    if v <= 1 {
        0.0
    } else {
        libm::log2(v as f64)
    }
}

/// Ideal code length of a symbol seen `count` times; 0 for unused symbols.
#[inline]
fn symbol_bits(log_total: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        log_total - log2_count(u64::from(count))
    }
}

/// Convert population counts to per-symbol bit cost estimates.
///
/// Each used symbol costs `log2(total) - log2(count)`. Unused symbols cost 0,
/// and an alphabet with at most one used symbol costs nothing at all.
pub fn population_to_bit_estimates(counts: &[u32]) -> Vec<f64> {
    let pop = population(counts);
    if pop.nonzeros <= 1 {
        return vec![0.0; counts.len()];
    }

    let log_total = log2_count(pop.total);
    counts
        .iter()
        .map(|&count| symbol_bits(log_total, count))
        .collect()
}

/// Shannon entropy of an alphabet, in total bits (not bits per symbol).
pub fn bits_entropy(counts: &[u32]) -> f64 {
    let pop = population(counts);
    if pop.nonzeros <= 1 {
        return 0.0;
    }

    let log_total = log2_count(pop.total);
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&count| f64::from(count) * symbol_bits(log_total, count))
        .sum()
}

/// Cost of describing a Huffman code for `population`.
///
/// Unused alphabets are free. A single used symbol below 256 is sent as a
/// VP8L simple code (3 flag bits plus a 1 or 8 bit symbol). Anything else is
/// modelled as a run-length coded sequence of code lengths, using runs of
/// equal population counts as a proxy for runs of equal code lengths.
pub fn huffman_cost(population_counts: &[u32]) -> f64 {
    let pop = population(population_counts);
    match pop.nonzeros {
        0 => return 0.0,
        1 if pop.last_symbol < 256 => {
            return if pop.last_symbol < 2 { 4.0 } else { 11.0 };
        }
        _ => {}
    }

    let mut bits = HUFFMAN_CODE_OF_HUFFMAN_CODE_SIZE - SMALL_BIAS;
    let mut i = 0;
    while i < population_counts.len() {
        let value = population_counts[i];
        let streak = population_counts[i..]
            .iter()
            .take_while(|&&c| c == value)
            .count();
        bits += streak_cost(value == 0, streak);
        i += streak;
    }
    bits
}

#[inline]
fn streak_cost(zeros: bool, streak: usize) -> f64 {
    let streak = streak as f64;
    match (streak > 3.0, zeros) {
        (true, true) => 1.5625 + 0.234375 * streak,
        (true, false) => 2.578125 + 0.703125 * streak,
        (false, true) => 1.796875 * streak,
        (false, false) => 3.28125 * streak,
    }
}

/// Raw extra bits carried by the length and distance prefix codes.
pub fn extra_bits_cost(h: &Histogram) -> f64 {
    let lengths = &h.literal()[NUM_LITERAL_CODES..NUM_LITERAL_CODES + NUM_LENGTH_CODES];
    let length_bits: u64 = lengths
        .iter()
        .enumerate()
        .map(|(code, &c)| u64::from(c) * u64::from(length_code_extra_bits(code as u8)))
        .sum();
    let distance_bits: u64 = h
        .distance()
        .iter()
        .enumerate()
        .map(|(code, &c)| u64::from(c) * u64::from(distance_code_extra_bits(code as u8)))
        .sum();
    (length_bits + distance_bits) as f64
}

/// Estimated Huffman dictionary cost of all five codes of a histogram.
pub fn estimate_bits_header(h: &Histogram) -> f64 {
    h.alphabets().iter().map(|counts| huffman_cost(counts)).sum()
}

/// Estimated payload cost of a histogram, excluding the code descriptions.
pub fn estimate_bits_bulk(h: &Histogram) -> f64 {
    let entropy: f64 = h.alphabets().iter().map(|counts| bits_entropy(counts)).sum();
    entropy + extra_bits_cost(h)
}

/// Estimated total cost (header + bulk) of coding a histogram.
///
/// This is the value [`Histogram::bit_cost`] caches.
pub fn estimate_bits(h: &Histogram) -> f64 {
    if h.is_empty() {
        return 0.0;
    }
    estimate_bits_header(h) + estimate_bits_bulk(h)
}

/// Bits saved by coding `a` and `b` with one shared code.
///
/// Positive when merging pays off. Cached costs are used when valid.
pub fn merge_gain(a: &Histogram, b: &Histogram) -> f64 {
    let cost_a = a.cached_bit_cost().unwrap_or_else(|| estimate_bits(a));
    let cost_b = b.cached_bit_cost().unwrap_or_else(|| estimate_bits(b));
    cost_a + cost_b - estimate_bits(&a.add_copy(b))
}

#[cfg(test)]
mod tests {
    use super::super::types::{make_argb, BackwardRefs, PixOrCopy};
    use super::*;

    fn literals(pixels: &[u32]) -> Histogram {
        let refs: BackwardRefs = pixels.iter().map(|&p| PixOrCopy::literal(p)).collect();
        Histogram::create(&refs, None)
    }

    #[test]
    fn test_bits_entropy_uniform() {
        // 4 symbols, 100 each: 2 bits per symbol, 400 symbols.
        let counts = [100u32; 4];
        assert!((bits_entropy(&counts) - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_bits_entropy_single() {
        let mut counts = [0u32; 256];
        counts[42] = 100;
        assert_eq!(bits_entropy(&counts), 0.0);
    }

    #[test]
    fn test_population_to_bit_estimates() {
        let bits = population_to_bit_estimates(&[1, 1, 2, 0]);
        assert_eq!(bits.len(), 4);
        assert!((bits[0] - 2.0).abs() < 1e-12);
        assert!((bits[1] - 2.0).abs() < 1e-12);
        assert!((bits[2] - 1.0).abs() < 1e-12);
        assert_eq!(bits[3], 0.0);

        // Degenerate alphabets cost nothing.
        assert!(population_to_bit_estimates(&[0, 7, 0]).iter().all(|&b| b == 0.0));
        assert!(population_to_bit_estimates(&[0, 0]).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_estimates_weighted_by_counts_equal_entropy() {
        let counts = [5u32, 0, 17, 3, 3, 1, 0, 40];
        let weighted: f64 = population_to_bit_estimates(&counts)
            .iter()
            .zip(&counts)
            .map(|(bits, &c)| bits * f64::from(c))
            .sum();
        assert!((weighted - bits_entropy(&counts)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_histogram_costs_nothing() {
        let h = Histogram::new(None);
        assert_eq!(estimate_bits(&h), 0.0);
        assert_eq!(estimate_bits_bulk(&h), 0.0);
        assert_eq!(estimate_bits_header(&h), 0.0);
        assert_eq!(estimate_bits(&Histogram::new(Some(8))), 0.0);
    }

    #[test]
    fn test_single_color_has_zero_bulk() {
        let h = literals(&[make_argb(255, 10, 20, 30); 64]);
        assert_eq!(estimate_bits_bulk(&h), 0.0);
        // Four simple codes with 8-bit symbols, distance unused.
        assert_eq!(estimate_bits_header(&h), 44.0);
    }

    #[test]
    fn test_extra_bits_in_bulk() {
        // len 100 -> code 13 with 5 extra bits; distance code 1 has none.
        let refs: BackwardRefs = [PixOrCopy::copy(100, 1)].into_iter().collect();
        let h = Histogram::create(&refs, None);
        assert_eq!(extra_bits_cost(&h), 5.0);
        assert_eq!(estimate_bits_bulk(&h), 5.0);
    }

    #[test]
    fn test_header_grows_with_spread() {
        let narrow = literals(&[make_argb(255, 0, 0, 0), make_argb(255, 0, 1, 0)]);
        let pixels: Vec<u32> = (0..=255u8).map(|v| make_argb(255, v, v, v)).collect();
        let wide = literals(&pixels);
        assert!(estimate_bits_header(&wide) > estimate_bits_header(&narrow));
        assert!(huffman_cost(&[0; 40]) == 0.0);
    }

    #[test]
    fn test_merge_gain_identical_is_header() {
        let pixels: Vec<u32> = (0..64u32).map(|i| make_argb(255, i as u8, (i * 3) as u8, 7)).collect();
        let a = literals(&pixels);
        let b = a.clone();
        let gain = merge_gain(&a, &b);
        assert!((gain - estimate_bits_header(&a)).abs() < 1e-6);
        assert!(gain > 0.0);
    }

    #[test]
    fn test_merge_gain_disjoint_is_negative() {
        let a = literals(&[make_argb(255, 1, 2, 3); 256]);
        let b = literals(&[make_argb(0, 200, 100, 50); 256]);
        assert!(merge_gain(&a, &b) < 0.0);
    }
}
