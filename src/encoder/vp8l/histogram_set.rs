//! Fixed-capacity histogram collections.
//!
//! A [`HistogramSet`] creates all of its histograms up front and releases
//! them together. During clustering slots are emptied and the logical size
//! shrinks, but no histogram is reallocated.

use alloc::vec::Vec;

use super::histogram::{palette_bits_for_cache, Histogram};
use super::types::MAX_CACHE_BITS;
use crate::encoder::{HistogramError, HistogramResult};

/// Collection of histograms with fixed capacity.
#[derive(Debug, Clone)]
pub struct HistogramSet {
    /// All slots; `histograms.len()` is the capacity.
    histograms: Vec<Histogram>,
    /// Number of slots currently in use.
    size: usize,
}

impl HistogramSet {
    /// Reserve `capacity` histograms initialized for `cache_bits`
    /// (0 = no color cache). The set starts with size 0.
    pub fn allocate(capacity: usize, cache_bits: u8) -> HistogramResult<Self> {
        if cache_bits > MAX_CACHE_BITS {
            return Err(HistogramError::InvalidParameter(alloc::format!(
                "cache_bits {cache_bits} exceeds {MAX_CACHE_BITS}"
            )));
        }
        let failure = || HistogramError::AllocationFailure {
            histograms: capacity,
        };

        let palette_code_bits = palette_bits_for_cache(cache_bits);
        let mut histograms = Vec::new();
        histograms
            .try_reserve_exact(capacity)
            .map_err(|_| failure())?;
        for _ in 0..capacity {
            histograms.push(Histogram::try_new(palette_code_bits).map_err(|_| failure())?);
        }
        Ok(Self {
            histograms,
            size: 0,
        })
    }

    /// Release every histogram at once.
    pub fn release(self) {
        drop(self);
    }

    /// Maximum number of histograms.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.histograms.len()
    }

    /// Number of histograms in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// True when no slot is in use.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Set the number of slots in use (callers that fill slots directly).
    pub fn set_size(&mut self, size: usize) {
        assert!(
            size <= self.capacity(),
            "size {size} exceeds capacity {}",
            self.capacity()
        );
        self.size = size;
    }

    /// Shrink the in-use prefix to `size` slots.
    pub fn truncate(&mut self, size: usize) {
        self.size = self.size.min(size);
    }

    /// Histogram in slot `index`, if in use.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Histogram> {
        self.as_slice().get(index)
    }

    /// Mutable histogram in slot `index`, if in use.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Histogram> {
        self.as_mut_slice().get_mut(index)
    }

    /// The in-use histograms.
    #[inline]
    pub fn as_slice(&self) -> &[Histogram] {
        &self.histograms[..self.size]
    }

    /// The in-use histograms, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Histogram] {
        &mut self.histograms[..self.size]
    }

    /// Iterate over the in-use histograms.
    pub fn iter(&self) -> core::slice::Iter<'_, Histogram> {
        self.as_slice().iter()
    }

    /// Two distinct in-use slots, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either index is not in use.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Histogram, &mut Histogram) {
        assert_ne!(a, b, "pair_mut needs two distinct slots");
        let slots = self.as_mut_slice();
        if a < b {
            let (lo, hi) = slots.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = slots.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    /// Sum of the estimated bit costs of all in-use histograms.
    pub fn total_bits(&mut self) -> f64 {
        self.as_mut_slice().iter_mut().map(Histogram::bit_cost).sum()
    }
}

impl<'a> IntoIterator for &'a HistogramSet {
    type Item = &'a Histogram;
    type IntoIter = core::slice::Iter<'a, Histogram>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::{make_argb, PixOrCopy};
    use super::*;

    #[test]
    fn test_allocate() {
        let set = HistogramSet::allocate(6, 3).unwrap();
        assert_eq!(set.capacity(), 6);
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
        assert!(set.get(0).is_none());
        set.release();
    }

    #[test]
    fn test_palette_bits_from_cache_bits() {
        let mut set = HistogramSet::allocate(2, 0).unwrap();
        set.set_size(2);
        assert!(set.iter().all(|h| h.palette_code_bits().is_none()));

        let mut set = HistogramSet::allocate(2, 5).unwrap();
        set.set_size(2);
        assert!(set.iter().all(|h| h.num_codes() == 256 + 24 + 32));
    }

    #[test]
    fn test_rejects_oversized_cache() {
        assert!(matches!(
            HistogramSet::allocate(1, 12),
            Err(HistogramError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_allocation_failure() {
        assert!(matches!(
            HistogramSet::allocate(usize::MAX / 2, 0),
            Err(HistogramError::AllocationFailure { .. })
        ));
    }

    #[test]
    fn test_pair_mut_and_total_bits() {
        let mut set = HistogramSet::allocate(3, 0).unwrap();
        set.set_size(3);
        set.get_mut(0)
            .unwrap()
            .ingest_one(&PixOrCopy::literal(make_argb(255, 1, 2, 3)));
        set.get_mut(2)
            .unwrap()
            .ingest_one(&PixOrCopy::literal(make_argb(255, 4, 5, 6)));

        let before = set.total_bits();
        {
            let (dst, src) = set.pair_mut(2, 0);
            dst.add(src);
        }
        assert_eq!(set.get(2).unwrap().num_tokens(), 2);
        assert_eq!(set.get(0).unwrap().num_tokens(), 1);
        assert!(set.total_bits() > before);

        set.truncate(1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.capacity(), 3);
    }
}
