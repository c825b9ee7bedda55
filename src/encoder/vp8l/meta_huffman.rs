//! Meta-Huffman encoding for spatially-varying codes.
//!
//! Allows different Huffman tables for different regions of the image. The
//! image is cut into square tiles, each tile gets its own histogram, and tile
//! histograms are then merged greedily while merging lowers the estimated
//! total cost (per-histogram header overhead included).
//!
//! Clustering runs in three steps:
//!
//! 1. **combine**: candidate pairs (spatial neighbours, the previous tile with
//!    the same dominant symbols, sampled far partners, or every pair once few
//!    clusters remain) sit in a max-heap keyed by merge gain. The best pair is
//!    merged and the survivor proposes pairs with the neighbours it took over.
//!    Stale entries are scored again against the clusters that absorbed their
//!    slots. Ties are broken by slot index so the result does not depend on
//!    anything but the input.
//! 2. **refine**: single tiles move to the cluster that codes them cheapest,
//!    but only when the total estimate strictly drops.
//! 3. **compact**: surviving clusters are packed into a dense set in order of
//!    first use in the row-major tile scan.

use alloc::collections::{BTreeMap, BTreeSet, BinaryHeap};
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;

use super::histogram::{palette_bits_for_cache, Histogram};
use super::histogram_set::HistogramSet;
use super::types::{
    make_argb, BackwardRefs, HistoImageConfig, PixOrCopy, MAX_CACHE_BITS, MAX_COPY_LENGTH,
    MAX_DISTANCE_CODE, MAX_HUFFMAN_BITS,
};
use crate::encoder::{HistogramError, HistogramResult};

/// Histogram indices are stored in 16 bits of the entropy image.
const MAX_HISTO_TILES: usize = 1 << 16;

/// Cost drops smaller than this are float noise, not a reason to move a tile.
const MIN_MOVE_GAIN: f64 = 1e-6;

/// Clustered histogram image: the code groups and which tile uses which.
#[derive(Debug, Clone)]
pub struct HistoImage {
    /// Tile side is `1 << histo_bits` pixels.
    pub histo_bits: u8,
    /// Tiles per row.
    pub histo_xsize: usize,
    /// Tile rows.
    pub histo_ysize: usize,
    /// One histogram per code group, densely packed.
    pub histograms: HistogramSet,
    /// Code group of each tile in row-major order.
    pub histogram_symbols: Vec<u16>,
}

impl HistoImage {
    /// Number of code groups.
    pub fn num_histograms(&self) -> usize {
        self.histograms.len()
    }

    /// Code group used for the pixel at (x, y).
    pub fn histogram_index(&self, x: usize, y: usize) -> usize {
        let tile = (y >> self.histo_bits) * self.histo_xsize + (x >> self.histo_bits);
        self.histogram_symbols[tile] as usize
    }

    /// Estimated bits of all code groups.
    pub fn total_bits(&mut self) -> f64 {
        self.histograms.total_bits()
    }
}

/// Build one histogram per tile, in row-major tile order.
///
/// Each token is counted in the tile holding its first pixel, so a copy that
/// runs past a tile boundary belongs entirely to the tile it starts in.
pub fn build_histogram_image(
    width: usize,
    height: usize,
    refs: &BackwardRefs,
    config: &HistoImageConfig,
) -> HistogramResult<HistogramSet> {
    validate(width, height, refs, config)?;

    let histo_bits = config.histogram_bits;
    let histo_xsize = width.div_ceil(1 << histo_bits);
    let num_tiles = histo_xsize * height.div_ceil(1 << histo_bits);

    let mut image = HistogramSet::allocate(num_tiles, config.cache_bits)?;
    image.set_size(num_tiles);
    let tiles = image.as_mut_slice();

    let (mut x, mut y) = (0usize, 0usize);
    for token in refs.iter() {
        let ix = (y >> histo_bits) * histo_xsize + (x >> histo_bits);
        tiles[ix].ingest_one(token);
        x += token.pixel_len();
        y += x / width;
        x %= width;
    }
    Ok(image)
}

/// Build the histogram image and cluster it.
///
/// Returns the reduced set of histograms and the histogram index of every
/// tile. The estimated total cost of the result never exceeds that of
/// using one histogram per tile.
pub fn get_histo_image_symbols(
    width: usize,
    height: usize,
    refs: &BackwardRefs,
    config: &HistoImageConfig,
) -> HistogramResult<HistoImage> {
    let tiles = build_histogram_image(width, height, refs, config)?;
    let histo_bits = config.histogram_bits;
    let histo_xsize = width.div_ceil(1 << histo_bits);
    let histo_ysize = height.div_ceil(1 << histo_bits);

    let mut clusterer = Clusterer::new(tiles.as_slice(), histo_xsize, histo_ysize, config)?;
    let initial_bits = clusterer.total_bits();
    let initial_clusters = clusterer.live;
    let merges = clusterer.combine();
    let moves = clusterer.refine();
    let final_bits = clusterer.total_bits();
    let (histograms, histogram_symbols) = clusterer.compact()?;
    tiles.release();

    log::debug!(
        "histogram image {}x{} tiles: {} -> {} histograms ({} merges, {} tile moves), {:.0} -> {:.0} bits",
        histo_xsize,
        histo_ysize,
        initial_clusters,
        histograms.len(),
        merges,
        moves,
        initial_bits,
        final_bits,
    );

    Ok(HistoImage {
        histo_bits,
        histo_xsize,
        histo_ysize,
        histograms,
        histogram_symbols,
    })
}

/// Encode the histogram image as pixels.
/// Each tile's histogram index goes to green (low byte) and red (high byte).
pub fn encode_histogram_image(image: &HistoImage) -> Vec<u32> {
    image
        .histogram_symbols
        .iter()
        .map(|&group| {
            let lo = group as u8;
            let hi = (group >> 8) as u8;
            make_argb(255, hi, lo, 0)
        })
        .collect()
}

fn validate(
    width: usize,
    height: usize,
    refs: &BackwardRefs,
    config: &HistoImageConfig,
) -> HistogramResult<()> {
    if width == 0 || height == 0 {
        return Err(HistogramError::InvalidDimensions { width, height });
    }
    if config.histogram_bits > MAX_HUFFMAN_BITS {
        return Err(HistogramError::InvalidParameter(format!(
            "histogram_bits {} exceeds {MAX_HUFFMAN_BITS}",
            config.histogram_bits
        )));
    }
    if config.cache_bits > MAX_CACHE_BITS {
        return Err(HistogramError::InvalidParameter(format!(
            "cache_bits {} exceeds {MAX_CACHE_BITS}",
            config.cache_bits
        )));
    }

    let side = 1usize << config.histogram_bits;
    let tiles = width.div_ceil(side).saturating_mul(height.div_ceil(side));
    if tiles > MAX_HISTO_TILES {
        return Err(HistogramError::InvalidParameter(format!(
            "{tiles} histogram tiles exceed {MAX_HISTO_TILES}"
        )));
    }

    let cache_size = if config.cache_bits > 0 {
        1usize << config.cache_bits
    } else {
        0
    };
    let mut pixels = 0usize;
    for token in refs.iter() {
        match *token {
            PixOrCopy::CacheIdx(idx) if idx as usize >= cache_size => {
                return Err(HistogramError::InvalidParameter(format!(
                    "cache index {idx} with cache_bits {}",
                    config.cache_bits
                )));
            }
            PixOrCopy::Copy { len, .. } if len == 0 || len > MAX_COPY_LENGTH => {
                return Err(HistogramError::InvalidParameter(format!(
                    "copy length {len} outside 1..={MAX_COPY_LENGTH}"
                )));
            }
            PixOrCopy::Copy { dist, .. } if dist == 0 || dist > MAX_DISTANCE_CODE => {
                return Err(HistogramError::InvalidParameter(format!(
                    "distance code {dist} outside 1..={MAX_DISTANCE_CODE}"
                )));
            }
            _ => {}
        }
        pixels = pixels.saturating_add(token.pixel_len());
    }
    let capacity = width.saturating_mul(height);
    if pixels > capacity {
        return Err(HistogramError::TokensExceedImage { pixels, capacity });
    }
    Ok(())
}

/// A pair of clusters that would save `gain` bits if merged.
///
/// `a < b`. The generations record the slots' state at evaluation time; an
/// entry whose slots changed since is stale.
#[derive(Debug, Clone, Copy)]
struct MergeCandidate {
    gain: f64,
    a: u32,
    b: u32,
    gen_a: u32,
    gen_b: u32,
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCandidate {}

/// Park-Miller minimal standard generator with a fixed seed, so sampled
/// merge partners are the same on every run.
struct Lehmer(u32);

impl Lehmer {
    fn new() -> Self {
        Self(1)
    }

    /// Next value in `0..n` (`n > 0`).
    fn below(&mut self, n: usize) -> usize {
        self.0 = ((u64::from(self.0) * 48271) % 0x7fff_ffff) as u32;
        self.0 as usize % n
    }
}

/// Most frequent symbol of each alphabet, lowest symbol on ties.
fn dominant_symbols(histogram: &Histogram) -> [u16; 5] {
    histogram.alphabets().map(|counts| {
        let mut best = (0, 0);
        for (symbol, &count) in counts.iter().enumerate() {
            if count > best.1 {
                best = (symbol, count);
            }
        }
        best.0 as u16
    })
}

/// Working state of the clustering.
struct Clusterer<'a> {
    /// Per-tile histograms, read only.
    tiles: &'a [Histogram],
    histo_xsize: usize,
    histo_ysize: usize,
    config: &'a HistoImageConfig,
    /// Slot `i` starts as a copy of tile `i`; merged slots stay allocated.
    clusters: HistogramSet,
    alive: Vec<bool>,
    live: usize,
    /// Bumped whenever a slot's counts change.
    generation: Vec<u32>,
    /// Merged slot -> the slot it was merged into.
    redirect: Vec<u32>,
    /// Spatially adjacent live clusters.
    neighbors: Vec<BTreeSet<u32>>,
    /// Previous tile with the same dominant symbols.
    bucket_prev: Vec<Option<u32>>,
    /// First tile with the same dominant symbols.
    bucket_head: Vec<u32>,
    /// Cluster of each tile, valid once combining is done.
    tile_cluster: Vec<u32>,
    queue: BinaryHeap<MergeCandidate>,
    scratch: Histogram,
    rng: Lehmer,
    evaluations: usize,
    max_evaluations: usize,
}

impl<'a> Clusterer<'a> {
    fn new(
        tiles: &'a [Histogram],
        histo_xsize: usize,
        histo_ysize: usize,
        config: &'a HistoImageConfig,
    ) -> HistogramResult<Self> {
        let n = tiles.len();
        debug_assert_eq!(n, histo_xsize * histo_ysize);

        let mut clusters = HistogramSet::allocate(n, config.cache_bits)?;
        clusters.set_size(n);
        let mut alive = vec![false; n];
        let mut live = 0;
        for ((slot, tile), alive) in clusters.as_mut_slice().iter_mut().zip(tiles).zip(&mut alive) {
            if !tile.is_empty() {
                slot.add(tile);
                slot.bit_cost();
                *alive = true;
                live += 1;
            }
        }

        let mut neighbors = vec![BTreeSet::new(); n];
        for ty in 0..histo_ysize {
            for tx in 0..histo_xsize {
                let i = ty * histo_xsize + tx;
                if !alive[i] {
                    continue;
                }
                let right = (tx + 1 < histo_xsize).then_some(i + 1);
                let down = (ty + 1 < histo_ysize).then_some(i + histo_xsize);
                for j in [right, down].into_iter().flatten() {
                    if alive[j] {
                        neighbors[i].insert(j as u32);
                        neighbors[j].insert(i as u32);
                    }
                }
            }
        }

        let mut bucket_prev = vec![None; n];
        let mut bucket_head: Vec<u32> = (0..n as u32).collect();
        let mut buckets: BTreeMap<[u16; 5], (u32, u32)> = BTreeMap::new();
        for (i, tile) in tiles.iter().enumerate().filter(|&(i, _)| alive[i]) {
            let (head, last) = buckets
                .entry(dominant_symbols(tile))
                .or_insert((i as u32, i as u32));
            if *last != i as u32 {
                bucket_prev[i] = Some(*last);
                *last = i as u32;
            }
            bucket_head[i] = *head;
        }

        let scratch = Histogram::try_new(palette_bits_for_cache(config.cache_bits))
            .map_err(|_| HistogramError::AllocationFailure { histograms: 1 })?;

        Ok(Self {
            tiles,
            histo_xsize,
            histo_ysize,
            config,
            clusters,
            alive,
            live,
            generation: vec![0; n],
            redirect: (0..n as u32).collect(),
            neighbors,
            bucket_prev,
            bucket_head,
            tile_cluster: Vec::new(),
            queue: BinaryHeap::new(),
            scratch,
            rng: Lehmer::new(),
            evaluations: 0,
            max_evaluations: config.max_evaluations(n),
        })
    }

    /// Estimated bits of all live clusters.
    fn total_bits(&mut self) -> f64 {
        self.clusters
            .as_mut_slice()
            .iter_mut()
            .zip(&self.alive)
            .filter(|(_, alive)| **alive)
            .map(|(h, _)| h.bit_cost())
            .sum()
    }

    /// Surviving slot of a (possibly merged) slot.
    fn find(&mut self, mut slot: usize) -> usize {
        let mut root = slot;
        while self.redirect[root] as usize != root {
            root = self.redirect[root] as usize;
        }
        while self.redirect[slot] as usize != root {
            let next = self.redirect[slot] as usize;
            self.redirect[slot] = root as u32;
            slot = next;
        }
        root
    }

    /// Greedy merging. Returns the number of merges.
    fn combine(&mut self) -> usize {
        for slot in 0..self.alive.len() {
            if self.alive[slot] {
                let adjacent = self.neighbors[slot]
                    .range(slot as u32 + 1..)
                    .map(|&p| p as usize)
                    .collect();
                self.propose(slot, adjacent, true);
            }
        }

        let mut merges = 0;
        while let Some(candidate) = self.queue.pop() {
            let (a, b) = (candidate.a as usize, candidate.b as usize);
            if !self.alive[a]
                || !self.alive[b]
                || self.generation[a] != candidate.gen_a
                || self.generation[b] != candidate.gen_b
            {
                let (a, b) = (self.find(a), self.find(b));
                if a != b && self.evaluations < self.max_evaluations {
                    self.push_candidate(a, b);
                }
                continue;
            }

            let gained = self.merge(a, b);
            merges += 1;
            log::trace!("merged cluster {b} into {a}, gain {:.1} bits", candidate.gain);
            if self.live < 2 {
                break;
            }
            self.propose(a, gained, false);
        }
        self.queue.clear();
        merges
    }

    /// Queue merge candidates for `slot`: the given adjacent clusters, the
    /// cluster holding the previous tile with the same dominant symbols, and
    /// sampled far partners. While few clusters remain every live cluster is
    /// a candidate instead (only higher slots on the first round).
    ///
    /// Queued pairs with older neighbours are scored again when popped, so
    /// after a merge only the neighbours new to the survivor are passed in.
    fn propose(&mut self, slot: usize, adjacent: Vec<usize>, first_round: bool) {
        let mut partners: Vec<usize> = if self.live <= self.config.exhaustive_clusters() {
            (0..self.alive.len())
                .filter(|&p| self.alive[p] && p != slot && (!first_round || p > slot))
                .collect()
        } else {
            let mut partners = adjacent;
            if let Some(prev) = self.bucket_prev[slot] {
                let p = self.find(prev as usize);
                if p != slot {
                    partners.push(p);
                }
            }
            for _ in 0..self.config.extra_candidates() {
                let pick = self.rng.below(self.alive.len());
                let p = self.find(pick);
                if self.alive[p] && p != slot {
                    partners.push(p);
                }
            }
            partners
        };
        partners.sort_unstable();
        partners.dedup();

        for partner in partners {
            if self.evaluations >= self.max_evaluations {
                break;
            }
            self.push_candidate(slot, partner);
        }
    }

    /// Evaluate merging two live slots and queue the pair if it pays off.
    fn push_candidate(&mut self, a: usize, b: usize) {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        self.evaluations += 1;

        let (ha, hb) = self.clusters.pair_mut(a, b);
        let cost_a = ha.bit_cost();
        let cost_b = hb.bit_cost();
        ha.add_into(hb, &mut self.scratch);
        let gain = cost_a + cost_b - self.scratch.bit_cost();

        if gain > self.config.min_gain() {
            self.queue.push(MergeCandidate {
                gain,
                a: a as u32,
                b: b as u32,
                gen_a: self.generation[a],
                gen_b: self.generation[b],
            });
        }
    }

    /// Merge slot `b` into slot `a`.
    /// Returns the neighbours `a` gained from `b`.
    fn merge(&mut self, a: usize, b: usize) -> Vec<usize> {
        let (dst, src) = self.clusters.pair_mut(a, b);
        dst.add(src);

        self.alive[b] = false;
        self.live -= 1;
        self.generation[a] = self.generation[a].wrapping_add(1);
        self.generation[b] = self.generation[b].wrapping_add(1);
        self.redirect[b] = a as u32;

        let moved = core::mem::take(&mut self.neighbors[b]);
        let mut gained = Vec::new();
        for n in moved {
            let n_slot = n as usize;
            self.neighbors[n_slot].remove(&(b as u32));
            if n_slot != a {
                self.neighbors[n_slot].insert(a as u32);
                if self.neighbors[a].insert(n) {
                    gained.push(n_slot);
                }
            }
        }
        self.neighbors[a].remove(&(b as u32));
        gained
    }

    /// Move single tiles between clusters while that lowers the total.
    /// Returns the number of moves.
    fn refine(&mut self) -> usize {
        self.resolve_tiles();
        let mut moves = 0;
        for _ in 0..self.config.refine_passes() {
            let mut pass_moves = 0;
            for tile in 0..self.tiles.len() {
                if self.tiles[tile].is_empty() || self.live < 2 {
                    continue;
                }
                if let Some(target) = self.best_move(tile) {
                    self.move_tile(tile, target);
                    pass_moves += 1;
                }
            }
            moves += pass_moves;
            if pass_moves == 0 {
                break;
            }
        }
        moves
    }

    /// Live clusters a tile may move to: every cluster when few remain,
    /// otherwise the clusters of the four adjacent tiles and of the first
    /// tile with the same dominant symbols.
    fn move_targets(&self, tile: usize, from: usize) -> Vec<usize> {
        let mut targets: Vec<usize> = if self.live <= self.config.exhaustive_clusters() {
            (0..self.alive.len()).filter(|&c| self.alive[c]).collect()
        } else {
            let (tx, ty) = (tile % self.histo_xsize, tile / self.histo_xsize);
            let mut peers = Vec::with_capacity(5);
            if tx > 0 {
                peers.push(tile - 1);
            }
            if tx + 1 < self.histo_xsize {
                peers.push(tile + 1);
            }
            if ty > 0 {
                peers.push(tile - self.histo_xsize);
            }
            if ty + 1 < self.histo_ysize {
                peers.push(tile + self.histo_xsize);
            }
            peers.push(self.bucket_head[tile] as usize);
            peers
                .into_iter()
                .map(|t| self.tile_cluster[t] as usize)
                .collect()
        };
        targets.retain(|&c| c != from && self.alive[c]);
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Cheapest cluster for `tile` if moving it there strictly lowers the total.
    fn best_move(&mut self, tile: usize) -> Option<usize> {
        let tiles = self.tiles;
        let from = self.tile_cluster[tile] as usize;
        let targets = self.move_targets(tile, from);
        if targets.is_empty() {
            return None;
        }

        let base_from = self.clusters.as_mut_slice()[from].bit_cost();
        self.scratch.copy_from(&self.clusters.as_slice()[from]);
        self.scratch.remove(&tiles[tile]);
        let without = self.scratch.bit_cost();

        let mut best = None;
        let mut best_delta = -MIN_MOVE_GAIN;
        for to in targets {
            let base_to = self.clusters.as_mut_slice()[to].bit_cost();
            self.clusters.as_slice()[to].add_into(&tiles[tile], &mut self.scratch);
            let delta = without + self.scratch.bit_cost() - base_from - base_to;
            if delta < best_delta {
                best_delta = delta;
                best = Some(to);
            }
        }
        best
    }

    fn move_tile(&mut self, tile: usize, to: usize) {
        let tiles = self.tiles;
        let from = self.tile_cluster[tile] as usize;
        let (src, dst) = self.clusters.pair_mut(from, to);
        src.remove(&tiles[tile]);
        dst.add(&tiles[tile]);
        let emptied = src.is_empty();

        self.tile_cluster[tile] = to as u32;
        if emptied {
            self.alive[from] = false;
            self.live -= 1;
        }
        log::trace!("moved tile {tile} from cluster {from} to {to}");
    }

    /// Pack live clusters densely, in order of first use.
    fn compact(self) -> HistogramResult<(HistogramSet, Vec<u16>)> {
        debug_assert_eq!(self.tile_cluster.len(), self.tiles.len());
        let size = self.live.max(1);
        let mut out = HistogramSet::allocate(size, self.config.cache_bits)?;
        out.set_size(size);

        let mut remap: Vec<Option<u16>> = vec![None; self.clusters.len()];
        let mut next = 0usize;
        let mut symbols: Vec<Option<u16>> = Vec::with_capacity(self.tiles.len());
        for (tile, &cluster) in self.tiles.iter().zip(&self.tile_cluster) {
            if tile.is_empty() {
                symbols.push(None);
                continue;
            }
            let cluster = cluster as usize;
            let index = match remap[cluster] {
                Some(index) => index,
                None => {
                    let index = next as u16;
                    out.as_mut_slice()[next].copy_from(&self.clusters.as_slice()[cluster]);
                    remap[cluster] = Some(index);
                    next += 1;
                    index
                }
            };
            symbols.push(Some(index));
        }
        debug_assert_eq!(next, self.live);

        // Tiles without tokens never select a code; give them their
        // predecessor's so the entropy image stays smooth.
        let first = symbols.iter().flatten().next().copied().unwrap_or(0);
        let mut last = first;
        let symbols = symbols
            .into_iter()
            .map(|symbol| {
                if let Some(symbol) = symbol {
                    last = symbol;
                }
                last
            })
            .collect();
        Ok((out, symbols))
    }

    /// Record the surviving cluster of every tile.
    fn resolve_tiles(&mut self) {
        let mut tile_cluster = Vec::with_capacity(self.tiles.len());
        for tile in 0..self.tiles.len() {
            tile_cluster.push(self.find(tile) as u32);
        }
        self.tile_cluster = tile_cluster;
    }
}
