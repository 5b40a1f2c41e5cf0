//! Deterministic permutation sequences for Freedman-Lane inference.
//!
//! A [`Shuffler`] is an immutable value built from (seed, subject count).
//! The sequence is drawn once, at construction, in a single sequential pass:
//! attempt `a` seeds its own RNG through a counter-based hash, and a draw that
//! repeats an earlier permutation (or the identity) is rejected and redrawn
//! from the next attempt. Permutation `k` is therefore a deterministic function
//! of (seed, k), so workers can read any subset of the sequence in any order.
//!
//! Index 0 is always the identity, so the observed statistic is a member of
//! its own null distribution.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{Error, Result};

/// Counter-based RNG seed generation using SplitMix64.
///
/// This is a stateless PRF that generates deterministic, well-distributed
/// seeds from a base seed and counter. Using this instead of simple addition
/// avoids sequential correlation between neighbouring permutations.
#[inline]
pub fn counter_rng_seed(base_seed: u64, counter: u64) -> u64 {
    // SplitMix64: https://xoshiro.di.unimi.it/splitmix64.c
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// One relabelling of subjects: position `i` takes the residual of subject `data[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shuffle {
    /// Position in the sequence (0 = identity).
    pub index: usize,
    /// Subject indices.
    pub data: Vec<usize>,
}

/// Deterministic permutation generator.
#[derive(Debug, Clone)]
pub struct Shuffler {
    n_subjects: usize,
    n_permutations: usize,
    requested: usize,
    seed: u64,
    exhaustive: bool,
    /// Identity first, then `n_permutations` distinct relabellings.
    sequence: Vec<Vec<usize>>,
}

/// `n!` if it fits in `u64`.
fn factorial(n: usize) -> Option<u64> {
    (1..=n as u64).try_fold(1u64, |acc, k| acc.checked_mul(k))
}

impl Shuffler {
    /// Create a shuffler producing the identity plus `n_permutations` relabellings.
    ///
    /// When `n_subjects!` distinct orderings do not exceed `n_permutations + 1`,
    /// every ordering is enumerated exactly once instead of sampling.
    pub fn new(n_subjects: usize, requested: usize, seed: u64) -> Self {
        let (n_permutations, exhaustive) = capped(factorial(n_subjects), requested);
        let sequence = if exhaustive {
            (0..=n_permutations as u64)
                .map(|k| nth_lexicographic(n_subjects, k))
                .collect()
        } else {
            draw_distinct(n_subjects, n_permutations, seed, None)
        };
        Self {
            n_subjects,
            n_permutations,
            requested,
            seed,
            exhaustive,
            sequence,
        }
    }

    /// Create a shuffler whose relabellings stay within exchangeability blocks.
    ///
    /// `blocks[i]` is the block label of subject `i`. When the blocks admit
    /// no more than `requested + 1` distinct orderings, all of them are used.
    pub fn with_blocks(
        n_subjects: usize,
        requested: usize,
        seed: u64,
        blocks: &[usize],
    ) -> Result<Self> {
        if blocks.len() != n_subjects {
            return Err(Error::InvalidConfig(format!(
                "{} exchangeability block labels for {} subjects",
                blocks.len(),
                n_subjects
            )));
        }

        let n_blocks = blocks.iter().copied().max().map_or(0, |m| m + 1);
        let mut members = vec![Vec::new(); n_blocks];
        for (subject, &block) in blocks.iter().enumerate() {
            members[block].push(subject);
        }
        members.retain(|m| !m.is_empty());

        let total = members
            .iter()
            .try_fold(1u64, |acc, m| factorial(m.len()).and_then(|f| acc.checked_mul(f)));
        let (n_permutations, exhaustive) = capped(total, requested);
        let sequence = draw_distinct(n_subjects, n_permutations, seed, Some(members.as_slice()));

        Ok(Self {
            n_subjects,
            n_permutations,
            requested,
            seed,
            exhaustive,
            sequence,
        })
    }

    /// Total shuffles including the identity (`N + 1`).
    pub fn len(&self) -> usize {
        self.n_permutations + 1
    }

    /// Always false: the identity is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Non-identity permutations (`N`).
    pub fn n_permutations(&self) -> usize {
        self.n_permutations
    }

    /// Permutation count originally asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Whether all orderings are enumerated rather than sampled.
    pub fn is_exhaustive(&self) -> bool {
        self.exhaustive
    }

    /// Base seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of subjects being permuted.
    pub fn n_subjects(&self) -> usize {
        self.n_subjects
    }

    /// Permutation `index`; a deterministic function of (seed, index).
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn permutation(&self, index: usize) -> Vec<usize> {
        assert!(index < self.len(), "permutation index {} out of range", index);
        self.sequence[index].clone()
    }

    /// Iterate over the whole sequence, identity first.
    pub fn iter(&self) -> impl Iterator<Item = Shuffle> + '_ {
        (0..self.len()).map(move |index| Shuffle {
            index,
            data: self.permutation(index),
        })
    }

    /// The whole sequence, for repeated random access in hot loops.
    pub fn sequence(&self) -> &[Vec<usize>] {
        &self.sequence
    }
}

/// Effective permutation count and whether every distinct ordering is used,
/// given `total` distinct orderings (`None` when it overflows `u64`).
fn capped(total: Option<u64>, requested: usize) -> (usize, bool) {
    match total {
        Some(total) if total <= requested as u64 + 1 => (total as usize - 1, true),
        _ => (requested, false),
    }
}

/// Identity followed by `count` distinct random relabellings.
///
/// Attempt `a` (starting at 1) draws from `counter_rng_seed(seed, a)`; draws
/// already in the sequence are rejected. `count` must not exceed the number of
/// distinct orderings minus one.
fn draw_distinct(n_subjects: usize, count: usize, seed: u64, blocks: Option<&[Vec<usize>]>) -> Vec<Vec<usize>> {
    let identity: Vec<usize> = (0..n_subjects).collect();
    let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(count + 1);
    seen.insert(identity.clone());

    let mut sequence = Vec::with_capacity(count + 1);
    sequence.push(identity.clone());

    let mut attempt = 0u64;
    while sequence.len() <= count {
        attempt += 1;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(counter_rng_seed(seed, attempt));
        let mut data = identity.clone();
        match blocks {
            None => data.shuffle(&mut rng),
            Some(blocks) => {
                for members in blocks {
                    let mut shuffled = members.clone();
                    shuffled.shuffle(&mut rng);
                    for (&slot, &subject) in members.iter().zip(&shuffled) {
                        data[slot] = subject;
                    }
                }
            }
        }
        if seen.insert(data.clone()) {
            sequence.push(data);
        }
    }
    sequence
}

/// The `k`-th permutation of `0..n` in lexicographic order (factorial number system).
fn nth_lexicographic(n: usize, mut k: u64) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    let mut out = Vec::with_capacity(n);
    for remaining in (1..=n).rev() {
        let radix = factorial(remaining - 1).unwrap_or(u64::MAX);
        let digit = (k / radix) as usize;
        k %= radix;
        out.push(pool.remove(digit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_includes_identity() {
        let shuffler = Shuffler::new(10, 100, 42);
        assert_eq!(shuffler.len(), 101);
        assert_eq!(shuffler.n_permutations(), 100);
        assert!(!shuffler.is_exhaustive());
    }

    #[test]
    fn test_identity_first() {
        let shuffler = Shuffler::new(5, 10, 42);
        let first = shuffler.iter().next().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.data, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_permutation_validity() {
        let shuffler = Shuffler::new(8, 20, 42);
        for shuffle in shuffler.iter() {
            let set: HashSet<usize> = shuffle.data.iter().copied().collect();
            assert_eq!(shuffle.data.len(), 8);
            assert_eq!(set, (0..8).collect());
        }
    }

    #[test]
    fn test_index_access_is_pure() {
        let shuffler = Shuffler::new(12, 50, 7);
        let forward: Vec<Vec<usize>> = (0..shuffler.len()).map(|k| shuffler.permutation(k)).collect();
        let backward: Vec<Vec<usize>> = (0..shuffler.len())
            .rev()
            .map(|k| shuffler.permutation(k))
            .collect();
        let backward: Vec<Vec<usize>> = backward.into_iter().rev().collect();
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffler.sequence());
    }

    #[test]
    fn test_seed_reproducibility() {
        let a: Vec<_> = Shuffler::new(10, 20, 123).iter().map(|s| s.data).collect();
        let b: Vec<_> = Shuffler::new(10, 20, 123).iter().map(|s| s.data).collect();
        let c: Vec<_> = Shuffler::new(10, 20, 456).iter().map(|s| s.data).collect();
        assert_eq!(a, b);
        assert_ne!(a[1..], c[1..]);
    }

    #[test]
    fn test_exhaustive_enumeration() {
        let shuffler = Shuffler::new(4, 100, 1);
        assert!(shuffler.is_exhaustive());
        assert_eq!(shuffler.len(), 24);
        assert_eq!(shuffler.requested(), 100);

        let all: HashSet<Vec<usize>> = shuffler.iter().map(|s| s.data).collect();
        assert_eq!(all.len(), 24);
        assert_eq!(shuffler.permutation(0), vec![0, 1, 2, 3]);
        assert_eq!(shuffler.permutation(23), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_exchangeability_blocks() {
        let blocks = [0, 0, 0, 1, 1, 1];
        let shuffler = Shuffler::with_blocks(6, 50, 42, &blocks).unwrap();

        for shuffle in shuffler.iter().skip(1) {
            let first: HashSet<usize> = shuffle.data[..3].iter().copied().collect();
            let second: HashSet<usize> = shuffle.data[3..].iter().copied().collect();
            assert_eq!(first, HashSet::from([0, 1, 2]));
            assert_eq!(second, HashSet::from([3, 4, 5]));
        }
    }

    #[test]
    fn test_no_duplicates() {
        let shuffler = Shuffler::new(10, 50, 42);
        let all: HashSet<Vec<usize>> = shuffler.iter().map(|s| s.data).collect();
        assert_eq!(all.len(), shuffler.len());
    }

    #[test]
    fn test_no_duplicates_near_exhaustive_cutoff() {
        // 7! = 5040 orderings; sampling with replacement would repeat many
        let shuffler = Shuffler::new(7, 5000, 42);
        assert!(!shuffler.is_exhaustive());
        let sequence = shuffler.sequence();
        let identity: Vec<usize> = (0..7).collect();
        let distinct: HashSet<&Vec<usize>> = sequence.iter().collect();
        assert_eq!(distinct.len(), 5001);
        assert_eq!(sequence.iter().filter(|p| **p == identity).count(), 1);
    }

    #[test]
    fn test_small_blocks_use_every_ordering() {
        // 3! * 3! = 36 orderings within blocks
        let shuffler = Shuffler::with_blocks(6, 100, 3, &[0, 1, 0, 1, 0, 1]).unwrap();
        assert!(shuffler.is_exhaustive());
        assert_eq!(shuffler.n_permutations(), 35);
        assert_eq!(shuffler.requested(), 100);
        let all: HashSet<Vec<usize>> = shuffler.iter().map(|s| s.data).collect();
        assert_eq!(all.len(), 36);
    }

    #[test]
    fn test_block_length_mismatch() {
        assert!(Shuffler::with_blocks(4, 10, 0, &[0, 1]).is_err());
    }

    #[test]
    fn test_counter_seed_spreads() {
        assert_ne!(counter_rng_seed(42, 0), counter_rng_seed(42, 1));
        assert_eq!(counter_rng_seed(42, 9), counter_rng_seed(42, 9));
    }
}
