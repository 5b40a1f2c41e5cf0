//! Freedman-Lane permutation inference.
//!
//! The nuisance model is fitted once per voxel; its residuals are permuted
//! and the full-model statistic recomputed for every shuffle. Shuffle 0 is
//! the identity, so the observed statistic belongs to its own null.
//!
//! Work can be split over voxels (each task runs every shuffle on a chunk of
//! voxels) or over shuffles (each task runs a chunk of shuffles on every
//! voxel). Per-voxel exceedance counts are integers and per-shuffle maxima
//! are exact, so both splits produce identical results for any thread count.

use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::glm::{GlmModel, VoxelFit, Workspace};
use crate::statistics::Shuffler;
use crate::types::{Matrix, ParallelAxis};

/// Voxels per task when splitting over voxels.
const VOXEL_CHUNK: usize = 32;

/// Shuffles per task when splitting over shuffles.
const SHUFFLE_CHUNK: usize = 16;

/// Relative tolerance when comparing a permuted statistic with the observed one.
const TIE_TOLERANCE: f64 = 1e-12;

/// Whether `statistic` counts as at least as extreme as `observed`.
#[inline]
pub fn at_least(statistic: f64, observed: f64) -> bool {
    if observed.is_finite() {
        statistic >= observed - TIE_TOLERANCE * observed.abs()
    } else {
        statistic >= observed
    }
}

/// Observed fits plus the permutation null summaries.
#[derive(Debug, Clone)]
pub struct NullDistribution {
    /// Observed fit per voxel.
    pub observed: Vec<VoxelFit>,
    /// Per voxel, shuffles whose statistic reached the observed one (identity included).
    pub exceedances: Vec<u64>,
    /// Per shuffle, the maximum statistic over all voxels.
    pub max_statistics: Vec<f64>,
}

impl NullDistribution {
    /// Number of shuffles, including the identity.
    pub fn n_shuffles(&self) -> usize {
        self.max_statistics.len()
    }

    /// Uncorrected permutation p-values, `#{k : T_k ≥ T_obs} / (N + 1)`.
    pub fn p_values(&self) -> Vec<f64> {
        let total = self.n_shuffles() as f64;
        self.exceedances.iter().map(|&c| c as f64 / total).collect()
    }

    /// Family-wise p-values from the maximum-statistic null.
    pub fn fwer_p_values(&self) -> Vec<f64> {
        let total = self.n_shuffles() as f64;
        self.observed
            .iter()
            .map(|fit| {
                let count = self
                    .max_statistics
                    .iter()
                    .filter(|&&m| at_least(m, fit.statistic))
                    .count();
                count as f64 / total
            })
            .collect()
    }
}

/// Runs Freedman-Lane permutations of a model over voxel data.
#[derive(Debug, Clone, Copy)]
pub struct PermutationEngine<'a> {
    model: &'a GlmModel,
    shuffler: &'a Shuffler,
    axis: ParallelAxis,
}

impl<'a> PermutationEngine<'a> {
    pub fn new(model: &'a GlmModel, shuffler: &'a Shuffler) -> Self {
        Self {
            model,
            shuffler,
            axis: ParallelAxis::Auto,
        }
    }

    /// Choose how work is split across threads.
    pub fn axis(mut self, axis: ParallelAxis) -> Self {
        self.axis = axis;
        self
    }

    /// Run every shuffle on every voxel.
    ///
    /// `data` is subjects × voxels; `degenerate[v]` marks voxels with no
    /// variation, whose statistic is 0 under every shuffle.
    pub fn run(&self, data: &Matrix, degenerate: &[bool]) -> NullDistribution {
        let n = self.model.n_subjects();
        let n_voxels = data.ncols();
        let n_shuffles = self.shuffler.len();
        let axis = self.axis.resolve(n_voxels, n_shuffles);
        let start = Instant::now();

        debug!(
            voxels = n_voxels,
            shuffles = n_shuffles,
            axis = ?axis,
            "running permutations"
        );

        let shuffles = self.shuffler.sequence();
        let reduced = self.reduced_residuals(data);

        let result = match axis {
            ParallelAxis::Permutations => self.split_shuffles(&reduced, degenerate, shuffles, n),
            _ => self.split_voxels(&reduced, degenerate, shuffles, n),
        };

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "permutations finished");
        result
    }

    /// Reduced-model residuals for every voxel, voxel-major.
    fn reduced_residuals(&self, data: &Matrix) -> Vec<f64> {
        let n = data.nrows();
        let mut reduced = vec![0.0; data.len()];

        #[cfg(feature = "parallel")]
        reduced
            .par_chunks_mut(n)
            .zip(data.as_slice().par_chunks(n))
            .for_each(|(out, y)| self.model.reduced_residuals(y, out));

        #[cfg(not(feature = "parallel"))]
        for (out, y) in reduced.chunks_mut(n).zip(data.as_slice().chunks(n)) {
            self.model.reduced_residuals(y, out);
        }

        reduced
    }

    fn fit_shuffle(&self, residuals: &[f64], shuffle: &[usize], ws: &mut Workspace) -> VoxelFit {
        for (dst, &src) in ws.shuffled_mut().iter_mut().zip(shuffle) {
            *dst = residuals[src];
        }
        self.model.fit(ws)
    }

    /// Every shuffle for voxels `first..first + chunk_len`.
    fn voxel_chunk(
        &self,
        reduced: &[f64],
        degenerate: &[bool],
        shuffles: &[Vec<usize>],
        n: usize,
        first: usize,
        chunk_len: usize,
    ) -> (Vec<VoxelFit>, Vec<u64>, Vec<f64>) {
        let mut ws = self.model.workspace();
        let mut observed = Vec::with_capacity(chunk_len);
        let mut counts = Vec::with_capacity(chunk_len);
        let mut maxima = vec![0.0_f64; shuffles.len()];

        for v in first..first + chunk_len {
            if degenerate[v] {
                observed.push(self.model.degenerate_fit());
                counts.push(shuffles.len() as u64);
                continue;
            }

            let residuals = &reduced[v * n..(v + 1) * n];
            let fit = self.fit_shuffle(residuals, &shuffles[0], &mut ws);
            let mut count = 0u64;
            for (k, shuffle) in shuffles.iter().enumerate() {
                let statistic = if k == 0 {
                    fit.statistic
                } else {
                    self.fit_shuffle(residuals, shuffle, &mut ws).statistic
                };
                if at_least(statistic, fit.statistic) {
                    count += 1;
                }
                maxima[k] = maxima[k].max(statistic);
            }
            observed.push(fit);
            counts.push(count);
        }

        (observed, counts, maxima)
    }

    fn split_voxels(
        &self,
        reduced: &[f64],
        degenerate: &[bool],
        shuffles: &[Vec<usize>],
        n: usize,
    ) -> NullDistribution {
        let n_voxels = degenerate.len();
        let chunks: Vec<(usize, usize)> = (0..n_voxels)
            .step_by(VOXEL_CHUNK)
            .map(|first| (first, VOXEL_CHUNK.min(n_voxels - first)))
            .collect();

        #[cfg(feature = "parallel")]
        let parts: Vec<_> = chunks
            .par_iter()
            .map(|&(first, len)| self.voxel_chunk(reduced, degenerate, shuffles, n, first, len))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let parts: Vec<_> = chunks
            .iter()
            .map(|&(first, len)| self.voxel_chunk(reduced, degenerate, shuffles, n, first, len))
            .collect();

        let mut observed = Vec::with_capacity(n_voxels);
        let mut exceedances = Vec::with_capacity(n_voxels);
        let mut max_statistics = vec![0.0_f64; shuffles.len()];
        for (fits, counts, maxima) in parts {
            observed.extend(fits);
            exceedances.extend(counts);
            for (m, part) in max_statistics.iter_mut().zip(maxima) {
                *m = m.max(part);
            }
        }

        NullDistribution {
            observed,
            exceedances,
            max_statistics,
        }
    }

    /// Shuffles `first..first + chunk_len` on every voxel.
    #[allow(clippy::too_many_arguments)]
    fn shuffle_chunk(
        &self,
        reduced: &[f64],
        degenerate: &[bool],
        observed: &[VoxelFit],
        shuffles: &[Vec<usize>],
        n: usize,
        first: usize,
        chunk_len: usize,
    ) -> (Vec<u64>, Vec<f64>) {
        let mut ws = self.model.workspace();
        let mut counts = vec![0u64; observed.len()];
        let mut maxima = vec![0.0_f64; chunk_len];

        for (offset, shuffle) in shuffles[first..first + chunk_len].iter().enumerate() {
            for (v, fit) in observed.iter().enumerate() {
                if degenerate[v] {
                    counts[v] += 1;
                    continue;
                }
                let statistic = if first + offset == 0 {
                    fit.statistic
                } else {
                    self.fit_shuffle(&reduced[v * n..(v + 1) * n], shuffle, &mut ws).statistic
                };
                if at_least(statistic, fit.statistic) {
                    counts[v] += 1;
                }
                maxima[offset] = maxima[offset].max(statistic);
            }
        }

        (counts, maxima)
    }

    fn split_shuffles(
        &self,
        reduced: &[f64],
        degenerate: &[bool],
        shuffles: &[Vec<usize>],
        n: usize,
    ) -> NullDistribution {
        let observe = |v: usize, ws: &mut Workspace| {
            if degenerate[v] {
                self.model.degenerate_fit()
            } else {
                self.fit_shuffle(&reduced[v * n..(v + 1) * n], &shuffles[0], ws)
            }
        };

        #[cfg(feature = "parallel")]
        let observed: Vec<VoxelFit> = (0..degenerate.len())
            .into_par_iter()
            .map_init(|| self.model.workspace(), |ws, v| observe(v, ws))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let observed: Vec<VoxelFit> = {
            let mut ws = self.model.workspace();
            (0..degenerate.len()).map(|v| observe(v, &mut ws)).collect()
        };

        let chunks: Vec<(usize, usize)> = (0..shuffles.len())
            .step_by(SHUFFLE_CHUNK)
            .map(|first| (first, SHUFFLE_CHUNK.min(shuffles.len() - first)))
            .collect();

        #[cfg(feature = "parallel")]
        let parts: Vec<_> = chunks
            .par_iter()
            .map(|&(first, len)| self.shuffle_chunk(reduced, degenerate, &observed, shuffles, n, first, len))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let parts: Vec<_> = chunks
            .iter()
            .map(|&(first, len)| self.shuffle_chunk(reduced, degenerate, &observed, shuffles, n, first, len))
            .collect();

        let mut exceedances = vec![0u64; observed.len()];
        let mut max_statistics = Vec::with_capacity(shuffles.len());
        for (counts, maxima) in parts {
            for (total, c) in exceedances.iter_mut().zip(counts) {
                *total += c;
            }
            max_statistics.extend(maxima);
        }

        NullDistribution {
            observed,
            exceedances,
            max_statistics,
        }
    }
}
