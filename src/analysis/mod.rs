//! Inference stages run on top of the fitted model.
//!
//! 1. **Permutation** ([`permutation`]): Freedman-Lane null distributions, per voxel and of the maximum
//! 2. **Correction** ([`correction`]): FDR and max-statistic FWER control
//! 3. **Effect sizes** ([`effect`]): partial eta-squared and Cohen's f
//! 4. **Comparison** ([`compare`]): pre/post harmonization verdict

mod compare;
mod correction;
mod effect;
mod permutation;

pub use compare::{compare, compare_with, evaluate, reduction_percent};
pub use correction::{fdr, percent, significant_at, FdrCorrection};
pub use effect::{cohens_f, partial_eta_squared, EffectBand};
pub use permutation::{at_least, NullDistribution, PermutationEngine};
