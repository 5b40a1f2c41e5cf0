//! Statistical building blocks shared by the analysis stages.
//!
//! - Deterministic permutation sequences (counter-seeded, identity first)
//! - Median and mean of voxel maps
//! - Optional parametric reference distributions

mod distribution;
mod location;
mod shuffler;

pub use distribution::{f_upper_tail, parametric_available};
pub use location::{mean, median};
pub use shuffler::{counter_rng_seed, Shuffle, Shuffler};
