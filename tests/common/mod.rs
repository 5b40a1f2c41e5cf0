//! Synthetic cohorts for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;
use site_effect::{Mask, Subject, Volume};

/// One site of a synthetic cohort.
#[derive(Debug, Clone, Copy)]
pub struct SiteSpec {
    pub name: &'static str,
    pub subjects: usize,
    pub mean: f64,
    pub std: f64,
}

impl SiteSpec {
    pub fn new(name: &'static str, subjects: usize, mean: f64, std: f64) -> Self {
        Self {
            name,
            subjects,
            mean,
            std,
        }
    }
}

/// Gaussian voxel values per site on an `n_voxels × 1 × 1` grid.
pub fn cohort(sites: &[SiteSpec], n_voxels: usize, seed: u64) -> Vec<Subject> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut subjects = Vec::new();
    for site in sites {
        let normal = Normal::new(site.mean, site.std).unwrap();
        for _ in 0..site.subjects {
            let data: Vec<f32> = (0..n_voxels).map(|_| normal.sample(&mut rng) as f32).collect();
            subjects.push(Subject {
                id: format!("sub-{:03}", subjects.len()),
                site: site.name.to_string(),
                covariates: BTreeMap::new(),
                volume: Volume::new([n_voxels, 1, 1], data).unwrap(),
            });
        }
    }
    subjects
}

/// Mask covering every voxel of a `n_voxels × 1 × 1` grid.
pub fn full_mask(n_voxels: usize) -> Mask {
    Mask::full([n_voxels, 1, 1])
}

/// Attach a covariate value to every subject.
pub fn with_covariate(mut subjects: Vec<Subject>, name: &str, value: impl Fn(usize, &Subject) -> String) -> Vec<Subject> {
    for (i, subject) in subjects.iter_mut().enumerate() {
        let v = value(i, subject);
        subject.covariates.insert(name.to_string(), v);
    }
    subjects
}
