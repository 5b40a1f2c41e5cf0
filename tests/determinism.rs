//! Reproducibility: identical seeds give identical maps across thread counts
//! and parallel decompositions.

mod common;

use common::{cohort, full_mask, SiteSpec};
use site_effect::{Error, ParallelAxis, SiteEffectResult, SiteEffectTest, VarianceMode, Warning};

fn cohort_three_sites() -> Vec<site_effect::Subject> {
    cohort(
        &[
            SiteSpec::new("A", 7, 0.0, 1.0),
            SiteSpec::new("B", 5, 0.3, 1.0),
            SiteSpec::new("C", 6, -0.2, 1.5),
        ],
        150,
        77,
    )
}

fn run(test: SiteEffectTest) -> SiteEffectResult {
    test.run(&cohort_three_sites(), &full_mask(150)).unwrap()
}

fn assert_same_maps(a: &SiteEffectResult, b: &SiteEffectResult) {
    assert_eq!(a.voxels.statistic, b.voxels.statistic);
    assert_eq!(a.voxels.permutation_p, b.voxels.permutation_p);
    assert_eq!(a.voxels.fwer_p, b.voxels.fwer_p);
    assert_eq!(a.voxels.q_values, b.voxels.q_values);
    assert_eq!(a.voxels.eta_squared, b.voxels.eta_squared);
    assert_eq!(a.summary, b.summary);
}

#[test]
fn thread_count_does_not_change_results() {
    let base = SiteEffectTest::new().permutations(150).seed(2024);
    let single = run(base.clone().threads(1));
    let many = run(base.threads(4));
    assert_same_maps(&single, &many);
}

#[test]
fn parallel_axes_agree() {
    for mode in [VarianceMode::Homoscedastic, VarianceMode::Heteroscedastic] {
        let base = SiteEffectTest::new().permutations(120).seed(9).variance_mode(mode);
        let voxels = run(base.clone().parallel_axis(ParallelAxis::Voxels));
        let shuffles = run(base.parallel_axis(ParallelAxis::Permutations));
        assert_same_maps(&voxels, &shuffles);
    }
}

#[test]
fn seed_is_echoed_and_reused() {
    let first = run(SiteEffectTest::new().permutations(50));
    let replay = run(SiteEffectTest::new().permutations(50).seed(first.summary.seed));
    assert_same_maps(&first, &replay);
}

#[test]
fn tiny_cohort_enumerates_every_permutation() {
    let subjects = cohort(
        &[SiteSpec::new("A", 3, 0.0, 1.0), SiteSpec::new("B", 2, 1.0, 1.0)],
        20,
        5,
    );
    let result = SiteEffectTest::new()
        .permutations(1000)
        .seed(1)
        .run(&subjects, &full_mask(20))
        .unwrap();

    assert!(result.summary.exhaustive_permutations);
    assert_eq!(result.summary.n_permutations, 119);
    assert!(result
        .summary
        .warnings
        .contains(&Warning::ExhaustivePermutations { requested: 1000, used: 119 }));

    // Every p-value is a multiple of 1/120
    for &p in result.voxels.permutation_p.as_ref().unwrap() {
        let count = p * 120.0;
        assert!((count - count.round()).abs() < 1e-9);
        assert!(count.round() >= 1.0);
    }
}

#[test]
fn exchangeability_blocks_are_respected() {
    let subjects = cohort_three_sites();
    let blocks: Vec<usize> = (0..subjects.len()).map(|i| i % 2).collect();

    let result = SiteEffectTest::new()
        .permutations(60)
        .seed(4)
        .exchangeability_blocks(blocks)
        .run(&subjects, &full_mask(150))
        .unwrap();
    assert_eq!(result.voxels.len(), 150);

    let err = SiteEffectTest::new()
        .permutations(60)
        .seed(4)
        .exchangeability_blocks(vec![0; 3])
        .run(&subjects, &full_mask(150))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_) | Error::InsufficientData(_)));
}
