//! Main `SiteEffectTest` entry point and builder.

use std::time::Instant;

use rand::Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::{cohens_f, fdr, partial_eta_squared, percent, significant_at, EffectBand, PermutationEngine};
use crate::config::{Config, FdrMethod, MissingValues};
use crate::design::{ContrastSpec, CovariateEncoder, CovariateRow, Design, DesignBuilder, Hypothesis};
use crate::error::{Error, Result, Warning};
use crate::glm::{is_degenerate, GlmModel, VoxelFit};
use crate::input::{Mask, Subject};
use crate::result::{SiteEffectResult, Summary, VoxelStatistics};
use crate::statistics::{mean, median, parametric_available, Shuffler};
use crate::thread_pool;
use crate::types::{Matrix, ParallelAxis, TestKind, VarianceMode};

/// Voxel-wise test for a residual site effect.
///
/// Use the builder methods to configure, then [`SiteEffectTest::run`] on the
/// loaded subjects and mask.
///
/// # Example
///
/// ```ignore
/// use site_effect::{SiteEffectTest, VarianceMode};
///
/// let result = SiteEffectTest::new()
///     .permutations(5_000)
///     .covariates(["age", "sex"])
///     .variance_mode(VarianceMode::Heteroscedastic)
///     .seed(42)
///     .run(&subjects, &mask)?;
///
/// println!("{:.1}% significant", result.summary.percent_significant_fdr);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SiteEffectTest {
    config: Config,
}

impl SiteEffectTest {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create with a reduced permutation count for exploration and tests.
    ///
    /// Settings:
    /// - 500 permutations (vs 5,000 default)
    pub fn quick() -> Self {
        Self {
            config: Config {
                n_permutations: 500,
                ..Config::default()
            },
        }
    }

    /// Create from an existing configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Select permutation or parametric inference.
    pub fn test_kind(mut self, kind: TestKind) -> Self {
        self.config.test_kind = kind;
        self
    }

    /// Set the number of non-identity permutations.
    pub fn permutations(mut self, n: usize) -> Self {
        self.config.n_permutations = n;
        self
    }

    /// Set the significance level.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Set a deterministic permutation seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Select the error model.
    pub fn variance_mode(mut self, mode: VarianceMode) -> Self {
        self.config.variance_mode = mode;
        self
    }

    /// Shorthand for `.variance_mode(VarianceMode::Heteroscedastic)`.
    pub fn heteroscedastic(self) -> Self {
        self.variance_mode(VarianceMode::Heteroscedastic)
    }

    /// Set covariate columns to include, in order.
    pub fn covariates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.covariates = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable z-scoring of continuous covariates.
    pub fn standardize_covariates(mut self, on: bool) -> Self {
        self.config.standardize_covariates = on;
        self
    }

    /// Set the handling of missing numeric covariate values.
    pub fn missing_values(mut self, policy: MissingValues) -> Self {
        self.config.missing_values = policy;
        self
    }

    /// Set the reference site for treatment coding.
    pub fn reference_site(mut self, site: impl Into<String>) -> Self {
        self.config.reference_site = Some(site.into());
        self
    }

    /// Set the FDR procedure.
    pub fn fdr_method(mut self, method: FdrMethod) -> Self {
        self.config.fdr_method = method;
        self
    }

    /// Set the condition number above which collinearity is reported.
    pub fn condition_warning(mut self, threshold: f64) -> Self {
        self.config.condition_warning = threshold;
        self
    }

    /// Choose how the permutation loop is split across threads.
    pub fn parallel_axis(mut self, axis: ParallelAxis) -> Self {
        self.config.parallel_axis = axis;
        self
    }

    /// Run on a dedicated pool of `n` threads.
    pub fn threads(mut self, n: usize) -> Self {
        self.config.threads = Some(n);
        self
    }

    /// Restrict permutations to within the given per-subject blocks.
    pub fn exchangeability_blocks(mut self, blocks: Vec<usize>) -> Self {
        self.config.exchangeability_blocks = Some(blocks);
        self
    }

    /// Test a named contrast instead of the site effect.
    ///
    /// Sites remain the variance groups of the heteroscedastic model.
    pub fn contrast(mut self, contrast: ContrastSpec) -> Self {
        self.config.contrast = Some(contrast);
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the analysis.
    ///
    /// # How It Works
    ///
    /// 1. Checks every volume against the mask grid
    /// 2. Encodes covariates and builds the design
    /// 3. Fits the model per voxel and, for permutation inference, builds the
    ///    Freedman-Lane null per voxel and of the maximum over voxels
    /// 4. Applies FDR and FWER correction, computes effect sizes and the summary
    ///
    /// Nothing is written; see [`crate::output`] for artifacts.
    pub fn run(&self, subjects: &[Subject], mask: &Mask) -> Result<SiteEffectResult> {
        let start = Instant::now();
        let config = &self.config;
        config.validate()?;

        check_inputs(subjects, mask)?;
        let mut warnings = Vec::new();

        // Design
        let rows: Vec<CovariateRow<'_>> = subjects
            .iter()
            .map(|s| CovariateRow {
                subject: &s.id,
                values: &s.covariates,
            })
            .collect();
        let encoder = CovariateEncoder::new(config.standardize_covariates, config.missing_values);
        let (covariates, cov_warnings) = encoder.encode(&config.covariates, &rows)?;
        warnings.extend(cov_warnings);

        let site_labels: Vec<String> = subjects.iter().map(|s| s.site.clone()).collect();
        let (design, design_warnings) = DesignBuilder::new(&site_labels)
            .covariates(covariates)
            .reference_site(config.reference_site.clone())
            .condition_warning(config.condition_warning)
            .build()?;
        warnings.extend(design_warnings);

        info!(
            subjects = design.n_subjects(),
            sites = design.n_sites(),
            predictors = design.n_predictors(),
            voxels = mask.count(),
            "design built"
        );

        let hypothesis = match &config.contrast {
            Some(spec) => spec.resolve(&design.column_names)?,
            None => design.hypothesis.clone(),
        };
        debug!(hypothesis = hypothesis.name(), rows = hypothesis.rank(), "hypothesis resolved");
        let model = GlmModel::with_hypothesis(
            &design.matrix,
            &hypothesis,
            &design.site_of_subject,
            config.variance_mode,
        )?;
        let data = response_matrix(subjects, mask);

        let non_finite: Vec<bool> = data
            .as_slice()
            .chunks_exact(data.nrows())
            .map(|y| y.iter().any(|v| !v.is_finite()))
            .collect();
        let n_non_finite = non_finite.iter().filter(|&&b| b).count();
        if n_non_finite > 0 {
            warn!(count = n_non_finite, "masked voxels contain non-finite values");
            warnings.push(Warning::NonFiniteVoxels { count: n_non_finite });
        }
        let degenerate: Vec<bool> = data
            .as_slice()
            .chunks_exact(data.nrows())
            .zip(&non_finite)
            .map(|(y, &bad)| bad || is_degenerate(y))
            .collect();
        // Non-finite voxels are tested on zeros so they stay finite through the null
        let data = if n_non_finite > 0 {
            data.map(|v| if v.is_finite() { v } else { 0.0 })
        } else {
            data
        };

        // Inference kind
        let mut test_kind = config.test_kind;
        if !parametric_available() {
            warn!("parametric distributions unavailable; parametric p-values disabled");
            warnings.push(Warning::ParametricUnavailable);
            if test_kind == TestKind::Parametric {
                test_kind = TestKind::Permutation;
            }
        }

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let (observed, permutation_p, fwer_p, shuffler) = match test_kind {
            TestKind::Permutation => {
                let shuffler = match &config.exchangeability_blocks {
                    Some(blocks) => Shuffler::with_blocks(design.n_subjects(), config.n_permutations, seed, blocks)?,
                    None => Shuffler::new(design.n_subjects(), config.n_permutations, seed),
                };
                if shuffler.is_exhaustive() {
                    warn!(
                        requested = shuffler.requested(),
                        used = shuffler.n_permutations(),
                        "enumerating all distinct permutations"
                    );
                    warnings.push(Warning::ExhaustivePermutations {
                        requested: shuffler.requested(),
                        used: shuffler.n_permutations(),
                    });
                }

                let engine = PermutationEngine::new(&model, &shuffler).axis(config.parallel_axis);
                let null = thread_pool::install(config.threads, || engine.run(&data, &degenerate))?;
                let p = null.p_values();
                let fwer = null.fwer_p_values();
                (null.observed, Some(p), Some(fwer), Some(shuffler))
            }
            TestKind::Parametric => {
                let observed = thread_pool::install(config.threads, || fit_all(&model, &data, &degenerate))?;
                (observed, None, None, None)
            }
        };

        let parametric_p: Option<Vec<f64>> = parametric_available().then(|| {
            observed
                .iter()
                .map(|fit| model.parametric_p(fit).unwrap_or(f64::NAN))
                .collect()
        });

        let eta_squared: Vec<f64> = observed
            .iter()
            .map(|fit| partial_eta_squared(fit.ss_between, fit.ss_within))
            .collect();
        let cohens: Vec<f64> = eta_squared.iter().map(|&e| cohens_f(e)).collect();

        let mut voxels = VoxelStatistics {
            statistic: observed.iter().map(|fit| fit.statistic).collect(),
            parametric_p,
            permutation_p,
            fwer_p,
            eta_squared,
            cohens_f: cohens,
            ..VoxelStatistics::default()
        };

        let selected = voxels
            .p_values()
            .ok_or_else(|| Error::InvalidConfig("no inference available for the selected test kind".to_string()))?;
        let correction = fdr(selected, config.alpha, config.fdr_method);
        voxels.fwer_significant = voxels.fwer_p.as_deref().map(|p| significant_at(p, config.alpha));
        voxels.q_values = correction.q_values;
        voxels.fdr_significant = correction.significant;

        let summary = summarize(SummaryInputs {
            config,
            design: &design,
            hypothesis: &hypothesis,
            voxels: &voxels,
            test_kind,
            shuffler: shuffler.as_ref(),
            seed,
            fdr_threshold: correction.threshold,
            warnings,
        });

        info!(
            statistic = %summary.statistic_name,
            percent_fdr = summary.percent_significant_fdr,
            mean_eta2 = summary.mean_effect_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "site-effect test finished"
        );

        Ok(SiteEffectResult {
            summary,
            voxels,
            mask: mask.clone(),
        })
    }
}

/// All subjects and the mask must share one voxel grid.
fn check_inputs(subjects: &[Subject], mask: &Mask) -> Result<()> {
    if subjects.is_empty() {
        return Err(Error::InsufficientData("no subjects".to_string()));
    }
    if mask.count() == 0 {
        return Err(Error::EmptyMask);
    }
    let expected = subjects[0].volume.dims;
    if mask.dims() != expected {
        return Err(Error::DimensionMismatch {
            what: "mask".to_string(),
            expected,
            found: mask.dims(),
        });
    }
    for subject in subjects {
        if subject.volume.dims != expected {
            return Err(Error::DimensionMismatch {
                what: format!("subject '{}'", subject.id),
                expected,
                found: subject.volume.dims,
            });
        }
        // Public fields let data and dims disagree
        if subject.volume.len() != mask.grid_len() {
            return Err(Error::VolumeLength {
                what: format!("subject '{}'", subject.id),
                expected: mask.grid_len(),
                found: subject.volume.len(),
            });
        }
    }
    Ok(())
}

/// Subjects × masked voxels.
fn response_matrix(subjects: &[Subject], mask: &Mask) -> Matrix {
    let indices = mask.indices();
    Matrix::from_fn(subjects.len(), indices.len(), |i, v| {
        f64::from(subjects[i].volume.data[indices[v]])
    })
}

/// Observed fits without permutation.
fn fit_all(model: &GlmModel, data: &Matrix, degenerate: &[bool]) -> Vec<VoxelFit> {
    let n = data.nrows();
    let fit = |(y, &flat): (&[f64], &bool), ws: &mut crate::glm::Workspace| {
        if flat {
            model.degenerate_fit()
        } else {
            model.fit_observed(y, ws)
        }
    };

    #[cfg(feature = "parallel")]
    let fits = data
        .as_slice()
        .par_chunks(n)
        .zip(degenerate.par_iter())
        .map_init(|| model.workspace(), |ws, item| fit(item, ws))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let fits = {
        let mut ws = model.workspace();
        data.as_slice()
            .chunks(n)
            .zip(degenerate.iter())
            .map(|item| fit(item, &mut ws))
            .collect()
    };

    debug!(voxels = degenerate.len(), "parametric fits finished");
    fits
}

struct SummaryInputs<'a> {
    config: &'a Config,
    design: &'a Design,
    hypothesis: &'a Hypothesis,
    voxels: &'a VoxelStatistics,
    test_kind: TestKind,
    shuffler: Option<&'a Shuffler>,
    seed: u64,
    fdr_threshold: Option<f64>,
    warnings: Vec<Warning>,
}

fn summarize(inputs: SummaryInputs<'_>) -> Summary {
    let SummaryInputs {
        config,
        design,
        hypothesis,
        voxels,
        test_kind,
        shuffler,
        seed,
        fdr_threshold,
        warnings,
    } = inputs;

    let alpha = config.alpha;
    let mean_effect_size = mean(&voxels.eta_squared).unwrap_or(0.0);

    Summary {
        n_subjects: design.n_subjects(),
        n_sites: design.n_sites(),
        n_voxels: voxels.len(),
        sites: design.sites.clone(),
        site_counts: design.site_counts(),
        reference_site: design.reference_site.clone(),
        design_columns: design.column_names.clone(),
        condition_number: design.condition_number,
        hypothesis: hypothesis.name().to_string(),
        test_kind,
        variance_mode: config.variance_mode,
        statistic_name: config.variance_mode.statistic_name().to_string(),
        alpha,
        n_permutations: shuffler.map_or(0, Shuffler::n_permutations),
        requested_permutations: config.n_permutations,
        exhaustive_permutations: shuffler.is_some_and(Shuffler::is_exhaustive),
        seed,
        percent_significant_uncorrected: voxels.parametric_p.as_deref().map(|p| percent(&significant_at(p, alpha))),
        percent_significant_permutation: voxels.permutation_p.as_deref().map(|p| percent(&significant_at(p, alpha))),
        percent_significant_fdr: percent(&voxels.fdr_significant),
        percent_significant_fwer: voxels.fwer_significant.as_deref().map(percent),
        fdr_method: config.fdr_method,
        fdr_threshold,
        mean_effect_size,
        median_effect_size: median(&voxels.eta_squared).unwrap_or(0.0),
        mean_cohens_f: mean(&voxels.cohens_f).unwrap_or(0.0),
        effect_band: EffectBand::from_cohens_f(cohens_f(mean_effect_size)),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Volume;
    use std::collections::BTreeMap;

    fn subject(id: usize, site: &str, values: Vec<f32>) -> Subject {
        Subject {
            id: format!("sub-{:02}", id),
            site: site.to_string(),
            covariates: BTreeMap::new(),
            volume: Volume::new([values.len(), 1, 1], values).unwrap(),
        }
    }

    #[test]
    fn test_builder_sets_config() {
        let test = SiteEffectTest::new()
            .permutations(100)
            .alpha(0.01)
            .seed(7)
            .heteroscedastic()
            .covariates(["age"])
            .threads(2);
        let config = test.config();
        assert_eq!(config.n_permutations, 100);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.variance_mode, VarianceMode::Heteroscedastic);
        assert_eq!(config.covariates, vec!["age".to_string()]);
        assert_eq!(config.threads, Some(2));
    }

    #[test]
    fn test_dimension_mismatch() {
        let subjects = vec![
            subject(0, "A", vec![1.0, 2.0]),
            subject(1, "B", vec![1.0, 2.0, 3.0]),
        ];
        let mask = Mask::full([2, 1, 1]);
        let err = SiteEffectTest::quick().run(&subjects, &mask).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_volume_shorter_than_grid() {
        let mut subjects: Vec<Subject> = (0..6)
            .map(|i| subject(i, if i < 3 { "A" } else { "B" }, vec![i as f32; 4]))
            .collect();
        // Dims still claim four voxels
        subjects[4].volume = Volume {
            dims: [4, 1, 1],
            data: vec![1.0; 2],
        };
        let err = SiteEffectTest::quick().run(&subjects, &Mask::full([4, 1, 1])).unwrap_err();
        match err {
            Error::VolumeLength { what, expected, found } => {
                assert_eq!(what, "subject 'sub-04'");
                assert_eq!((expected, found), (4, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_mask() {
        let subjects = vec![subject(0, "A", vec![1.0]), subject(1, "B", vec![2.0])];
        let mask = Mask::new([1, 1, 1], vec![false]).unwrap();
        assert!(matches!(
            SiteEffectTest::quick().run(&subjects, &mask),
            Err(Error::EmptyMask)
        ));
    }

    #[test]
    fn test_constant_voxel_and_small_run() {
        let subjects: Vec<Subject> = (0..12)
            .map(|i| {
                let site = if i < 6 { "A" } else { "B" };
                let shift = if i < 6 { 0.0 } else { 5.0 };
                subject(i, site, vec![2.0, shift + (i % 6) as f32 * 0.1])
            })
            .collect();
        let mask = Mask::full([2, 1, 1]);
        let result = SiteEffectTest::new()
            .permutations(200)
            .seed(3)
            .run(&subjects, &mask)
            .unwrap();

        let p = result.voxels.permutation_p.as_ref().unwrap();
        assert_eq!(result.voxels.statistic[0], 0.0);
        assert_eq!(p[0], 1.0);
        assert_eq!(result.voxels.eta_squared[0], 0.0);
        assert!(p[1] < 0.05);
        assert_eq!(result.summary.seed, 3);
        assert_eq!(result.summary.n_permutations, 200);
        assert_eq!(result.summary.sites, vec!["A", "B"]);
    }

    #[test]
    fn test_non_finite_voxel_reported() {
        let subjects: Vec<Subject> = (0..6)
            .map(|i| {
                let site = if i < 3 { "A" } else { "B" };
                let bad = if i == 2 { f32::NAN } else { i as f32 };
                subject(i, site, vec![bad, i as f32 * 0.5])
            })
            .collect();
        let result = SiteEffectTest::new()
            .permutations(50)
            .seed(1)
            .run(&subjects, &Mask::full([2, 1, 1]))
            .unwrap();
        assert!(result
            .summary
            .warnings
            .contains(&Warning::NonFiniteVoxels { count: 1 }));
        assert_eq!(result.voxels.statistic[0], 0.0);
    }

    #[cfg(feature = "parametric")]
    #[test]
    fn test_parametric_only_run() {
        let subjects: Vec<Subject> = (0..10)
            .map(|i| {
                let site = if i % 2 == 0 { "A" } else { "B" };
                subject(i, site, vec![(i as f32 * 1.3).sin(), (i % 2) as f32 * 4.0 + (i as f32 * 0.7).cos()])
            })
            .collect();
        let result = SiteEffectTest::new()
            .test_kind(TestKind::Parametric)
            .run(&subjects, &Mask::full([2, 1, 1]))
            .unwrap();
        assert!(result.voxels.permutation_p.is_none());
        assert!(result.voxels.fwer_p.is_none());
        assert_eq!(result.summary.n_permutations, 0);
        let p = result.voxels.parametric_p.as_ref().unwrap();
        assert!(p[1] < 0.01);
        assert_eq!(result.voxels.q_values.len(), 2);
    }
}
