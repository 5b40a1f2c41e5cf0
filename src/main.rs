use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use site_effect::input::{ColumnAliases, JsonVolumeReader, SiteList, VolumeReader};
use site_effect::output::{self, COMPARISON_FILE};
use site_effect::{
    compare_with, ComparisonThresholds, ContrastSpec, FdrMethod, Mask, MissingValues, ParallelAxis, SiteEffectTest,
    TestKind, VarianceMode,
};

/// Output format for the terminal report
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable report (default)
    Text,
    /// The JSON record that was written
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Permutation,
    Parametric,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MissingArg {
    Mean,
    Median,
    Reject,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FdrArg {
    /// Benjamini-Hochberg
    Bh,
    /// Benjamini-Yekutieli
    By,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AxisArg {
    Auto,
    Voxels,
    Permutations,
}

#[derive(Parser, Debug)]
#[command(name = "site-effect")]
#[command(version)]
#[command(about = "Voxel-wise site-effect testing for harmonization validation", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test for a site effect and write the summary and voxel maps
    Test(TestArgs),
    /// Compare pre- and post-harmonization summaries
    Compare(CompareArgs),
}

#[derive(clap::Args, Debug)]
struct TestArgs {
    /// Site-list table (CSV, or TSV by extension)
    #[arg(long, value_name = "PATH")]
    site_list: PathBuf,

    /// Brain mask volume; nonzero voxels are analyzed
    #[arg(long, value_name = "PATH")]
    mask: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Metric name, accepted as an extra image-path column (`<metric>_path`, `<metric>`)
    #[arg(long)]
    metric: Option<String>,

    /// Inference kind
    #[arg(long = "test", value_enum, default_value = "permutation")]
    test_kind: KindArg,

    /// Number of permutations
    #[arg(short = 'n', long, default_value_t = 5000)]
    permutations: usize,

    /// Covariate columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    covariates: Vec<String>,

    /// Test these design columns instead of the site dummies (comma-separated, e.g. `age`)
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    contrast: Vec<String>,

    /// Significance level
    #[arg(long, default_value_t = 0.05)]
    alpha: f64,

    /// Seed for the permutation sequence
    #[arg(long)]
    seed: Option<u64>,

    /// Per-site variances (Welch-type G statistic)
    #[arg(long)]
    heteroscedastic: bool,

    /// Reference site (default: first site in the table)
    #[arg(long)]
    reference_site: Option<String>,

    /// Keep continuous covariates on their raw scale
    #[arg(long)]
    no_standardize: bool,

    /// Missing covariate value policy
    #[arg(long, value_enum, default_value = "mean")]
    missing: MissingArg,

    /// FDR procedure
    #[arg(long, value_enum, default_value = "bh")]
    fdr: FdrArg,

    /// Condition number above which collinearity is reported
    #[arg(long, default_value_t = 100.0)]
    condition_warning: f64,

    /// Site-list column holding exchangeability block labels
    #[arg(long)]
    block_column: Option<String>,

    /// Worker threads (default: all logical CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Parallel decomposition of the permutation loop
    #[arg(long, value_enum, default_value = "auto")]
    axis: AxisArg,

    /// Terminal report format
    #[arg(long = "format", value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(clap::Args, Debug)]
struct CompareArgs {
    /// Summary of the unharmonized run
    #[arg(long, value_name = "PATH")]
    pre: PathBuf,

    /// Summary of the harmonized run
    #[arg(long, value_name = "PATH")]
    post: PathBuf,

    /// Output directory for the comparison record
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Post significant-voxel percentage must be below this
    #[arg(long, default_value_t = 5.0)]
    max_post_significant: f64,

    /// Effect-size reduction percentage must exceed this
    #[arg(long, default_value_t = 70.0)]
    min_effect_reduction: f64,

    /// Terminal report format
    #[arg(long = "format", value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Initialize the tracing subscriber on stderr
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_test(args: TestArgs) -> Result<bool> {
    let mut aliases = ColumnAliases::default();
    if let Some(metric) = &args.metric {
        aliases = aliases.with_metric(metric);
    }
    if let Some(column) = &args.block_column {
        aliases = aliases.with_block_column(column);
    }

    let site_list = SiteList::read(&args.site_list, &aliases, &args.covariates)
        .with_context(|| format!("reading site list {}", args.site_list.display()))?;
    let subjects = site_list
        .load_subjects(&JsonVolumeReader)
        .context("loading subject volumes")?;
    let mask_volume = JsonVolumeReader
        .read(&args.mask)
        .with_context(|| format!("reading mask {}", args.mask.display()))?;
    let mask = Mask::from_volume(&mask_volume);
    info!(subjects = subjects.len(), voxels = mask.count(), "inputs loaded");

    let mut test = SiteEffectTest::new()
        .test_kind(match args.test_kind {
            KindArg::Permutation => TestKind::Permutation,
            KindArg::Parametric => TestKind::Parametric,
        })
        .permutations(args.permutations)
        .covariates(args.covariates)
        .alpha(args.alpha)
        .variance_mode(if args.heteroscedastic {
            VarianceMode::Heteroscedastic
        } else {
            VarianceMode::Homoscedastic
        })
        .standardize_covariates(!args.no_standardize)
        .missing_values(match args.missing {
            MissingArg::Mean => MissingValues::Mean,
            MissingArg::Median => MissingValues::Median,
            MissingArg::Reject => MissingValues::Reject,
        })
        .fdr_method(match args.fdr {
            FdrArg::Bh => FdrMethod::BenjaminiHochberg,
            FdrArg::By => FdrMethod::BenjaminiYekutieli,
        })
        .condition_warning(args.condition_warning)
        .parallel_axis(match args.axis {
            AxisArg::Auto => ParallelAxis::Auto,
            AxisArg::Voxels => ParallelAxis::Voxels,
            AxisArg::Permutations => ParallelAxis::Permutations,
        });
    if let Some(seed) = args.seed {
        test = test.seed(seed);
    }
    if !args.contrast.is_empty() {
        test = test.contrast(ContrastSpec::columns(args.contrast.join("+"), &args.contrast));
    }
    if let Some(site) = args.reference_site {
        test = test.reference_site(site);
    }
    if let Some(threads) = args.threads {
        test = test.threads(threads);
    }
    if args.block_column.is_some() {
        let blocks = site_list
            .blocks()
            .context("block column has empty labels")?;
        test = test.exchangeability_blocks(blocks);
    }

    let result = test.run(&subjects, &mask).context("site-effect test failed")?;
    output::write_artifacts(&result, &args.output)
        .with_context(|| format!("writing artifacts to {}", args.output.display()))?;

    match args.format {
        OutputFormat::Text => print!("{}", output::format_summary(&result.summary)),
        OutputFormat::Json => println!("{}", output::to_json_pretty(&result.summary)?),
    }
    Ok(true)
}

fn run_compare(args: CompareArgs) -> Result<bool> {
    let pre = output::read_summary(&args.pre)
        .with_context(|| format!("reading pre-harmonization summary {}", args.pre.display()))?;
    let post = output::read_summary(&args.post)
        .with_context(|| format!("reading post-harmonization summary {}", args.post.display()))?;

    let thresholds = ComparisonThresholds {
        max_post_significant_percent: args.max_post_significant,
        min_effect_size_reduction_percent: args.min_effect_reduction,
    };
    let comparison = compare_with(&pre, &post, thresholds);

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let path = args.output.join(COMPARISON_FILE);
    output::write_comparison(&path, &comparison)
        .with_context(|| format!("writing {}", path.display()))?;

    match args.format {
        OutputFormat::Text => print!("{}", output::format_comparison(&comparison)),
        OutputFormat::Json => println!("{}", output::to_json_pretty(&comparison)?),
    }
    Ok(comparison.harmonization_successful)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Test(args) => run_test(args),
        Command::Compare(args) => run_compare(args),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        // Comparison ran but harmonization did not meet the criteria
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
