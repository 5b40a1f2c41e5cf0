//! End-to-end run from a site-list table and JSON volumes on disk.

mod common;

use std::fs;
use std::path::Path;

use common::{cohort, SiteSpec};
use site_effect::input::{ColumnAliases, JsonVolumeReader, SiteList, VolumeReader};
use site_effect::output::{self, maps, SUMMARY_FILE};
use site_effect::{compare, Mask, SiteEffectTest, Volume};

const DIMS: [usize; 3] = [4, 3, 2];

/// Write one volume per subject plus a site list; returns the site-list path.
fn stage_cohort(dir: &Path, shift: f64) -> std::path::PathBuf {
    let n_grid = DIMS.iter().product();
    let subjects = cohort(
        &[SiteSpec::new("siteA", 6, 0.0, 1.0), SiteSpec::new("siteB", 6, shift, 1.0)],
        n_grid,
        31,
    );

    let mut table = String::from("subject,site,fa_path,age\n");
    for (i, subject) in subjects.iter().enumerate() {
        let file = format!("{}_fa.json", subject.id);
        let volume = Volume::new(DIMS, subject.volume.data.clone()).unwrap();
        JsonVolumeReader::write(&dir.join(&file), &volume).unwrap();
        table.push_str(&format!("{},{},{},{}\n", subject.id, subject.site, file, 30 + (i * 7) % 25));
    }
    let path = dir.join("sites.csv");
    fs::write(&path, table).unwrap();
    path
}

fn stage_mask(dir: &Path) -> std::path::PathBuf {
    let n_grid: usize = DIMS.iter().product();
    // Drop the first slice row to exercise unmasking
    let data: Vec<f32> = (0..n_grid).map(|i| if i % 4 == 0 { 0.0 } else { 1.0 }).collect();
    let path = dir.join("mask.json");
    JsonVolumeReader::write(&path, &Volume::new(DIMS, data).unwrap()).unwrap();
    path
}

#[test]
fn site_list_to_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let sites = stage_cohort(dir.path(), 3.0);
    let mask_path = stage_mask(dir.path());

    let covariates = vec!["age".to_string()];
    let list = SiteList::read(&sites, &ColumnAliases::default().with_metric("fa"), &covariates).unwrap();
    assert_eq!(list.rows.len(), 12);

    let subjects = list.load_subjects(&JsonVolumeReader).unwrap();
    let mask = Mask::from_volume(&JsonVolumeReader.read(&mask_path).unwrap());
    assert_eq!(mask.count(), 18);

    let result = SiteEffectTest::new()
        .permutations(99)
        .seed(8)
        .covariates(covariates)
        .run(&subjects, &mask)
        .unwrap();
    assert_eq!(result.summary.sites, vec!["siteA", "siteB"]);
    assert_eq!(result.summary.site_counts, vec![6, 6]);
    assert_eq!(result.summary.n_voxels, 18);

    let out = dir.path().join("results");
    let written = output::write_artifacts(&result, &out).unwrap();
    assert_eq!(written.len(), 8);
    for path in &written {
        assert!(path.exists(), "{} missing", path.display());
    }

    // Maps are on the full grid with zeros outside the mask
    let stat = JsonVolumeReader.read(&out.join(maps::STAT_MAP)).unwrap();
    assert_eq!(stat.dims, DIMS);
    assert!(stat.data.iter().step_by(4).all(|&v| v == 0.0));

    let summary = output::read_summary(&out.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary, result.summary);

    // No staging leftovers
    let leftovers = fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn pre_post_summaries_compare() {
    let dir = tempfile::tempdir().unwrap();
    let mask_path = stage_mask(dir.path());
    let mask = Mask::from_volume(&JsonVolumeReader.read(&mask_path).unwrap());

    let mut summaries = Vec::new();
    for (name, shift) in [("pre", 4.0), ("post", 0.0)] {
        let stage = dir.path().join(name);
        fs::create_dir_all(&stage).unwrap();
        let sites = stage_cohort(&stage, shift);
        let list = SiteList::read(&sites, &ColumnAliases::default().with_metric("fa"), &[]).unwrap();
        let subjects = list.load_subjects(&JsonVolumeReader).unwrap();
        let result = SiteEffectTest::new()
            .permutations(99)
            .seed(8)
            .run(&subjects, &mask)
            .unwrap();
        summaries.push(result.summary);
    }

    let comparison = compare(&summaries[0], &summaries[1]);
    assert!(comparison.pre_percent_significant > 90.0);
    assert!(comparison.effect_size_reduction_percent > 70.0);
    assert!(comparison.post_significance_ok);
    assert!(comparison.harmonization_successful);
}
