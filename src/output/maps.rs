//! Output artifacts: the summary record and per-voxel maps.
//!
//! Every artifact is first written to a staging directory inside the output
//! directory and moved into place only once all of them exist. If a move
//! fails, files already published are removed and any earlier artifacts they
//! replaced are restored, so the output directory never holds a mixed set.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::json::write_summary;
use crate::error::{Error, Result};
use crate::input::JsonVolumeReader;
use crate::result::SiteEffectResult;

/// Summary record file name.
pub const SUMMARY_FILE: &str = "site_effect_summary.json";

/// Comparison record file name.
pub const COMPARISON_FILE: &str = "site_effect_comparison.json";

/// Map file names, in write order.
pub const STAT_MAP: &str = "site_effect_stat.json";
pub const P_MAP: &str = "site_effect_p.json";
pub const FWER_P_MAP: &str = "site_effect_p_fwer.json";
pub const ETA2_MAP: &str = "site_effect_eta2.json";
pub const COHENS_F_MAP: &str = "site_effect_cohens_f.json";
pub const NEG_LOG10_P_MAP: &str = "site_effect_neglog10p.json";
pub const SIGNIFICANT_MAP: &str = "site_effect_significant.json";

/// Map values are stored as `f32`; non-finite values are clamped into range.
fn storable(values: &[f64]) -> Vec<f64> {
    let max = f64::from(f32::MAX);
    values
        .iter()
        .map(|&v| if v.is_nan() { 0.0 } else { v.clamp(-max, max) })
        .collect()
}

/// Write the summary and all available maps into `out_dir`.
///
/// Returns the published paths.
pub fn write_artifacts(result: &SiteEffectResult, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".site_effect_staging")
        .tempdir_in(out_dir)
        .map_err(|e| Error::io(out_dir, e))?;

    let voxels = &result.voxels;
    let mut maps: Vec<(&str, Vec<f64>)> = vec![
        (STAT_MAP, voxels.statistic.clone()),
        (ETA2_MAP, voxels.eta_squared.clone()),
        (COHENS_F_MAP, voxels.cohens_f.clone()),
        (
            SIGNIFICANT_MAP,
            voxels.fdr_significant.iter().map(|&s| if s { 1.0 } else { 0.0 }).collect(),
        ),
    ];
    if let Some(p) = voxels.p_values() {
        maps.push((P_MAP, p.to_vec()));
    }
    if let Some(neg) = voxels.neg_log10_p() {
        maps.push((NEG_LOG10_P_MAP, neg));
    }
    if let Some(fwer) = &voxels.fwer_p {
        maps.push((FWER_P_MAP, fwer.clone()));
    }

    let mut names = Vec::with_capacity(maps.len() + 1);
    for (name, values) in &maps {
        let volume = result.mask.unmask(&storable(values));
        JsonVolumeReader::write(&staging.path().join(name), &volume)?;
        names.push(*name);
    }
    write_summary(&staging.path().join(SUMMARY_FILE), &result.summary)?;
    names.push(SUMMARY_FILE);
    debug!(staged = names.len(), "artifacts staged");

    let published = publish(staging.path(), out_dir, &names)?;

    info!(dir = %out_dir.display(), files = published.len(), "artifacts written");
    Ok(published)
}

/// Move staged files into `out_dir`, all or nothing.
fn publish(staging: &Path, out_dir: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
    let backup = staging.join(".previous");
    fs::create_dir(&backup).map_err(|e| Error::io(&backup, e))?;

    // (target, whether it replaced an earlier file now held in `backup`)
    let mut published: Vec<(PathBuf, bool)> = Vec::with_capacity(names.len());
    for name in names {
        let target = out_dir.join(name);
        match move_into_place(&staging.join(name), &target, &backup.join(name)) {
            Ok(replaced) => published.push((target, replaced)),
            Err(e) => {
                roll_back(&published, &backup);
                return Err(Error::io(&target, e));
            }
        }
    }
    Ok(published.into_iter().map(|(target, _)| target).collect())
}

fn move_into_place(staged: &Path, target: &Path, backup: &Path) -> io::Result<bool> {
    let replaced = target.is_file();
    if replaced {
        fs::rename(target, backup)?;
    }
    if let Err(e) = fs::rename(staged, target) {
        if replaced {
            fs::rename(backup, target)?;
        }
        return Err(e);
    }
    Ok(replaced)
}

fn roll_back(published: &[(PathBuf, bool)], backup: &Path) {
    for (target, replaced) in published.iter().rev() {
        let undone = match target.file_name() {
            Some(name) if *replaced => fs::rename(backup.join(name), target),
            _ => fs::remove_file(target),
        };
        if let Err(e) = undone {
            warn!(path = %target.display(), error = %e, "could not roll back artifact");
        }
    }
}
