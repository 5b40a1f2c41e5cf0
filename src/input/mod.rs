//! Inputs: the site-list table and per-subject scalar volumes.
//!
//! The statistical core never parses an image format. Volumes arrive through
//! the [`VolumeReader`] trait; the crate ships a JSON reader for tooling and
//! tests, and callers plug in their own for other formats.

mod site_list;
mod volume;

pub use site_list::{ColumnAliases, SiteList, SiteListRow};
pub use volume::{JsonVolumeReader, Mask, Volume, VolumeReader};

use std::collections::BTreeMap;

/// One subject: identifier, site label, raw covariate values and its volume.
#[derive(Debug, Clone)]
pub struct Subject {
    /// Subject identifier.
    pub id: String,
    /// Site (scanner) label.
    pub site: String,
    /// Raw covariate values by column name.
    pub covariates: BTreeMap<String, String>,
    /// Scalar metric volume on the common voxel grid.
    pub volume: Volume,
}
