//! Site-list table: one row per subject with site, image path and covariates.
//!
//! Column names are matched against ordered alias lists once, when the header
//! is read; everything downstream works on the resolved schema.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use super::{Subject, VolumeReader};
use crate::error::{Error, Result};

/// Accepted header names per logical field, in priority order.
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    /// Subject identifier column.
    pub subject: Vec<String>,
    /// Site label column.
    pub site: Vec<String>,
    /// Image path column.
    pub image: Vec<String>,
    /// Optional exchangeability block column.
    pub block: Option<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            subject: vec!["subject".to_string()],
            site: vec!["site".to_string()],
            image: ["image_path", "image", "path"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            block: None,
        }
    }
}

impl ColumnAliases {
    /// Accept `<metric>_path` and `<metric>` as image columns after the generic aliases.
    pub fn with_metric(mut self, metric: &str) -> Self {
        let metric = metric.trim().to_lowercase();
        if !metric.is_empty() {
            self.image.push(format!("{}_path", metric));
            self.image.push(metric);
        }
        self
    }

    /// Read exchangeability block labels from `column`.
    pub fn with_block_column(mut self, column: &str) -> Self {
        self.block = Some(column.to_string());
        self
    }
}

/// One parsed site-list row.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteListRow {
    /// Subject identifier.
    pub subject: String,
    /// Site label.
    pub site: String,
    /// Image path as written in the table.
    pub image_path: PathBuf,
    /// Requested covariate values (raw text).
    pub covariates: BTreeMap<String, String>,
    /// Exchangeability block label, when a block column was requested.
    pub block: Option<String>,
}

/// Parsed site list.
#[derive(Debug, Clone)]
pub struct SiteList {
    /// Rows in file order.
    pub rows: Vec<SiteListRow>,
    /// Directory relative image paths are resolved against.
    pub base_dir: PathBuf,
}

#[derive(Debug)]
struct Schema {
    subject: usize,
    site: usize,
    image: usize,
    block: Option<usize>,
    covariates: Vec<(String, usize)>,
}

fn resolve(headers: &StringRecord, aliases: &[String]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(alias))
    })
}

impl Schema {
    fn resolve(
        headers: &StringRecord,
        aliases: &ColumnAliases,
        covariates: &[String],
    ) -> Result<Self> {
        let subject = resolve(headers, &aliases.subject)
            .ok_or_else(|| Error::MissingColumn(aliases.subject.join("|")))?;
        let site = resolve(headers, &aliases.site)
            .ok_or_else(|| Error::MissingColumn(aliases.site.join("|")))?;
        let image = resolve(headers, &aliases.image).ok_or_else(|| {
            Error::UnresolvedImageColumn {
                accepted: aliases.image.join(", "),
            }
        })?;
        let block = match &aliases.block {
            Some(column) => Some(
                resolve(headers, std::slice::from_ref(column))
                    .ok_or_else(|| Error::MissingColumn(column.clone()))?,
            ),
            None => None,
        };
        let covariates = covariates
            .iter()
            .map(|name| {
                resolve(headers, std::slice::from_ref(name))
                    .map(|idx| (name.clone(), idx))
                    .ok_or_else(|| Error::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            subject,
            site,
            image,
            block,
            covariates,
        })
    }
}

impl SiteList {
    /// Read a site list. `.tsv`/`.tab` files are tab-delimited, anything else comma-delimited.
    pub fn read(path: &Path, aliases: &ColumnAliases, covariates: &[String]) -> Result<Self> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => b'\t',
            _ => b',',
        };
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut list = Self::from_reader(file, delimiter, aliases, covariates)?;
        list.base_dir = base_dir;
        Ok(list)
    }

    /// Parse a site list from any reader.
    pub fn from_reader<R: std::io::Read>(
        reader: R,
        delimiter: u8,
        aliases: &ColumnAliases,
        covariates: &[String],
    ) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let schema = Schema::resolve(&headers, aliases, covariates)?;
        debug!(?schema, "resolved site-list columns");

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or("").to_string();

            let covariates = schema
                .covariates
                .iter()
                .map(|(name, idx)| (name.clone(), field(*idx)))
                .collect();

            rows.push(SiteListRow {
                subject: field(schema.subject),
                site: field(schema.site),
                image_path: PathBuf::from(field(schema.image)),
                covariates,
                block: schema.block.map(field),
            });
        }

        if rows.is_empty() {
            return Err(Error::InsufficientData("site list has no rows".to_string()));
        }

        Ok(Self {
            rows,
            base_dir: PathBuf::from("."),
        })
    }

    /// Site labels in row order.
    pub fn site_labels(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.site.clone()).collect()
    }

    /// Exchangeability blocks as dense indices (first appearance order), if a block column was read.
    pub fn blocks(&self) -> Option<Vec<usize>> {
        let mut seen: Vec<&str> = Vec::new();
        self.rows
            .iter()
            .map(|row| {
                let label = row.block.as_deref()?;
                let idx = match seen.iter().position(|s| *s == label) {
                    Some(idx) => idx,
                    None => {
                        seen.push(label);
                        seen.len() - 1
                    }
                };
                Some(idx)
            })
            .collect()
    }

    /// Load every subject's volume through `reader`.
    pub fn load_subjects(&self, reader: &dyn VolumeReader) -> Result<Vec<Subject>> {
        self.rows
            .iter()
            .map(|row| {
                let path = if row.image_path.is_absolute() {
                    row.image_path.clone()
                } else {
                    self.base_dir.join(&row.image_path)
                };
                Ok(Subject {
                    id: row.subject.clone(),
                    site: row.site.clone(),
                    covariates: row.covariates.clone(),
                    volume: reader.read(&path)?,
                })
            })
            .collect()
    }
}
