//! Covariate encoding: raw per-subject values to numeric design columns.
//!
//! Numeric columns are continuous (optionally z-scored). Non-numeric columns
//! are binary: when any level is in the truthy table, truthy levels map to 1.0
//! and everything else to 0.0; otherwise the column must have at most two
//! levels. Each encoded column keeps the transform needed to encode a new
//! subject's raw value identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MissingValues;
use crate::error::{Error, Result, Warning};
use crate::statistics::median;

/// Tokens encoded as 1.0 for binary categorical covariates (case-insensitive).
pub const TRUTHY_LEVELS: [&str; 3] = ["M", "MALE", "1"];

/// Tokens treated as a missing value.
const MISSING_TOKENS: [&str; 6] = ["", "NA", "N/A", "NAN", "NULL", "NONE"];

/// Relative standard deviation below which a column counts as constant.
const CONSTANT_TOLERANCE: f64 = 1e-12;

fn is_missing(raw: &str) -> bool {
    let token = raw.trim().to_ascii_uppercase();
    MISSING_TOKENS.contains(&token.as_str())
}

fn is_truthy(raw: &str) -> bool {
    let token = raw.trim().to_ascii_uppercase();
    TRUTHY_LEVELS.contains(&token.as_str())
}

/// Raw covariate values of one subject.
#[derive(Debug, Clone, Copy)]
pub struct CovariateRow<'a> {
    /// Subject identifier (for error messages).
    pub subject: &'a str,
    /// Raw values by covariate name.
    pub values: &'a BTreeMap<String, String>,
}

/// How a raw value becomes a design entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CovariateTransform {
    /// Numeric value, optionally z-scored with stored moments.
    Continuous {
        /// Mean over subjects (after imputation).
        mean: f64,
        /// Population standard deviation over subjects.
        std: f64,
        /// Whether `(x - mean) / std` is applied.
        standardized: bool,
        /// Value substituted for a missing entry.
        fill: f64,
    },
    /// Two-level categorical value.
    Binary {
        /// Level encoded as 1.0 when neither level is in the truthy table.
        one_level: Option<String>,
    },
}

impl CovariateTransform {
    /// Encode a single raw value exactly as the fitted column was encoded.
    pub fn encode(&self, name: &str, raw: &str) -> Result<f64> {
        match self {
            CovariateTransform::Continuous {
                mean,
                std,
                standardized,
                fill,
            } => {
                let x = if is_missing(raw) {
                    *fill
                } else {
                    raw.trim().parse::<f64>().map_err(|_| {
                        Error::InvalidConfig(format!(
                            "covariate '{}' expects a number, got '{}'",
                            name, raw
                        ))
                    })?
                };
                Ok(if *standardized { (x - mean) / std } else { x })
            }
            CovariateTransform::Binary { one_level } => {
                let token = raw.trim().to_ascii_uppercase();
                Ok(match one_level {
                    Some(level) => (token == *level) as u8 as f64,
                    None => is_truthy(raw) as u8 as f64,
                })
            }
        }
    }
}

/// An encoded design column.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCovariate {
    /// Covariate name (also the design column name).
    pub name: String,
    /// One value per subject, in input order.
    pub values: Vec<f64>,
    /// Parameters to encode further subjects identically.
    pub transform: CovariateTransform,
}

/// Converts raw covariate tables into numeric design columns.
#[derive(Debug, Clone)]
pub struct CovariateEncoder {
    standardize: bool,
    missing: MissingValues,
}

impl Default for CovariateEncoder {
    fn default() -> Self {
        Self::new(true, MissingValues::Mean)
    }
}

impl CovariateEncoder {
    /// Create an encoder.
    pub fn new(standardize: bool, missing: MissingValues) -> Self {
        Self {
            standardize,
            missing,
        }
    }

    /// Encode each named covariate over all rows.
    ///
    /// Constant columns are dropped with a warning.
    pub fn encode(
        &self,
        names: &[String],
        rows: &[CovariateRow<'_>],
    ) -> Result<(Vec<EncodedCovariate>, Vec<Warning>)> {
        let mut columns = Vec::with_capacity(names.len());
        let mut warnings = Vec::new();

        for name in names {
            let raw: Vec<&str> = rows
                .iter()
                .map(|row| {
                    row.values
                        .get(name)
                        .map(String::as_str)
                        .ok_or_else(|| Error::MissingCovariateValue {
                            name: name.clone(),
                            subject: row.subject.to_string(),
                        })
                })
                .collect::<Result<_>>()?;

            let numeric = raw
                .iter()
                .filter(|v| !is_missing(v))
                .all(|v| v.trim().parse::<f64>().is_ok());

            let encoded = if numeric {
                self.encode_continuous(name, &raw, rows, &mut warnings)?
            } else {
                encode_binary(name, &raw, rows)?
            };

            let constant = match &encoded.transform {
                CovariateTransform::Continuous { mean, std, .. } => {
                    *std <= CONSTANT_TOLERANCE * mean.abs().max(1.0)
                }
                CovariateTransform::Binary { .. } => {
                    encoded.values.iter().all(|&v| v == encoded.values[0])
                }
            };

            if constant {
                warn!(covariate = %name, "constant covariate dropped");
                warnings.push(Warning::DroppedConstantCovariate { name: name.clone() });
                continue;
            }

            columns.push(encoded);
        }

        Ok((columns, warnings))
    }

    fn encode_continuous(
        &self,
        name: &str,
        raw: &[&str],
        rows: &[CovariateRow<'_>],
        warnings: &mut Vec<Warning>,
    ) -> Result<EncodedCovariate> {
        let parsed: Vec<Option<f64>> = raw
            .iter()
            .map(|v| {
                if is_missing(v) {
                    None
                } else {
                    v.trim().parse::<f64>().ok()
                }
            })
            .collect();

        let observed: Vec<f64> = parsed.iter().flatten().copied().collect();
        let n_missing = parsed.len() - observed.len();

        let first_missing = || {
            let idx = parsed.iter().position(Option::is_none).unwrap_or(0);
            Error::MissingCovariateValue {
                name: name.to_string(),
                subject: rows[idx].subject.to_string(),
            }
        };

        if observed.is_empty() {
            return Err(first_missing());
        }

        let fill = match self.missing {
            MissingValues::Reject if n_missing > 0 => return Err(first_missing()),
            MissingValues::Median => median(&observed).unwrap_or(0.0),
            MissingValues::Mean | MissingValues::Reject => {
                observed.iter().sum::<f64>() / observed.len() as f64
            }
        };

        if n_missing > 0 {
            warn!(covariate = %name, count = n_missing, fill, "imputed missing covariate values");
            warnings.push(Warning::ImputedMissingValues {
                name: name.to_string(),
                count: n_missing,
            });
        }

        let values: Vec<f64> = parsed.iter().map(|v| v.unwrap_or(fill)).collect();
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        let standardized = self.standardize && std > CONSTANT_TOLERANCE * mean.abs().max(1.0);
        let values = if standardized {
            values.iter().map(|v| (v - mean) / std).collect()
        } else {
            values
        };

        Ok(EncodedCovariate {
            name: name.to_string(),
            values,
            transform: CovariateTransform::Continuous {
                mean,
                std,
                standardized,
                fill,
            },
        })
    }
}

fn encode_binary(name: &str, raw: &[&str], rows: &[CovariateRow<'_>]) -> Result<EncodedCovariate> {
    if let Some(idx) = raw.iter().position(|v| is_missing(v)) {
        return Err(Error::MissingCovariateValue {
            name: name.to_string(),
            subject: rows[idx].subject.to_string(),
        });
    }

    let mut levels: Vec<String> = Vec::new();
    for v in raw {
        let token = v.trim().to_ascii_uppercase();
        if !levels.contains(&token) {
            levels.push(token);
        }
    }

    // Recognized tokens go through the truthy table; an unmapped column must
    // have at most two levels and is treatment-coded by first appearance.
    let one_level = if levels.iter().any(|l| is_truthy(l)) {
        None
    } else if levels.len() > 2 {
        return Err(Error::UnsupportedCovariateKind {
            name: name.to_string(),
            levels: levels.len(),
        });
    } else {
        levels.get(1).cloned()
    };
    let transform = CovariateTransform::Binary { one_level };

    let values = raw
        .iter()
        .map(|v| transform.encode(name, v))
        .collect::<Result<Vec<_>>>()?;

    Ok(EncodedCovariate {
        name: name.to_string(),
        values,
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, values: &[&str]) -> (Vec<String>, Vec<BTreeMap<String, String>>) {
        let ids = (0..values.len()).map(|i| format!("sub-{:02}", i)).collect();
        let maps = values
            .iter()
            .map(|v| BTreeMap::from([(name.to_string(), v.to_string())]))
            .collect();
        (ids, maps)
    }

    fn encode(
        encoder: &CovariateEncoder,
        name: &str,
        values: &[&str],
    ) -> Result<(Vec<EncodedCovariate>, Vec<Warning>)> {
        let (ids, maps) = table(name, values);
        let rows: Vec<CovariateRow<'_>> = ids
            .iter()
            .zip(&maps)
            .map(|(id, values)| CovariateRow {
                subject: id,
                values,
            })
            .collect();
        encoder.encode(&[name.to_string()], &rows)
    }

    #[test]
    fn test_standardization() {
        let (cols, warnings) = encode(&CovariateEncoder::default(), "age", &["20", "30", "40"]).unwrap();
        assert!(warnings.is_empty());

        let col = &cols[0];
        assert!(col.values[1].abs() < 1e-12);
        let mean: f64 = col.values.iter().sum::<f64>() / 3.0;
        let var: f64 = col.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);

        match &col.transform {
            CovariateTransform::Continuous { mean, std, .. } => {
                assert!((mean - 30.0).abs() < 1e-12);
                assert!((std - (200.0f64 / 3.0).sqrt()).abs() < 1e-12);
            }
            other => panic!("unexpected transform {:?}", other),
        }
    }

    #[test]
    fn test_transform_encodes_new_subject() {
        let (cols, _) = encode(&CovariateEncoder::default(), "age", &["20", "30", "40"]).unwrap();
        let col = &cols[0];
        assert!((col.transform.encode("age", "40").unwrap() - col.values[2]).abs() < 1e-12);
    }

    #[test]
    fn test_unstandardized_keeps_raw_values() {
        let encoder = CovariateEncoder::new(false, MissingValues::Mean);
        let (cols, _) = encode(&encoder, "age", &["20", "30", "40"]).unwrap();
        assert_eq!(cols[0].values, vec![20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_constant_covariate_dropped() {
        let (cols, warnings) = encode(&CovariateEncoder::default(), "group", &["1", "1", "1"]).unwrap();
        assert!(cols.is_empty());
        assert_eq!(
            warnings,
            vec![Warning::DroppedConstantCovariate {
                name: "group".to_string()
            }]
        );
    }

    #[test]
    fn test_sex_encoding() {
        let (cols, _) = encode(&CovariateEncoder::default(), "sex", &["M", "F", "male", "Female"]).unwrap();
        assert_eq!(cols[0].values, vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unrecognized_binary_levels_use_first_appearance() {
        let (cols, _) = encode(&CovariateEncoder::default(), "hand", &["L", "R", "L"]).unwrap();
        assert_eq!(cols[0].values, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_multi_level_categorical_rejected() {
        let err = encode(&CovariateEncoder::default(), "scanner", &["A", "B", "C", "A"]).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedCovariateKind { levels: 3, .. }
        ));
    }

    #[test]
    fn test_mean_imputation() {
        let encoder = CovariateEncoder::new(false, MissingValues::Mean);
        let (cols, warnings) = encode(&encoder, "age", &["10", "NA", "30"]).unwrap();
        assert!((cols[0].values[1] - 20.0).abs() < 1e-12);
        assert_eq!(
            warnings,
            vec![Warning::ImputedMissingValues {
                name: "age".to_string(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_median_imputation() {
        let encoder = CovariateEncoder::new(false, MissingValues::Median);
        let (cols, _) = encode(&encoder, "age", &["10", "", "30", "100"]).unwrap();
        assert!((cols[0].values[1] - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_reject_missing() {
        let encoder = CovariateEncoder::new(true, MissingValues::Reject);
        let err = encode(&encoder, "age", &["10", "N/A", "30"]).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCovariateValue { ref subject, .. } if subject == "sub-01"
        ));
    }
}
