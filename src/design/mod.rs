//! Design construction: covariate encoding, the design matrix, the
//! site-effect hypothesis and user-named contrasts.

mod contrast;
mod covariates;
mod matrix;

pub use contrast::{ContrastSpec, Hypothesis};
pub use covariates::{
    CovariateEncoder, CovariateRow, CovariateTransform, EncodedCovariate, TRUTHY_LEVELS,
};
pub use matrix::{check_design, Design, DesignBuilder, DEFAULT_CONDITION_WARNING};
