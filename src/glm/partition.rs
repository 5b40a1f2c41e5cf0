//! Partition of the design into nuisance and tested subspaces.
//!
//! For a design `M` (n × p) and contrast `C` (q × p), the nuisance space is
//! `span(M N)` with `N` a basis of the null space of `C`, and the tested space
//! is its orthogonal complement inside `span(M)`. Both are stored as
//! orthonormal bases so per-voxel sums of squares reduce to dot products:
//!
//! ```text
//! SS_between = ‖Qxᵀ u‖²
//! SS_within  = ‖u − Qz Qzᵀ u − Qx Qxᵀ u‖²
//! ```

use crate::error::{Error, Result};
use crate::types::Matrix;

/// Relative singular-value tolerance for basis extraction.
const BASIS_TOLERANCE: f64 = 1e-10;

/// Orthonormal bases of the nuisance and tested subspaces of a design.
#[derive(Debug, Clone)]
pub struct Partition {
    n: usize,
    p: usize,
    q: usize,
    /// n × (p − q), column-major.
    qz: Matrix,
    /// n × q, column-major.
    qx: Matrix,
    /// Diagonal of the full-model residual-forming matrix, `R_ii = 1 − h_ii`.
    residual_diagonal: Vec<f64>,
}

/// Leading `k` left singular vectors of `m`, ordered by singular value.
fn orthonormal_basis(m: &Matrix, k: usize) -> Result<Matrix> {
    let n = m.nrows();
    if k == 0 {
        return Ok(Matrix::zeros(n, 0));
    }

    let svd = m.clone().svd(true, false);
    let u = svd
        .u
        .ok_or_else(|| Error::InvalidContrast("singular value decomposition failed".to_string()))?;
    let singular = &svd.singular_values;

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

    let max = order.first().map_or(0.0, |&i| singular[i]);
    if order.len() < k || singular[order[k - 1]] <= max * BASIS_TOLERANCE {
        return Err(Error::DesignRankDeficient {
            rank: singular.iter().filter(|&&s| s > max * BASIS_TOLERANCE).count(),
            columns: k,
        });
    }

    let mut basis = Matrix::zeros(n, k);
    for (dst, &src) in order.iter().take(k).enumerate() {
        basis.set_column(dst, &u.column(src));
    }
    Ok(basis)
}

impl Partition {
    /// Partition `design` according to `contrast`.
    pub fn new(design: &Matrix, contrast: &Matrix) -> Result<Self> {
        let (n, p) = design.shape();
        let q = contrast.nrows();

        if contrast.ncols() != p {
            return Err(Error::InvalidContrast(format!(
                "contrast spans {} columns, design has {}",
                contrast.ncols(),
                p
            )));
        }
        if q == 0 || q > p {
            return Err(Error::InvalidContrast(format!(
                "contrast rank {} invalid for {} predictors",
                q, p
            )));
        }

        // Null space of C via the projector I − C⁺C
        let pinv = contrast
            .clone()
            .pseudo_inverse(BASIS_TOLERANCE)
            .map_err(|e| Error::InvalidContrast(e.to_string()))?;
        let projector = Matrix::identity(p, p) - &pinv * contrast;
        let null_space = orthonormal_basis(&projector, p - q)?;

        let z = design * &null_space;
        let qz = orthonormal_basis(&z, p - q)?;

        let tested = design - &qz * (qz.transpose() * design);
        let qx = orthonormal_basis(&tested, q)?;

        let residual_diagonal = (0..n)
            .map(|i| {
                let hz: f64 = qz.row(i).iter().map(|v| v * v).sum();
                let hx: f64 = qx.row(i).iter().map(|v| v * v).sum();
                1.0 - hz - hx
            })
            .collect();

        Ok(Self {
            n,
            p,
            q,
            qz,
            qx,
            residual_diagonal,
        })
    }

    /// Number of subjects.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Rank of the tested contrast.
    pub fn q(&self) -> usize {
        self.q
    }

    /// Residual degrees of freedom of the full model.
    pub fn residual_dof(&self) -> usize {
        self.n - self.p
    }

    /// Diagonal of the full-model residual-forming matrix.
    pub fn residual_diagonal(&self) -> &[f64] {
        &self.residual_diagonal
    }

    /// Reduced-model residuals `Rz y` (nuisance effects removed).
    pub fn reduced_residuals(&self, y: &[f64], out: &mut [f64]) {
        out.copy_from_slice(y);
        subtract_projection(&self.qz, y, out);
    }

    /// Sums of squares of `u`, writing the full-model residual into `residual`.
    ///
    /// Returns `(SS_between, SS_within)`.
    pub fn sums_of_squares(&self, u: &[f64], residual: &mut [f64]) -> (f64, f64) {
        residual.copy_from_slice(u);
        subtract_projection(&self.qz, u, residual);
        let ss_between = subtract_projection(&self.qx, u, residual);
        let ss_within = residual.iter().map(|r| r * r).sum();
        (ss_between, ss_within)
    }
}

/// `out -= Q Qᵀ u`; returns `‖Qᵀ u‖²`.
fn subtract_projection(q: &Matrix, u: &[f64], out: &mut [f64]) -> f64 {
    let n = u.len();
    let mut norm = 0.0;
    for basis in q.as_slice().chunks_exact(n) {
        let coeff: f64 = basis.iter().zip(u).map(|(b, x)| b * x).sum();
        norm += coeff * coeff;
        for (o, b) in out.iter_mut().zip(basis) {
            *o -= coeff * b;
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_site_design() -> Matrix {
        Matrix::from_row_slice(
            6,
            2,
            &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_bases_are_orthonormal() {
        let design = Matrix::from_row_slice(
            6,
            3,
            &[
                1.0, 0.0, 0.3, 1.0, 0.0, -1.2, 1.0, 0.0, 0.8, 1.0, 1.0, 0.1, 1.0, 1.0, -0.4, 1.0, 1.0,
                0.9,
            ],
        );
        let contrast = Matrix::from_row_slice(1, 3, &[0.0, 1.0, 0.0]);
        let part = Partition::new(&design, &contrast).unwrap();

        let gram_z = part.qz.transpose() * &part.qz;
        let cross = part.qz.transpose() * &part.qx;
        assert!((gram_z - Matrix::identity(2, 2)).norm() < 1e-10);
        assert!(cross.norm() < 1e-10);
        assert!(((part.qx.transpose() * &part.qx)[(0, 0)] - 1.0).abs() < 1e-10);

        // Leverages sum to p
        let leverage: f64 = part.residual_diagonal().iter().map(|r| 1.0 - r).sum();
        assert!((leverage - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_sums_of_squares_two_groups() {
        let part = Partition::new(&two_site_design(), &Matrix::from_row_slice(1, 2, &[0.0, 1.0])).unwrap();
        let y = [1.0, 2.0, 3.0, 5.0, 6.0, 7.0];

        let mut u = [0.0; 6];
        part.reduced_residuals(&y, &mut u);
        let mean = 4.0;
        for (ui, yi) in u.iter().zip(&y) {
            assert!((ui - (yi - mean)).abs() < 1e-12);
        }

        let mut residual = [0.0; 6];
        let (between, within) = part.sums_of_squares(&u, &mut residual);
        // Group means 2 and 6: between = 6 * (2 - 4)^2 = 24, within = 2 + 2 = 4
        assert!((between - 24.0).abs() < 1e-10);
        assert!((within - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_contrast_width_mismatch() {
        let err = Partition::new(&two_site_design(), &Matrix::from_row_slice(1, 3, &[0.0, 1.0, 0.0]));
        assert!(matches!(err, Err(Error::InvalidContrast(_))));
    }
}
