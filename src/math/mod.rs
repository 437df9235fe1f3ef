// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.
//!
//! Matrices are `ndarray` arrays everywhere in this crate; the dense
//! decompositions (eigen, SVD, LU) are done by `nalgebra`, and the conversion
//! happens here.

pub mod simplex;
pub mod stats;

pub use simplex::{nelder_mead, SimplexResult};
pub use stats::{median, sigma, sigma_clip};

use nalgebra::DMatrix;
use ndarray::prelude::*;

use crate::c64;

/// Relative singular-value cutoff used by [`pseudo_inverse`].
const PINV_RCOND: f64 = 1e-12;

/// The column-wise Kronecker (Khatri-Rao) product of `a` (m×k) and `b` (n×k).
/// Row `i * n + j` of the result is `a[i, :] * b[j, :]`, so that for a
/// row-major flattened matrix `R`, `R = A diag(s) B^T` is
/// `vec(R) = khatri_rao(A, B) s`.
pub fn khatri_rao(a: ArrayView2<c64>, b: ArrayView2<c64>) -> Array2<c64> {
    let (m, k) = a.dim();
    let (n, k2) = b.dim();
    assert_eq!(k, k2, "Khatri-Rao operands must have the same number of columns");

    let mut out = Array2::zeros((m * n, k));
    for (i, a_row) in a.outer_iter().enumerate() {
        for (j, b_row) in b.outer_iter().enumerate() {
            out.row_mut(i * n + j)
                .iter_mut()
                .zip(a_row.iter().zip(b_row.iter()))
                .for_each(|(o, (&a, &b))| *o = a * b);
        }
    }
    out
}

/// `a^H`.
pub fn adjoint(a: ArrayView2<c64>) -> Array2<c64> {
    a.t().mapv(|v| v.conj())
}

pub(crate) fn to_nalgebra(a: ArrayView2<c64>) -> DMatrix<c64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[(i, j)])
}

pub(crate) fn from_nalgebra(m: &DMatrix<c64>) -> Array2<c64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Eigendecomposition of a Hermitian matrix. Only the lower triangle of `a` is
/// read. Eigenvectors are the columns of the returned matrix, in the same
/// order as the eigenvalues (which are not sorted).
pub fn hermitian_eigen(a: ArrayView2<c64>) -> (Array1<f64>, Array2<c64>) {
    let eigen = nalgebra::SymmetricEigen::new(to_nalgebra(a));
    (
        Array1::from_iter(eigen.eigenvalues.iter().copied()),
        from_nalgebra(&eigen.eigenvectors),
    )
}

/// The Moore-Penrose pseudo-inverse, via the SVD. Singular values smaller than
/// a relative cutoff of the largest are treated as zero.
pub fn pseudo_inverse(a: ArrayView2<c64>) -> Option<Array2<c64>> {
    let svd = to_nalgebra(a).svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0, f64::max);
    if !max_sv.is_finite() {
        return None;
    }
    svd.pseudo_inverse(max_sv * PINV_RCOND)
        .ok()
        .map(|m| from_nalgebra(&m))
}

/// Solve `a x = b` for `x` with an LU decomposition. `None` if `a` is
/// singular.
pub fn solve(a: ArrayView2<c64>, b: ArrayView2<c64>) -> Option<Array2<c64>> {
    to_nalgebra(a)
        .lu()
        .solve(&to_nalgebra(b))
        .map(|m| from_nalgebra(&m))
}

/// The inverse of a square matrix. `None` if `a` is singular.
pub fn inverse(a: ArrayView2<c64>) -> Option<Array2<c64>> {
    to_nalgebra(a).try_inverse().map(|m| from_nalgebra(&m))
}

/// Replace any non-finite entries with zero.
pub fn zero_non_finite(a: &mut Array2<c64>) {
    a.mapv_inplace(|v| if v.is_finite() { v } else { c64::default() });
}
