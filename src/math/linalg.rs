//! Dense helpers over flat slices, used to build and evaluate the
//! per-triangle affine attribute maps.
//!
//! An "affine row" is three coefficients `(cx, cy, c)` evaluating to
//! `cx*x + cy*y + c` at pixel `(x, y)`. Attribute rows are stored as flat
//! `n * 3` slices, one row per channel.
//!
//! Every `_b` routine accumulates (`+=`) into its adjoint outputs and reads
//! only primal values otherwise.

use super::mat3::Mat3;

/// `out = a * m` for a flat `(n x 3)` slice `a` and a 3x3 matrix `m`.
pub fn rows_times_mat3(a: &[f64], n: usize, m: &Mat3, out: &mut [f64]) {
    debug_assert_eq!(a.len(), n * 3);
    debug_assert_eq!(out.len(), n * 3);
    for r in 0..n {
        for j in 0..3 {
            out[r * 3 + j] = a[r * 3] * m.data[0][j]
                + a[r * 3 + 1] * m.data[1][j]
                + a[r * 3 + 2] * m.data[2][j];
        }
    }
}

/// Reverse of [`rows_times_mat3`]: `a_b += out_b * m^T`, `m_b += a^T * out_b`.
pub fn rows_times_mat3_b(
    a: &[f64],
    n: usize,
    m: &Mat3,
    a_b: &mut [f64],
    m_b: &mut Mat3,
    out_b: &[f64],
) {
    debug_assert_eq!(a.len(), n * 3);
    debug_assert_eq!(out_b.len(), n * 3);
    for r in 0..n {
        for k in 0..3 {
            let mut acc = 0.0;
            for j in 0..3 {
                acc += out_b[r * 3 + j] * m.data[k][j];
                m_b.data[k][j] += a[r * 3 + k] * out_b[r * 3 + j];
            }
            a_b[r * 3 + k] += acc;
        }
    }
}

/// `row * m` for a single row vector.
pub fn row_times_mat3(row: [f64; 3], m: &Mat3) -> [f64; 3] {
    let mut out = [0.0; 3];
    for j in 0..3 {
        out[j] = row[0] * m.data[0][j] + row[1] * m.data[1][j] + row[2] * m.data[2][j];
    }
    out
}

/// Reverse of [`row_times_mat3`].
pub fn row_times_mat3_b(
    row: [f64; 3],
    m: &Mat3,
    row_b: &mut [f64; 3],
    m_b: &mut Mat3,
    out_b: [f64; 3],
) {
    for k in 0..3 {
        let mut acc = 0.0;
        for j in 0..3 {
            acc += out_b[j] * m.data[k][j];
            m_b.data[k][j] += row[k] * out_b[j];
        }
        row_b[k] += acc;
    }
}

/// Hoisted per-scanline form of an affine row: returns `(v0y, dv_dx)` so a
/// pixel evaluates as `v0y + dv_dx * x`. Forward and reverse passes both go
/// through this helper so depth values replay bit-exactly.
#[inline]
pub fn affine_at_y(row: &[f64], y: f64) -> (f64, f64) {
    debug_assert_eq!(row.len(), 3);
    (row[1] * y + row[2], row[0])
}

/// Adjoint of evaluating an affine row at `(x, y)`.
#[inline]
pub fn affine_value_b(row_b: &mut [f64], x: f64, y: f64, v_b: f64) {
    debug_assert_eq!(row_b.len(), 3);
    row_b[0] += v_b * x;
    row_b[1] += v_b * y;
    row_b[2] += v_b;
}
