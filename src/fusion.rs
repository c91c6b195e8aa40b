/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The fusion operator shared by every module.
//!
//! `fuse(x, y) = -(x - y)² + relu(x + y)` merges a query-conditioned feature
//! with a context feature in one parameter-free step: the squared-difference
//! term penalises disagreement, the rectified-sum term rewards jointly large
//! activations. Both terms are symmetric in their arguments, so the operator
//! is symmetric as a whole.
//!
//! Pure numeric function — no state, no failure modes. NaN inputs propagate
//! to the output (checked by test), which is the desired fail-loud behaviour
//! for upstream feature corruption.

use crate::numeric::relu;

/// Elementwise fusion of two scalars: `-(x - y)² + relu(x + y)`.
#[inline]
pub fn fuse(x: f32, y: f32) -> f32 {
    let d = x - y;
    -(d * d) + relu(x + y)
}

/// Fuse two equal-length slices into `out`.
pub fn fuse_into(out: &mut [f32], x: &[f32], y: &[f32]) {
    debug_assert_eq!(out.len(), x.len());
    debug_assert_eq!(out.len(), y.len());
    for ((o, &a), &b) in out.iter_mut().zip(x.iter()).zip(y.iter()) {
        *o = fuse(a, b);
    }
}

/// Fuse a broadcast query vector against every row of a `(rows, dim)` buffer,
/// accumulating into `out` (also `(rows, dim)`).
///
/// Used for the "prepended query row" of the query-prefixed sequences in
/// Find and Describe: the single query fuses against every concept.
pub fn fuse_broadcast_add(out: &mut [f32], query: &[f32], rows: &[f32], dim: usize) {
    debug_assert_eq!(query.len(), dim);
    debug_assert_eq!(out.len(), rows.len());
    for (o_row, r_row) in out.chunks_mut(dim).zip(rows.chunks(dim)) {
        for ((o, &q), &r) in o_row.iter_mut().zip(query.iter()).zip(r_row.iter()) {
            *o += fuse(q, r);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_known_values() {
        // fuse(1, 1) = -0 + relu(2) = 2
        assert!((fuse(1.0, 1.0) - 2.0).abs() < 1e-6);
        // fuse(1, -1) = -4 + relu(0) = -4
        assert!((fuse(1.0, -1.0) + 4.0).abs() < 1e-6);
        // fuse(-2, -3) = -1 + relu(-5) = -1
        assert!((fuse(-2.0, -3.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_is_symmetric() {
        // Both terms are symmetric, so the operator is too.
        let mut rng = crate::numeric::XorShift32::new(7);
        for _ in 0..200 {
            let x = rng.next_symmetric(10.0);
            let y = rng.next_symmetric(10.0);
            assert_eq!(fuse(x, y), fuse(y, x), "fuse({x}, {y}) not symmetric");
        }
    }

    #[test]
    fn test_fuse_nan_propagates() {
        assert!(fuse(f32::NAN, 1.0).is_nan());
        assert!(fuse(0.0, f32::NAN).is_nan());
    }

    #[test]
    fn test_fuse_extreme_inputs_finite() {
        // Large-but-finite inputs square without overflowing to NaN.
        let v = fuse(1e18, -1e18);
        assert!(v.is_infinite() || v.is_finite());
        assert!(!v.is_nan());
        assert!(fuse(1e3, 1e3).is_finite());
    }

    #[test]
    fn test_fuse_into_matches_scalar() {
        let x = [0.5f32, -1.0, 2.0];
        let y = [1.5f32, 1.0, -2.0];
        let mut out = [0.0f32; 3];
        fuse_into(&mut out, &x, &y);
        for i in 0..3 {
            assert_eq!(out[i], fuse(x[i], y[i]));
        }
    }

    #[test]
    fn test_fuse_broadcast_add_accumulates() {
        let query = [1.0f32, 0.0];
        let rows = [1.0f32, 0.0, 0.0, 1.0]; // 2 rows × dim 2
        let mut out = [1.0f32; 4]; // pre-seeded to check accumulation
        fuse_broadcast_add(&mut out, &query, &rows, 2);
        assert_eq!(out[0], 1.0 + fuse(1.0, 1.0));
        assert_eq!(out[1], 1.0 + fuse(0.0, 0.0));
        assert_eq!(out[2], 1.0 + fuse(1.0, 0.0));
        assert_eq!(out[3], 1.0 + fuse(0.0, 1.0));
    }
}
