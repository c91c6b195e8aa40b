/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Forward-only affine projections and named weight loading.
//!
//! The operators carry trained projection weights (query maps, logit heads,
//! edge-weight collapses). Training happens outside this crate; here a
//! [`Linear`] is just a flat row-major `out × in` matrix plus bias applied on
//! the forward path. Weights arrive through a [`ParamMap`] — a named tensor
//! dictionary in the usual `<module>.<proj>.weight` / `.bias` convention —
//! with lengths checked at load time, or from the deterministic seeded
//! initialiser for parameterless bring-up.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::numeric::XorShift32;
use crate::shape::{expect_len, ShapeError};

// ─── Linear ─────────────────────────────────────────────────────────────────

/// A forward-only affine map `y = W·x + b`.
///
/// `weight` is row-major `(out_dim, in_dim)`: row `o` holds the input
/// weights of output `o`.
#[derive(Clone, Debug)]
pub struct Linear {
    /// Flat `(out_dim, in_dim)` weight matrix, row stride `in_dim`.
    pub weight: Vec<f32>,
    /// Bias of length `out_dim`.
    pub bias: Vec<f32>,
    /// Input width.
    pub in_dim: usize,
    /// Output width.
    pub out_dim: usize,
}

impl Linear {
    /// Zero-initialised projection (useful as a placeholder before loading).
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            weight: vec![0.0; in_dim * out_dim],
            bias: vec![0.0; out_dim],
            in_dim,
            out_dim,
        }
    }

    /// Deterministic small-weight initialisation from a shared stream.
    ///
    /// Weights are uniform in `±1/in_dim`, bias zero. Stable across runs for
    /// a fixed seed, which is all the forward core needs.
    pub fn seeded(in_dim: usize, out_dim: usize, rng: &mut XorShift32) -> Self {
        let scale = 1.0 / in_dim as f32;
        let weight = (0..in_dim * out_dim)
            .map(|_| rng.next_symmetric(scale))
            .collect();
        Self {
            weight,
            bias: vec![0.0; out_dim],
            in_dim,
            out_dim,
        }
    }

    /// Apply to a single input vector: `out = W·x + b`.
    pub fn forward(&self, x: &[f32], out: &mut [f32]) {
        debug_assert_eq!(x.len(), self.in_dim);
        debug_assert_eq!(out.len(), self.out_dim);
        for (o, (row, b)) in out
            .iter_mut()
            .zip(self.weight.chunks(self.in_dim).zip(self.bias.iter()))
        {
            let mut sum = *b;
            for (&w, &v) in row.iter().zip(x.iter()) {
                sum += w * v;
            }
            *o = sum;
        }
    }

    /// Apply row-wise to a `(rows, in_dim)` buffer into `(rows, out_dim)`.
    pub fn forward_rows(&self, xs: &[f32], out: &mut [f32]) {
        debug_assert_eq!(xs.len() % self.in_dim, 0);
        for (x_row, o_row) in xs.chunks(self.in_dim).zip(out.chunks_mut(self.out_dim)) {
            self.forward(x_row, o_row);
        }
    }

    /// Replace weights from `params` under `<name>.weight` / `<name>.bias`.
    ///
    /// Fails fast when an entry is missing or its length disagrees with the
    /// declared projection shape.
    pub fn load(&mut self, params: &ParamMap, name: &str) -> Result<(), ShapeError> {
        let w = params.get(&format!("{name}.weight"))?;
        expect_len("linear weight", self.in_dim * self.out_dim, w.len())?;
        let b = params.get(&format!("{name}.bias"))?;
        expect_len("linear bias", self.out_dim, b.len())?;
        self.weight.copy_from_slice(w);
        self.bias.copy_from_slice(b);
        Ok(())
    }
}

// ─── ParamMap ───────────────────────────────────────────────────────────────

/// Named tensor dictionary for loading trained projection weights.
#[derive(Clone, Debug, Default)]
pub struct ParamMap {
    entries: HashMap<String, Vec<f32>>,
}

impl ParamMap {
    /// Empty map.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert (or replace) a named flat tensor.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.entries.insert(name.into(), values);
    }

    /// Fetch a named tensor, failing fast when absent.
    pub fn get(&self, name: &str) -> Result<&[f32], ShapeError> {
        self.entries
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ShapeError::MissingParam(String::from(name)))
    }

    /// Number of stored tensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
