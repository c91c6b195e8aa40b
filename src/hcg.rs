//! The hierarchical concept graph bundle.
//!
//! Produced once per scene/question pair by the external hierarchy builder
//! and held fixed for the episode. The core only borrows these tensors — it
//! never mutates or owns them — so the bundle is a lifetime-bound view with
//! shape validation at construction (the only place a shape fault may
//! surface, per the fail-fast contract).

use crate::shape::{expect_len, Dims, ShapeError};

/// Borrowed, immutable per-episode concept tensors.
///
/// Layouts (flat row-major, batch leading):
///
/// ```text
/// concept_vis:      (B, N, Dcv)   visual concept embeddings
/// concept_lin:      (B, N, Dcl)   linguistic concept embeddings
/// mono_mask:        (B, N, N, De) intra-level relation structure
/// cross_mask:       (B, N, N)     cross-level (parent/child) structure
/// concept_property: (B, N, P, Dp) property attribution per concept
/// ```
#[derive(Clone, Copy, Debug)]
pub struct HcgBundle<'a> {
    /// Visual concept embeddings `(B, N, Dcv)`.
    pub concept_vis: &'a [f32],
    /// Linguistic concept embeddings `(B, N, Dcl)`.
    pub concept_lin: &'a [f32],
    /// Intra-level relation mask `(B, N, N, De)`.
    pub mono_mask: &'a [f32],
    /// Cross-level relation mask `(B, N, N)`.
    pub cross_mask: &'a [f32],
    /// Property attribution `(B, N, P, Dp)`.
    pub concept_property: &'a [f32],
}

impl<'a> HcgBundle<'a> {
    /// Borrow a bundle, validating every buffer length against `dims`.
    pub fn new(
        dims: &Dims,
        concept_vis: &'a [f32],
        concept_lin: &'a [f32],
        mono_mask: &'a [f32],
        cross_mask: &'a [f32],
        concept_property: &'a [f32],
    ) -> Result<Self, ShapeError> {
        dims.validate()?;
        expect_len("concept_vis", dims.concept_vis_len(), concept_vis.len())?;
        expect_len("concept_lin", dims.concept_lin_len(), concept_lin.len())?;
        expect_len("mono_mask", dims.mono_mask_len(), mono_mask.len())?;
        expect_len("cross_mask", dims.cross_mask_len(), cross_mask.len())?;
        expect_len(
            "concept_property",
            dims.concept_property_len(),
            concept_property.len(),
        )?;
        Ok(Self {
            concept_vis,
            concept_lin,
            mono_mask,
            cross_mask,
            concept_property,
        })
    }

    /// Write the full concept embedding `concept_vis ⧺ concept_lin` for
    /// `(b, n)` into `out` (length `Dv`).
    pub fn concept_embedding(&self, dims: &Dims, b: usize, n: usize, out: &mut [f32]) {
        debug_assert_eq!(out.len(), dims.vision_dim);
        let (dcv, dcl) = (dims.concept_vis_dim, dims.concept_lin_dim);
        let vis = &self.concept_vis[(b * dims.concepts + n) * dcv..][..dcv];
        let lin = &self.concept_lin[(b * dims.concepts + n) * dcl..][..dcl];
        out[..dcv].copy_from_slice(vis);
        out[dcv..].copy_from_slice(lin);
    }

    /// Intra-level adjacency `(b, i, j)` as the mean of `mono_mask` over its
    /// relation dimension.
    pub fn mono_mean(&self, dims: &Dims, b: usize, i: usize, j: usize) -> f32 {
        let n = dims.concepts;
        let de = dims.edge_dim;
        let base = ((b * n + i) * n + j) * de;
        let mut sum = 0.0f32;
        for &v in &self.mono_mask[base..base + de] {
            sum += v;
        }
        sum / de as f32
    }

    /// Cross-level adjacency entry `(b, i, j)`.
    #[inline]
    pub fn cross(&self, dims: &Dims, b: usize, i: usize, j: usize) -> f32 {
        self.cross_mask[(b * dims.concepts + i) * dims.concepts + j]
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
