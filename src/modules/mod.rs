/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The module library: seven operators over the soft stack.
//!
//! Every operator shares one contract — read the attention under the current
//! pointer, compute against the step inputs and the HCG bundle, write the
//! result back through the pointer shifter, and confine all side effects to
//! the `(stack, pointer, memory)` triple. The controller (external) decides
//! *which* operator runs; this library only executes.
//!
//! | Operator | in | out | Effect |
//! |----------|----|-----|--------|
//! | NoOp      | 1 | 0 | identity placeholder |
//! | Find      | 0 | 1 | push a fresh concept attention |
//! | Transform | 1 | 1 | same-level relational hop, in place |
//! | Filter    | 1 | 1 | property-weighted masking, in place |
//! | And       | 2 | 1 | pop two, push their minimum |
//! | Describe  | 1 | 1 | readout into the memory register |
//! | Relate    | 1 | 1 | hierarchy-aware relational hop, in place |
//!
//! Dispatch comes in two forms: [`ModuleLibrary::apply`] (hard choice) and
//! [`ModuleLibrary::apply_blend`] (every operator runs on the same input
//! state and the outputs are mixed by a probability vector — soft program
//! execution; never collapse this to a switch).

mod describe;
mod filter;
mod find;
mod relate;
mod transform;

pub use describe::DescribeModule;
pub use filter::FilterModule;
pub use find::FindModule;
pub use relate::RelateModule;
pub use transform::TransformModule;

use alloc::vec;

use crate::fusion::{fuse_broadcast_add, fuse_into};
use crate::hcg::HcgBundle;
use crate::linear::{Linear, ParamMap};
use crate::numeric::XorShift32;
use crate::shape::{expect_len, Dims, ShapeError};
use crate::stack::{Attention, EpisodeState};

/// Number of operator types in the library.
pub const NUM_MODULES: usize = 7;

// ─── ModuleKind ─────────────────────────────────────────────────────────────

/// Identifier of one operator in the library.
///
/// The discriminants are the column order of the validity matrix and the
/// index order of blend-probability vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ModuleKind {
    /// Structural placeholder; leaves the state untouched.
    NoOp = 0,
    /// Push a fresh concept attention computed from the control vector.
    Find = 1,
    /// Same-level relational hop through the plain relation mask.
    Transform = 2,
    /// Property-weighted masking of the current attention.
    Filter = 3,
    /// Conjunction: pop two attentions, push their elementwise minimum.
    And = 4,
    /// Terminal readout into the memory register.
    Describe = 5,
    /// Cross-hierarchy relational hop through mono and cross masks.
    Relate = 6,
}

impl ModuleKind {
    /// All operators in validity-matrix column order.
    pub const ALL: [ModuleKind; NUM_MODULES] = [
        ModuleKind::NoOp,
        ModuleKind::Find,
        ModuleKind::Transform,
        ModuleKind::Filter,
        ModuleKind::And,
        ModuleKind::Describe,
        ModuleKind::Relate,
    ];

    /// How many stack entries the operator consumes.
    pub const fn input_arity(self) -> usize {
        match self {
            ModuleKind::NoOp => 1,
            ModuleKind::Find => 0,
            ModuleKind::Transform => 1,
            ModuleKind::Filter => 1,
            ModuleKind::And => 2,
            ModuleKind::Describe => 1,
            ModuleKind::Relate => 1,
        }
    }

    /// How many stack entries the operator produces.
    pub const fn output_arity(self) -> usize {
        match self {
            ModuleKind::NoOp => 0,
            ModuleKind::Find => 1,
            ModuleKind::Transform => 1,
            ModuleKind::Filter => 1,
            ModuleKind::And => 1,
            ModuleKind::Describe => 1,
            ModuleKind::Relate => 1,
        }
    }

    /// Stable lowercase name (used by the FFI surface and parameter keys).
    pub const fn name(self) -> &'static str {
        match self {
            ModuleKind::NoOp => "noop",
            ModuleKind::Find => "find",
            ModuleKind::Transform => "transform",
            ModuleKind::Filter => "filter",
            ModuleKind::And => "and",
            ModuleKind::Describe => "describe",
            ModuleKind::Relate => "relate",
        }
    }

    /// Parse a stable name back into a kind.
    pub fn from_name(name: &str) -> Option<Self> {
        ModuleKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

// ─── StepInputs ─────────────────────────────────────────────────────────────

/// Read-only per-step inputs shared by every operator.
///
/// Layouts (flat row-major, batch leading):
///
/// ```text
/// vision_feat:   (B, N, Dv)     raw vision features for the readout
/// feat:          (B, N, Dv)     region features
/// feat_edge:     (B, N, N, De)  pairwise edge features
/// control:       (B, Dh)        the controller's instruction signal c_i
/// relation_mask: (B, N, N)      plain same-level relation structure
/// ```
#[derive(Clone, Copy, Debug)]
pub struct StepInputs<'a> {
    /// Raw vision features `(B, N, Dv)`.
    pub vision_feat: &'a [f32],
    /// Region features `(B, N, Dv)`.
    pub feat: &'a [f32],
    /// Pairwise edge features `(B, N, N, De)`.
    pub feat_edge: &'a [f32],
    /// Control vector `(B, Dh)` for this step.
    pub control: &'a [f32],
    /// Plain relation mask `(B, N, N)`.
    pub relation_mask: &'a [f32],
    /// The borrowed HCG bundle.
    pub hcg: HcgBundle<'a>,
}

impl<'a> StepInputs<'a> {
    /// Assemble step inputs, validating every buffer length against `dims`.
    pub fn new(
        dims: &Dims,
        vision_feat: &'a [f32],
        feat: &'a [f32],
        feat_edge: &'a [f32],
        control: &'a [f32],
        relation_mask: &'a [f32],
        hcg: HcgBundle<'a>,
    ) -> Result<Self, ShapeError> {
        expect_len("vision_feat", dims.vision_feat_len(), vision_feat.len())?;
        expect_len("feat", dims.vision_feat_len(), feat.len())?;
        expect_len("feat_edge", dims.feat_edge_len(), feat_edge.len())?;
        expect_len("control", dims.control_len(), control.len())?;
        expect_len(
            "relation_mask",
            dims.relation_mask_len(),
            relation_mask.len(),
        )?;
        Ok(Self {
            vision_feat,
            feat,
            feat_edge,
            control,
            relation_mask,
            hcg,
        })
    }

    /// Control vector row for batch element `b`.
    #[inline]
    pub(crate) fn control_row(&self, dims: &Dims, b: usize) -> &[f32] {
        &self.control[b * dims.hidden_dim..(b + 1) * dims.hidden_dim]
    }

    /// Region feature row `(b, n)`.
    #[inline]
    pub(crate) fn feat_row(&self, dims: &Dims, b: usize, n: usize) -> &[f32] {
        &self.feat[(b * dims.concepts + n) * dims.vision_dim..][..dims.vision_dim]
    }

    /// Edge feature entry `(b, i, j)`, length `De`.
    #[inline]
    pub(crate) fn edge_row(&self, dims: &Dims, b: usize, i: usize, j: usize) -> &[f32] {
        let n = dims.concepts;
        &self.feat_edge[((b * n + i) * n + j) * dims.edge_dim..][..dims.edge_dim]
    }
}

// ─── Shared fusion helper ───────────────────────────────────────────────────

/// Concept logits from a query-prefixed sequence, used by Find and Describe.
///
/// The sequence `[query] ⧺ region features` is fused against the concept
/// embeddings by aligning region row `n` with concept `n` and broadcasting
/// the prepended query row: `x_n = fuse(q, c_n) + fuse(feat_n, c_n)`. The
/// logit head then maps each fused row to per-glimpse scores.
///
/// Writes raw (pre-softmax) logits into `out`, layout `(B, N, G)`.
pub(crate) fn query_prefixed_logits(
    dims: &Dims,
    inputs: &StepInputs<'_>,
    query_proj: &Linear,
    logit_proj: &Linear,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), dims.attention_len());
    let (n_axis, g_axis, dv) = (dims.concepts, dims.glimpses, dims.vision_dim);
    let mut query = vec![0.0f32; dv];
    let mut emb = vec![0.0f32; n_axis * dv];
    let mut fused = vec![0.0f32; n_axis * dv];
    for b in 0..dims.batch {
        query_proj.forward(inputs.control_row(dims, b), &mut query);
        for n in 0..n_axis {
            inputs
                .hcg
                .concept_embedding(dims, b, n, &mut emb[n * dv..(n + 1) * dv]);
        }
        let feat_rows = &inputs.feat[b * n_axis * dv..(b + 1) * n_axis * dv];
        fuse_into(&mut fused, feat_rows, &emb);
        fuse_broadcast_add(&mut fused, &query, &emb, dv);
        let base = b * n_axis * g_axis;
        logit_proj.forward_rows(&fused, &mut out[base..base + n_axis * g_axis]);
    }
}

// ─── ModuleLibrary ──────────────────────────────────────────────────────────

/// The seven operators plus their dispatch machinery.
///
/// Owns the trained projection weights; everything else (stack state, HCG,
/// step inputs) is borrowed per call. Construction validates `dims` once so
/// the operator hot path never re-checks shapes.
#[derive(Clone, Debug)]
pub struct ModuleLibrary {
    dims: Dims,
    find: FindModule,
    filter: FilterModule,
    relate: RelateModule,
    transform: TransformModule,
    describe: DescribeModule,
}

impl ModuleLibrary {
    /// Build a library with deterministic seeded projection weights.
    ///
    /// Real deployments overwrite the weights via [`Self::load_params`];
    /// the seeded values make the machine runnable without a checkpoint.
    pub fn with_seed(dims: Dims, seed: u32) -> Result<Self, ShapeError> {
        dims.validate()?;
        let mut rng = XorShift32::new(seed);
        Ok(Self {
            find: FindModule::seeded(&dims, &mut rng),
            filter: FilterModule::seeded(&dims, &mut rng),
            relate: RelateModule::seeded(&dims, &mut rng),
            transform: TransformModule::seeded(&dims, &mut rng),
            describe: DescribeModule::seeded(&dims, &mut rng),
            dims,
        })
    }

    /// Build a library with the default seed.
    pub fn new(dims: Dims) -> Result<Self, ShapeError> {
        Self::with_seed(dims, 0x5EED_CAFE)
    }

    /// The dims this library was built for.
    pub fn dims(&self) -> &Dims {
        &self.dims
    }

    /// Load every projection from a named parameter map
    /// (`find.query_proj.weight`, `relate.edge_proj.bias`, …).
    pub fn load_params(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.find.load(params)?;
        self.filter.load(params)?;
        self.relate.load(params)?;
        self.transform.load(params)?;
        self.describe.load(params)?;
        Ok(())
    }

    /// Run one operator, consuming and returning the episode state.
    ///
    /// Read-before-write is mandatory and every operator honours it: the
    /// pre-step attention is read before the post-step attention is written.
    pub fn apply(
        &self,
        kind: ModuleKind,
        inputs: &StepInputs<'_>,
        state: EpisodeState,
    ) -> EpisodeState {
        match kind {
            ModuleKind::NoOp => state,
            ModuleKind::Find => self.find.apply(&self.dims, inputs, state),
            ModuleKind::Transform => self.transform.apply(&self.dims, inputs, state),
            ModuleKind::Filter => self.filter.apply(&self.dims, inputs, state),
            ModuleKind::And => apply_and(&self.dims, state),
            ModuleKind::Describe => self.describe.apply(&self.dims, inputs, state),
            ModuleKind::Relate => self.relate.apply(&self.dims, inputs, state),
        }
    }

    /// Soft program execution: run every operator on the same input state
    /// and mix the seven outputs by `probs` (one weight per
    /// [`ModuleKind::ALL`] entry, expected to sum to 1 after the
    /// controller's validity masking).
    pub fn apply_blend(
        &self,
        probs: &[f32; NUM_MODULES],
        inputs: &StepInputs<'_>,
        state: &EpisodeState,
    ) -> EpisodeState {
        let mut blended = state.clone();
        for v in blended.stack.data.iter_mut() {
            *v = 0.0;
        }
        for v in blended.ptr.data.iter_mut() {
            *v = 0.0;
        }
        blended.mem.clear();

        for (kind, &p) in ModuleKind::ALL.iter().zip(probs.iter()) {
            if p == 0.0 {
                continue;
            }
            let out = self.apply(*kind, inputs, state.clone());
            for (acc, &v) in blended.stack.data.iter_mut().zip(out.stack.data.iter()) {
                *acc += p * v;
            }
            for (acc, &v) in blended.ptr.data.iter_mut().zip(out.ptr.data.iter()) {
                *acc += p * v;
            }
            for (acc, &v) in blended.mem.data.iter_mut().zip(out.mem.data.iter()) {
                *acc += p * v;
            }
        }
        blended
    }
}

// ─── And ────────────────────────────────────────────────────────────────────

/// Pop the two topmost attentions and push their elementwise minimum.
///
/// Parameter-free pure stack mechanics: read the top (`att2`), blank the
/// slot, move the pointer back, read again (`att1`), write `min(att1, att2)`.
/// Memory is zeroed.
fn apply_and(dims: &Dims, mut state: EpisodeState) -> EpisodeState {
    let att2 = state.stack.read(&state.ptr);
    let zero = Attention::zeros(dims);
    state.stack.write(&state.ptr, &zero);
    state.ptr.move_backward();
    let mut att1 = state.stack.read(&state.ptr);
    att1.min_assign(&att2);
    state.stack.write(&state.ptr, &att1);
    state.mem.clear();
    state
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_table_exact() {
        let expect: [(ModuleKind, usize, usize); 7] = [
            (ModuleKind::NoOp, 1, 0),
            (ModuleKind::Find, 0, 1),
            (ModuleKind::Transform, 1, 1),
            (ModuleKind::Filter, 1, 1),
            (ModuleKind::And, 2, 1),
            (ModuleKind::Describe, 1, 1),
            (ModuleKind::Relate, 1, 1),
        ];
        for (kind, k_in, k_out) in expect {
            assert_eq!(kind.input_arity(), k_in, "{kind:?} input arity");
            assert_eq!(kind.output_arity(), k_out, "{kind:?} output arity");
        }
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ModuleKind::ALL {
            assert_eq!(ModuleKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ModuleKind::from_name("exist"), None);
    }

    #[test]
    fn test_kind_discriminants_match_column_order() {
        for (col, kind) in ModuleKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, col);
        }
    }
}
