/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Describe: terminal readout into the memory register.
//!
//! The only operator that produces an answer signal. The current attention is
//! reweighted by a question-conditioned concept softmax (the same
//! query-prefixed fusion Find uses), then contracted against the raw vision
//! features into `(B, G·Dv)` memory rows. Stack and pointer pass through
//! untouched, so a controller may describe mid-program without losing the
//! partial result below.

use alloc::vec;

use crate::linear::{Linear, ParamMap};
use crate::numeric::{softmax_concepts, XorShift32};
use crate::shape::{Dims, ShapeError};
use crate::stack::EpisodeState;

use super::{query_prefixed_logits, StepInputs};

/// The Describe operator's projections.
#[derive(Clone, Debug)]
pub struct DescribeModule {
    /// Control → vision space.
    query_proj: Linear,
    /// Fused features → per-glimpse logits.
    logit_proj: Linear,
}

impl DescribeModule {
    /// Deterministic seeded construction.
    pub fn seeded(dims: &Dims, rng: &mut XorShift32) -> Self {
        Self {
            query_proj: Linear::seeded(dims.hidden_dim, dims.vision_dim, rng),
            logit_proj: Linear::seeded(dims.vision_dim, dims.glimpses, rng),
        }
    }

    /// Load trained weights (`describe.query_proj`, `describe.logit_proj`).
    pub fn load(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.query_proj.load(params, "describe.query_proj")?;
        self.logit_proj.load(params, "describe.logit_proj")?;
        Ok(())
    }

    /// Contract the current attention against the vision features.
    pub fn apply(
        &self,
        dims: &Dims,
        inputs: &StepInputs<'_>,
        mut state: EpisodeState,
    ) -> EpisodeState {
        let att = state.stack.read(&state.ptr);
        let (n_axis, g_axis, dv) = (dims.concepts, dims.glimpses, dims.vision_dim);

        let mut weights = vec![0.0f32; dims.attention_len()];
        query_prefixed_logits(dims, inputs, &self.query_proj, &self.logit_proj, &mut weights);
        softmax_concepts(&mut weights, dims.batch, n_axis, g_axis);

        // mem[b, g·Dv + d] = Σ_n (att ⊙ w)[b, n, g] · vision_feat[b, n, d]
        for b in 0..dims.batch {
            let mem_row = &mut state.mem.data[b * g_axis * dv..(b + 1) * g_axis * dv];
            for v in mem_row.iter_mut() {
                *v = 0.0;
            }
            for n in 0..n_axis {
                let vision = &inputs.vision_feat[(b * n_axis + n) * dv..][..dv];
                for g in 0..g_axis {
                    let i = (b * n_axis + n) * g_axis + g;
                    let scale = att.data[i] * weights[i];
                    if scale == 0.0 {
                        continue;
                    }
                    for d in 0..dv {
                        mem_row[g * dv + d] += scale * vision[d];
                    }
                }
            }
        }
        state
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcg::HcgBundle;
    use crate::modules::{ModuleKind, ModuleLibrary};
    use alloc::vec::Vec;

    fn dims() -> Dims {
        Dims {
            batch: 2,
            concepts: 3,
            glimpses: 2,
            stack_len: 4,
            vision_dim: 4,
            hidden_dim: 3,
            edge_dim: 2,
            concept_vis_dim: 2,
            concept_lin_dim: 2,
            property_num: 2,
            property_dim: 2,
        }
    }

    fn wave(len: usize, k: f32) -> Vec<f32> {
        (0..len).map(|i| ((i as f32) * k).sin() * 0.5).collect()
    }

    #[test]
    fn test_describe_fills_memory_and_leaves_stack_alone() {
        let d = dims();
        let vision = wave(d.vision_feat_len(), 0.3);
        let feat = wave(d.vision_feat_len(), 0.7);
        let edge = wave(d.feat_edge_len(), 0.11);
        let control = wave(d.control_len(), 1.3);
        let rel = vec![1.0f32; d.relation_mask_len()];
        let vis = wave(d.concept_vis_len(), 0.9);
        let lin = wave(d.concept_lin_len(), 0.5);
        let mono = vec![0.5f32; d.mono_mask_len()];
        let cross = vec![0.25f32; d.cross_mask_len()];
        let prop = wave(d.concept_property_len(), 0.2);
        let hcg = HcgBundle::new(&d, &vis, &lin, &mono, &cross, &prop).unwrap();
        let inputs = StepInputs::new(&d, &vision, &feat, &edge, &control, &rel, hcg).unwrap();

        let lib = ModuleLibrary::with_seed(d, 13).unwrap();
        let mut state = EpisodeState::new(&d);
        state.ptr.move_forward();
        let mut att = state.stack.read(&state.ptr);
        for v in att.data.iter_mut() {
            *v = 0.5;
        }
        state.stack.write(&state.ptr, &att);

        let stack_before = state.stack.data.clone();
        let ptr_before = state.ptr.data.clone();
        let state = lib.apply(ModuleKind::Describe, &inputs, state);

        assert_eq!(state.stack.data, stack_before);
        assert_eq!(state.ptr.data, ptr_before);
        assert_eq!(state.mem.data.len(), d.memory_len());
        assert!(state.mem.data.iter().all(|v| v.is_finite()));
        assert!(state.mem.data.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_describe_zero_attention_reads_zero_memory() {
        let d = dims();
        let vision = wave(d.vision_feat_len(), 0.3);
        let feat = wave(d.vision_feat_len(), 0.7);
        let edge = wave(d.feat_edge_len(), 0.11);
        let control = wave(d.control_len(), 1.3);
        let rel = vec![1.0f32; d.relation_mask_len()];
        let vis = wave(d.concept_vis_len(), 0.9);
        let lin = wave(d.concept_lin_len(), 0.5);
        let mono = vec![0.5f32; d.mono_mask_len()];
        let cross = vec![0.25f32; d.cross_mask_len()];
        let prop = wave(d.concept_property_len(), 0.2);
        let hcg = HcgBundle::new(&d, &vis, &lin, &mono, &cross, &prop).unwrap();
        let inputs = StepInputs::new(&d, &vision, &feat, &edge, &control, &rel, hcg).unwrap();

        let lib = ModuleLibrary::with_seed(d, 13).unwrap();
        let mut state = EpisodeState::new(&d);
        state.mem.data[0] = 7.0; // must be overwritten, not accumulated
        let state = lib.apply(ModuleKind::Describe, &inputs, state);
        assert!(state.mem.data.iter().all(|&v| v == 0.0));
    }
}
