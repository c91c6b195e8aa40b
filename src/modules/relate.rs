/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Relate: hierarchy-aware relational hop, in place.
//!
//! Attention mass moves along edges whose features match the control query,
//! gated by the intra-level (mono) relation mask, then propagates one step
//! through the cross-level mask so that parents light up when their children
//! do. Repeated hops would otherwise grow attention without bound, so the
//! result passes through the max-clamp stabilizer before the write.

use alloc::vec;

use crate::fusion::fuse_into;
use crate::linear::{Linear, ParamMap};
use crate::numeric::{clamp_norm_max, XorShift32};
use crate::shape::{Dims, ShapeError};
use crate::stack::EpisodeState;

use super::StepInputs;

/// The Relate operator's projections.
#[derive(Clone, Debug)]
pub struct RelateModule {
    /// Control → edge space.
    edge_proj: Linear,
    /// Gated edge feature → scalar transition weight.
    weight_proj: Linear,
}

impl RelateModule {
    /// Deterministic seeded construction.
    pub fn seeded(dims: &Dims, rng: &mut XorShift32) -> Self {
        Self {
            edge_proj: Linear::seeded(dims.hidden_dim, dims.edge_dim, rng),
            weight_proj: Linear::seeded(dims.edge_dim, 1, rng),
        }
    }

    /// Load trained weights (`relate.edge_proj`, `relate.weight_proj`).
    pub fn load(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.edge_proj.load(params, "relate.edge_proj")?;
        self.weight_proj.load(params, "relate.weight_proj")?;
        Ok(())
    }

    /// Hop the current attention through the gated relation structure.
    pub fn apply(
        &self,
        dims: &Dims,
        inputs: &StepInputs<'_>,
        mut state: EpisodeState,
    ) -> EpisodeState {
        let att_in = state.stack.read(&state.ptr);
        let (n_axis, g_axis, de) = (dims.concepts, dims.glimpses, dims.edge_dim);

        let mut q = vec![0.0f32; de];
        let mut gated = vec![0.0f32; de];
        let mut trans = vec![0.0f32; n_axis * n_axis];
        let mut hopped = vec![0.0f32; n_axis * g_axis];
        let mut att_out = att_in.clone();

        for b in 0..dims.batch {
            self.edge_proj.forward(inputs.control_row(dims, b), &mut q);

            // Transition matrix: fuse(q, edge) ⊙ mono, collapsed over De.
            for i in 0..n_axis {
                for j in 0..n_axis {
                    let edge = inputs.edge_row(dims, b, i, j);
                    let mono_base = ((b * n_axis + i) * n_axis + j) * de;
                    let mono = &inputs.hcg.mono_mask[mono_base..mono_base + de];
                    fuse_into(&mut gated, &q, edge);
                    for (g, &m) in gated.iter_mut().zip(mono.iter()) {
                        *g *= m;
                    }
                    let mut w = [0.0f32];
                    self.weight_proj.forward(&gated, &mut w);
                    trans[i * n_axis + j] = w[0];
                }
            }

            // hopped[j, g] = Σ_i trans[i, j] · att[i, g]
            for v in hopped.iter_mut() {
                *v = 0.0;
            }
            for i in 0..n_axis {
                for j in 0..n_axis {
                    let w = trans[i * n_axis + j];
                    if w == 0.0 {
                        continue;
                    }
                    for g in 0..g_axis {
                        hopped[j * g_axis + g] +=
                            w * att_in.data[(b * n_axis + i) * g_axis + g];
                    }
                }
            }

            // Second hop through the cross-level structure:
            // out[n, g] = Σ_j cross[j, n] · hopped[j, g]
            for n in 0..n_axis {
                for g in 0..g_axis {
                    let mut sum = 0.0f32;
                    for j in 0..n_axis {
                        sum += inputs.hcg.cross(dims, b, j, n) * hopped[j * g_axis + g];
                    }
                    att_out.data[(b * n_axis + n) * g_axis + g] = sum;
                }
            }
        }

        clamp_norm_max(&mut att_out.data, dims.batch, n_axis, g_axis);
        state.stack.write(&state.ptr, &att_out);
        state.mem.clear();
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
            batch: 1,
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
    fn test_relate_output_clamped_to_unit() {
        let d = dims();
        let vision = wave(d.vision_feat_len(), 0.3);
        let feat = wave(d.vision_feat_len(), 0.7);
        // Large edge features and dense masks push the raw hop well above 1;
        // the stabilizer must pull the maximum back to exactly 1.
        let edge = vec![3.0f32; d.feat_edge_len()];
        let control = wave(d.control_len(), 1.1);
        let rel = vec![1.0f32; d.relation_mask_len()];
        let vis = wave(d.concept_vis_len(), 0.9);
        let lin = wave(d.concept_lin_len(), 0.5);
        let mono = vec![1.0f32; d.mono_mask_len()];
        let cross = vec![1.0f32; d.cross_mask_len()];
        let prop = wave(d.concept_property_len(), 0.2);
        let hcg = HcgBundle::new(&d, &vis, &lin, &mono, &cross, &prop).unwrap();
        let inputs = StepInputs::new(&d, &vision, &feat, &edge, &control, &rel, hcg).unwrap();

        let lib = ModuleLibrary::with_seed(d, 7).unwrap();
        let mut state = EpisodeState::new(&d);
        // Seed a uniform attention on the current slot so the hop has mass.
        let mut att = state.stack.read(&state.ptr);
        for v in att.data.iter_mut() {
            *v = 1.0 / d.concepts as f32;
        }
        state.stack.write(&state.ptr, &att);

        let state = lib.apply(ModuleKind::Relate, &inputs, state);
        let out = state.stack.read(&state.ptr);
        let max = out.data.iter().cloned().fold(f32::MIN, f32::max);
        assert!(out.data.iter().all(|v| v.is_finite()));
        assert!(max <= 1.0 + 1e-5, "relate output max = {max}");
        // Pointer stays put: Relate is an in-place operator.
        assert_eq!(&state.ptr.data[..], &[1.0, 0.0, 0.0, 0.0]);
        // Memory zeroed.
        assert!(state.mem.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_relate_zero_mono_mask_kills_attention() {
        let d = dims();
        let vision = wave(d.vision_feat_len(), 0.3);
        let feat = wave(d.vision_feat_len(), 0.7);
        let edge = wave(d.feat_edge_len(), 0.11);
        let control = wave(d.control_len(), 1.1);
        let rel = vec![1.0f32; d.relation_mask_len()];
        let vis = wave(d.concept_vis_len(), 0.9);
        let lin = wave(d.concept_lin_len(), 0.5);
        let mono = vec![0.0f32; d.mono_mask_len()];
        let cross = vec![1.0f32; d.cross_mask_len()];
        let prop = wave(d.concept_property_len(), 0.2);
        let hcg = HcgBundle::new(&d, &vis, &lin, &mono, &cross, &prop).unwrap();
        let inputs = StepInputs::new(&d, &vision, &feat, &edge, &control, &rel, hcg).unwrap();

        // Zero the weight bias so a zero mono mask yields a zero transition.
        let mut lib = ModuleLibrary::with_seed(d, 7).unwrap();
        let mut params = crate::linear::ParamMap::new();
        params.insert("relate.weight_proj.weight", vec![0.4, -0.2]);
        params.insert("relate.weight_proj.bias", vec![0.0]);
        lib.relate.weight_proj.load(&params, "relate.weight_proj").unwrap();

        let mut state = EpisodeState::new(&d);
        let mut att = state.stack.read(&state.ptr);
        for v in att.data.iter_mut() {
            *v = 0.5;
        }
        state.stack.write(&state.ptr, &att);

        let state = lib.apply(ModuleKind::Relate, &inputs, state);
        let out = state.stack.read(&state.ptr);
        assert!(out.data.iter().all(|&v| v == 0.0));
    }
}
