/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Transform: same-level relational hop, in place.
//!
//! The simpler sibling of Relate — one hop through the plain relation mask,
//! with edges gated by a bounded sigmoid score of the control query against
//! the edge features. The same max-clamp stabilizer bounds the result.

use alloc::vec;

use crate::linear::{Linear, ParamMap};
use crate::numeric::{clamp_norm_max, sigmoid, XorShift32};
use crate::shape::{Dims, ShapeError};
use crate::stack::EpisodeState;

use super::StepInputs;

/// The Transform operator's projection.
#[derive(Clone, Debug)]
pub struct TransformModule {
    /// Control → edge space.
    edge_proj: Linear,
}

impl TransformModule {
    /// Deterministic seeded construction.
    pub fn seeded(dims: &Dims, rng: &mut XorShift32) -> Self {
        Self {
            edge_proj: Linear::seeded(dims.hidden_dim, dims.edge_dim, rng),
        }
    }

    /// Load trained weights (`transform.edge_proj`).
    pub fn load(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.edge_proj.load(params, "transform.edge_proj")
    }

    /// Hop the current attention one step along matching edges.
    pub fn apply(
        &self,
        dims: &Dims,
        inputs: &StepInputs<'_>,
        mut state: EpisodeState,
    ) -> EpisodeState {
        let att_in = state.stack.read(&state.ptr);
        let (n_axis, g_axis, de) = (dims.concepts, dims.glimpses, dims.edge_dim);

        let mut q = vec![0.0f32; de];
        let mut att_out = att_in.clone();

        for b in 0..dims.batch {
            self.edge_proj.forward(inputs.control_row(dims, b), &mut q);

            // out[j, g] = Σ_i W[i, j] · att[i, g],
            // W[i, j] = sigmoid(⟨q, edge(i, j)⟩) · relation_mask[i, j].
            for g in 0..g_axis {
                for j in 0..n_axis {
                    att_out.data[(b * n_axis + j) * g_axis + g] = 0.0;
                }
            }
            for i in 0..n_axis {
                for j in 0..n_axis {
                    let mask = inputs.relation_mask[(b * n_axis + i) * n_axis + j];
                    if mask == 0.0 {
                        continue;
                    }
                    let edge = inputs.edge_row(dims, b, i, j);
                    let mut dot = 0.0f32;
                    for (&qd, &ed) in q.iter().zip(edge.iter()) {
                        dot += qd * ed;
                    }
                    let w = sigmoid(dot) * mask;
                    for g in 0..g_axis {
                        att_out.data[(b * n_axis + j) * g_axis + g] +=
                            w * att_in.data[(b * n_axis + i) * g_axis + g];
                    }
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

    struct Fixture {
        vision: Vec<f32>,
        feat: Vec<f32>,
        edge: Vec<f32>,
        control: Vec<f32>,
        rel: Vec<f32>,
        vis: Vec<f32>,
        lin: Vec<f32>,
        mono: Vec<f32>,
        cross: Vec<f32>,
        prop: Vec<f32>,
    }

    fn fixture(d: &Dims, rel: Vec<f32>) -> Fixture {
        Fixture {
            vision: wave(d.vision_feat_len(), 0.3),
            feat: wave(d.vision_feat_len(), 0.7),
            edge: wave(d.feat_edge_len(), 0.11),
            control: wave(d.control_len(), 1.1),
            rel,
            vis: wave(d.concept_vis_len(), 0.9),
            lin: wave(d.concept_lin_len(), 0.5),
            mono: vec![0.5; d.mono_mask_len()],
            cross: vec![0.25; d.cross_mask_len()],
            prop: wave(d.concept_property_len(), 0.2),
        }
    }

    fn run(d: &Dims, f: &Fixture) -> EpisodeState {
        let hcg = HcgBundle::new(d, &f.vis, &f.lin, &f.mono, &f.cross, &f.prop).unwrap();
        let inputs =
            StepInputs::new(d, &f.vision, &f.feat, &f.edge, &f.control, &f.rel, hcg).unwrap();
        let lib = ModuleLibrary::with_seed(*d, 31).unwrap();
        let mut state = EpisodeState::new(d);
        let mut att = state.stack.read(&state.ptr);
        for v in att.data.iter_mut() {
            *v = 1.0 / d.concepts as f32;
        }
        state.stack.write(&state.ptr, &att);
        lib.apply(ModuleKind::Transform, &inputs, state)
    }

    #[test]
    fn test_transform_bounded_and_in_place() {
        let d = dims();
        let f = fixture(&d, vec![1.0; d.relation_mask_len()]);
        let state = run(&d, &f);
        let out = state.stack.read(&state.ptr);
        // Sigmoid gate ≤ 1 and unit relation mask: the hop sums at most
        // N · (1/N) = 1 per concept, and the clamp keeps it there.
        for &v in out.data.iter() {
            assert!(v.is_finite() && (0.0..=1.0 + 1e-5).contains(&v));
        }
        assert_eq!(&state.ptr.data[..], &[1.0, 0.0, 0.0, 0.0]);
        assert!(state.mem.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_zero_relation_mask_blocks_all_hops() {
        let d = dims();
        let f = fixture(&d, vec![0.0; d.relation_mask_len()]);
        let state = run(&d, &f);
        let out = state.stack.read(&state.ptr);
        assert!(out.data.iter().all(|&v| v == 0.0));
    }
}
