/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Filter: property-weighted masking of the current attention, in place.
//!
//! A per-concept weight is computed by fusing the vision-space query against
//! the region features; a property relevance score gates it against the
//! concept's attributed properties; the combined weight is then attenuated
//! through a depth-decayed cross-level mask (multiplicative decay unrolled
//! [`NUM_LAYERS`] times at rate [`DECAY_RATE`], modelling how relational
//! influence fades across hierarchy hops). The resulting per-concept scale
//! multiplies the attention read from the stack, and the product is written
//! back at the same pointer. Memory is zeroed.
//!
//! [`DECAY_RATE`]: crate::DECAY_RATE
//! [`NUM_LAYERS`]: crate::NUM_LAYERS

use alloc::vec;

use crate::fusion::fuse_into;
use crate::linear::{Linear, ParamMap};
use crate::numeric::{sigmoid, XorShift32};
use crate::shape::{Dims, ShapeError};
use crate::stack::EpisodeState;
use crate::{DECAY_RATE, NUM_LAYERS};

use super::StepInputs;

/// The Filter operator's projections.
#[derive(Clone, Debug)]
pub struct FilterModule {
    /// Control → vision space (fused against region features).
    vision_proj: Linear,
    /// Fused region feature → scalar relation weight.
    weight_proj: Linear,
    /// Control → property space (scored against `concept_property`).
    property_proj: Linear,
}

impl FilterModule {
    /// Deterministic seeded construction.
    pub fn seeded(dims: &Dims, rng: &mut XorShift32) -> Self {
        Self {
            vision_proj: Linear::seeded(dims.hidden_dim, dims.vision_dim, rng),
            weight_proj: Linear::seeded(dims.vision_dim, 1, rng),
            property_proj: Linear::seeded(dims.hidden_dim, dims.property_dim, rng),
        }
    }

    /// Load trained weights (`filter.vision_proj`, `filter.weight_proj`,
    /// `filter.property_proj`).
    pub fn load(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.vision_proj.load(params, "filter.vision_proj")?;
        self.weight_proj.load(params, "filter.weight_proj")?;
        self.property_proj.load(params, "filter.property_proj")?;
        Ok(())
    }

    /// Mask the current attention in place.
    pub fn apply(
        &self,
        dims: &Dims,
        inputs: &StepInputs<'_>,
        mut state: EpisodeState,
    ) -> EpisodeState {
        let att_in = state.stack.read(&state.ptr);
        let (n_axis, g_axis) = (dims.concepts, dims.glimpses);
        let (dv, dp, p_axis) = (dims.vision_dim, dims.property_dim, dims.property_num);

        let mut q_vis = vec![0.0f32; dv];
        let mut q_prop = vec![0.0f32; dp];
        let mut fused = vec![0.0f32; dv];
        let mut prop_mean = vec![0.0f32; dp];
        let mut combined = vec![0.0f32; n_axis];
        let mut scale = vec![0.0f32; n_axis];
        let mut att_out = att_in.clone();

        for b in 0..dims.batch {
            self.vision_proj.forward(inputs.control_row(dims, b), &mut q_vis);
            self.property_proj.forward(inputs.control_row(dims, b), &mut q_prop);

            for n in 0..n_axis {
                // Relation weight from the fused region feature.
                fuse_into(&mut fused, &q_vis, inputs.feat_row(dims, b, n));
                let mut w = [0.0f32];
                self.weight_proj.forward(&fused, &mut w);

                // Property relevance: bounded score of the query against the
                // concept's mean property embedding.
                for v in prop_mean.iter_mut() {
                    *v = 0.0;
                }
                let prop_base = ((b * n_axis + n) * p_axis) * dp;
                for p in 0..p_axis {
                    let row = &inputs.hcg.concept_property[prop_base + p * dp..][..dp];
                    for (acc, &v) in prop_mean.iter_mut().zip(row.iter()) {
                        *acc += v;
                    }
                }
                let mut dot = 0.0f32;
                for (&q, &v) in q_prop.iter().zip(prop_mean.iter()) {
                    dot += q * v / p_axis as f32;
                }
                combined[n] = w[0] * sigmoid(dot / dp as f32);
            }

            // Depth-decayed cross-level attenuation:
            // D = r·C, then D ← D ⊙ (1 + r·C) for NUM_LAYERS hops.
            for n in 0..n_axis {
                let mut sum = 0.0f32;
                for m in 0..n_axis {
                    let c = inputs.hcg.cross(dims, b, n, m);
                    let mut d = DECAY_RATE * c;
                    for _ in 0..NUM_LAYERS {
                        d *= 1.0 + DECAY_RATE * c;
                    }
                    sum += d * combined[m];
                }
                scale[n] = sum;
            }

            for n in 0..n_axis {
                for g in 0..g_axis {
                    let i = (b * n_axis + n) * g_axis + g;
                    att_out.data[i] = att_in.data[i] * scale[n];
                }
            }
        }

        state.stack.write(&state.ptr, &att_out);
        state.mem.clear();
        state
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
