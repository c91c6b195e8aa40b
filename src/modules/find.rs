/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Find: push a fresh concept attention grounded in the question.
//!
//! The only operator with input arity 0 — it needs nothing on the stack.
//! The control vector is projected into vision space, fused against the
//! query-prefixed region sequence and the concept embeddings, mapped to
//! per-concept/per-glimpse logits, softmaxed over concepts, then propagated
//! one hop through the intra-level (mono) relation structure before being
//! pushed. Memory is reset to zero.

use alloc::vec;

use crate::linear::{Linear, ParamMap};
use crate::numeric::{softmax_concepts, XorShift32};
use crate::shape::{Dims, ShapeError};
use crate::stack::{Attention, EpisodeState};

use super::{query_prefixed_logits, StepInputs};

/// The Find operator's projections.
#[derive(Clone, Debug)]
pub struct FindModule {
    /// Control → vision space.
    query_proj: Linear,
    /// Fused features → per-glimpse logits.
    logit_proj: Linear,
}

impl FindModule {
    /// Deterministic seeded construction.
    pub fn seeded(dims: &Dims, rng: &mut XorShift32) -> Self {
        Self {
            query_proj: Linear::seeded(dims.hidden_dim, dims.vision_dim, rng),
            logit_proj: Linear::seeded(dims.vision_dim, dims.glimpses, rng),
        }
    }

    /// Load trained weights (`find.query_proj`, `find.logit_proj`).
    pub fn load(&mut self, params: &ParamMap) -> Result<(), ShapeError> {
        self.query_proj.load(params, "find.query_proj")?;
        self.logit_proj.load(params, "find.logit_proj")?;
        Ok(())
    }

    /// Compute the attention and push it (move forward, then write).
    pub fn apply(
        &self,
        dims: &Dims,
        inputs: &StepInputs<'_>,
        mut state: EpisodeState,
    ) -> EpisodeState {
        let mut att = Attention::zeros(dims);
        query_prefixed_logits(dims, inputs, &self.query_proj, &self.logit_proj, &mut att.data);
        softmax_concepts(&mut att.data, dims.batch, dims.concepts, dims.glimpses);

        // One hop through the mono relation, gated by the pre-hop attention:
        // out[n] = (Σ_m mono[n,m] · att[m]) · att[n].
        let (n_axis, g_axis) = (dims.concepts, dims.glimpses);
        let mut hopped = vec![0.0f32; att.data.len()];
        for b in 0..dims.batch {
            for n in 0..n_axis {
                for g in 0..g_axis {
                    let mut sum = 0.0f32;
                    for m in 0..n_axis {
                        sum += inputs.hcg.mono_mean(dims, b, n, m)
                            * att.data[(b * n_axis + m) * g_axis + g];
                    }
                    let i = (b * n_axis + n) * g_axis + g;
                    hopped[i] = sum * att.data[i];
                }
            }
        }
        att.data.copy_from_slice(&hopped);

        state.ptr.move_forward();
        state.stack.write(&state.ptr, &att);
        state.mem.clear();
        state
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
