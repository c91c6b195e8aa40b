/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The soft stack: fixed-depth attention storage addressed by a probability
//! distribution.
//!
//! # Mathematical specification
//!
//! With stack `A ∈ (B, N, G, S)` and pointer `p ∈ (B, S)`, `Σ_s p_s = 1`:
//!
//! **Read:** `att[b,n,g] = Σ_s A[b,n,g,s] · p[b,s]` — a weighted contraction,
//! not hard indexing.
//!
//! **Write:** `A'[b,n,g,s] = att[b,n,g] · p[b,s] + A[b,n,g,s] · (1 − p[b,s])`
//! — slots update proportionally to pointer mass, a convex blend rather than
//! an atomic replace. That is the price of differentiable push/pop.
//!
//! **Shift:** `move_forward` sends `p_s → p_{s+1}` and `move_backward` sends
//! `p_s → p_{s−1}` as an explicit shifted-array construction (the original
//! formulation is a 1-D convolution with kernel `[1,0,0]` / `[0,0,1]`;
//! building the shifted array directly is semantically identical). Mass that
//! would fall off the top (respectively the bottom) is added back at the
//! boundary slot, so pointer rows always keep summing to 1 and a one-hot
//! pointer at the boundary is a fixed point of the move.
//!
//! There is no discrete state machine here: the pointer distribution *is*
//! the machine state. It starts concentrated at slot 0 and ends wherever the
//! last operator left it; the episode's consumed output is the [`Memory`]
//! register, not the stack.

use alloc::vec;
use alloc::vec::Vec;

use crate::numeric::exp_approx;
use crate::shape::Dims;

// ─── Attention ──────────────────────────────────────────────────────────────

/// One attention map over concepts per glimpse: `(B, N, G)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Attention {
    /// Flat `(B, N, G)` buffer, index `(b·N + n)·G + g`.
    pub data: Vec<f32>,
    /// Batch size.
    pub batch: usize,
    /// Concept count.
    pub concepts: usize,
    /// Glimpse count.
    pub glimpses: usize,
}

impl Attention {
    /// All-zero attention for the given dims.
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            data: vec![0.0; dims.attention_len()],
            batch: dims.batch,
            concepts: dims.concepts,
            glimpses: dims.glimpses,
        }
    }

    /// Flat index of `(b, n, g)`.
    #[inline]
    pub fn idx(&self, b: usize, n: usize, g: usize) -> usize {
        (b * self.concepts + n) * self.glimpses + g
    }

    /// Elementwise minimum with another map, in place (logical conjunction
    /// of two attention distributions — the And operator's kernel).
    pub fn min_assign(&mut self, other: &Attention) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            if b < *a {
                *a = b;
            }
        }
    }
}

// ─── AttStack ───────────────────────────────────────────────────────────────

/// Fixed-depth, fixed-width storage for attention maps: `(B, N, G, S)`.
///
/// Zero-initialised at the start of a reasoning episode, mutated only through
/// [`AttStack::write`], discarded at episode end.
#[derive(Clone, Debug, PartialEq)]
pub struct AttStack {
    /// Flat `(B, N, G, S)` buffer, index `((b·N + n)·G + g)·S + s`.
    pub data: Vec<f32>,
    /// Batch size.
    pub batch: usize,
    /// Concept count.
    pub concepts: usize,
    /// Glimpse count.
    pub glimpses: usize,
    /// Stack depth.
    pub stack_len: usize,
}

impl AttStack {
    /// All-zero stack for the given dims.
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            data: vec![0.0; dims.att_stack_len()],
            batch: dims.batch,
            concepts: dims.concepts,
            glimpses: dims.glimpses,
            stack_len: dims.stack_len,
        }
    }

    /// Read the attention at the pointer: contraction of the slot axis
    /// against the pointer distribution.
    pub fn read(&self, ptr: &StackPtr) -> Attention {
        debug_assert_eq!(ptr.batch, self.batch);
        let (n_axis, g_axis, s_axis) = (self.concepts, self.glimpses, self.stack_len);
        let mut att = Attention {
            data: vec![0.0; self.batch * n_axis * g_axis],
            batch: self.batch,
            concepts: n_axis,
            glimpses: g_axis,
        };
        for b in 0..self.batch {
            let p_row = &ptr.data[b * s_axis..(b + 1) * s_axis];
            for n in 0..n_axis {
                for g in 0..g_axis {
                    let base = ((b * n_axis + n) * g_axis + g) * s_axis;
                    let mut sum = 0.0f32;
                    for (s, &p) in p_row.iter().enumerate() {
                        sum += self.data[base + s] * p;
                    }
                    att.data[(b * n_axis + n) * g_axis + g] = sum;
                }
            }
        }
        att
    }

    /// Write `att` at the pointer: per-slot convex blend
    /// `A' = att ⊗ p + A ⊗ (1 − p)`.
    pub fn write(&mut self, ptr: &StackPtr, att: &Attention) {
        debug_assert_eq!(ptr.batch, self.batch);
        debug_assert_eq!(att.data.len(), self.batch * self.concepts * self.glimpses);
        let (n_axis, g_axis, s_axis) = (self.concepts, self.glimpses, self.stack_len);
        for b in 0..self.batch {
            let p_row = &ptr.data[b * s_axis..(b + 1) * s_axis];
            for n in 0..n_axis {
                for g in 0..g_axis {
                    let v = att.data[(b * n_axis + n) * g_axis + g];
                    let base = ((b * n_axis + n) * g_axis + g) * s_axis;
                    for (s, &p) in p_row.iter().enumerate() {
                        let old = self.data[base + s];
                        self.data[base + s] = v * p + old * (1.0 - p);
                    }
                }
            }
        }
    }
}

// ─── StackPtr ───────────────────────────────────────────────────────────────

/// Soft stack pointer: one probability distribution over slots per batch
/// element, `(B, S)`. Rows are non-negative and sum to 1 at all times.
#[derive(Clone, Debug, PartialEq)]
pub struct StackPtr {
    /// Flat `(B, S)` buffer, row stride `S`.
    pub data: Vec<f32>,
    /// Batch size.
    pub batch: usize,
    /// Stack depth.
    pub stack_len: usize,
}

/// Softmax temperature used by the soft sharpening path.
pub const SHARPEN_TEMPERATURE: f32 = 0.1;

impl StackPtr {
    /// Pointer concentrated at slot 0 (the episode's initial state).
    pub fn at_base(dims: &Dims) -> Self {
        let mut data = vec![0.0; dims.stack_ptr_len()];
        for b in 0..dims.batch {
            data[b * dims.stack_len] = 1.0;
        }
        Self {
            data,
            batch: dims.batch,
            stack_len: dims.stack_len,
        }
    }

    /// Move the pointer forward by one slot (push direction).
    ///
    /// Mass at the top slot stays at the top slot; without that clamp a
    /// pointer at the top would shift to all-zero and lose its mass.
    pub fn move_forward(&mut self) {
        let s_axis = self.stack_len;
        let mut shifted = vec![0.0f32; s_axis];
        for b in 0..self.batch {
            let row = &mut self.data[b * s_axis..(b + 1) * s_axis];
            shifted[0] = 0.0;
            for s in 1..s_axis {
                shifted[s] = row[s - 1];
            }
            shifted[s_axis - 1] += row[s_axis - 1];
            row.copy_from_slice(&shifted);
        }
    }

    /// Move the pointer backward by one slot (pop direction).
    ///
    /// Symmetric boundary rule: mass at slot 0 stays at slot 0.
    pub fn move_backward(&mut self) {
        let s_axis = self.stack_len;
        let mut shifted = vec![0.0f32; s_axis];
        for b in 0..self.batch {
            let row = &mut self.data[b * s_axis..(b + 1) * s_axis];
            for s in 0..s_axis - 1 {
                shifted[s] = row[s + 1];
            }
            shifted[s_axis - 1] = 0.0;
            shifted[0] += row[0];
            row.copy_from_slice(&shifted);
        }
    }

    /// Soft sharpening: softmax of the row at [`SHARPEN_TEMPERATURE`],
    /// pulling a smeared pointer toward (nearly) one-hot while staying
    /// differentiable.
    pub fn sharpen_soft(&mut self) {
        let s_axis = self.stack_len;
        for b in 0..self.batch {
            let row = &mut self.data[b * s_axis..(b + 1) * s_axis];
            let mut max = f32::MIN;
            for &v in row.iter() {
                if v > max {
                    max = v;
                }
            }
            let mut sum = 0.0f32;
            for v in row.iter_mut() {
                *v = exp_approx((*v - max) / SHARPEN_TEMPERATURE);
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
    }

    /// Hard sharpening: exact one-hot at the argmax slot (first maximum on
    /// ties). Non-differentiable; for hard-execution evaluation only.
    pub fn sharpen_hard(&mut self) {
        let s_axis = self.stack_len;
        for b in 0..self.batch {
            let row = &mut self.data[b * s_axis..(b + 1) * s_axis];
            let mut best = 0usize;
            for (s, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = s;
                }
            }
            for (s, v) in row.iter_mut().enumerate() {
                *v = if s == best { 1.0 } else { 0.0 };
            }
        }
    }

    /// Sum of one pointer row (1.0 within tolerance for any valid pointer).
    pub fn row_sum(&self, b: usize) -> f32 {
        self.data[b * self.stack_len..(b + 1) * self.stack_len]
            .iter()
            .sum()
    }
}

// ─── Memory ─────────────────────────────────────────────────────────────────

/// Transient per-step output register, `(B, G·Dv)`.
///
/// Each operator either leaves it unchanged (NoOp), zeroes it (every
/// stack-writing operator), or writes a freshly computed readout (Describe).
#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    /// Flat `(B, G·Dv)` buffer.
    pub data: Vec<f32>,
    /// Batch size.
    pub batch: usize,
    /// Row width `G·Dv`.
    pub width: usize,
}

impl Memory {
    /// All-zero memory for the given dims.
    pub fn zeros(dims: &Dims) -> Self {
        Self {
            data: vec![0.0; dims.memory_len()],
            batch: dims.batch,
            width: dims.glimpses * dims.vision_dim,
        }
    }

    /// Reset every entry to zero.
    pub fn clear(&mut self) {
        for v in self.data.iter_mut() {
            *v = 0.0;
        }
    }
}

// ─── EpisodeState ───────────────────────────────────────────────────────────

/// The stack/pointer/memory triple threaded through every operator call.
///
/// Passed by value and returned by each call — an explicit value-type episode
/// state with no hidden aliasing. Ownership of the stack during one operator
/// invocation is exclusive; the updated state is handed back to the
/// controller afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeState {
    /// The attention stack.
    pub stack: AttStack,
    /// The soft pointer.
    pub ptr: StackPtr,
    /// The memory register.
    pub mem: Memory,
}

impl EpisodeState {
    /// Fresh episode: zero stack, pointer at slot 0, zero memory.
    pub fn new(dims: &Dims) -> Self {
        Self {
            stack: AttStack::zeros(dims),
            ptr: StackPtr::at_base(dims),
            mem: Memory::zeros(dims),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dims {
        Dims {
            batch: 2,
            concepts: 3,
            glimpses: 2,
            stack_len: 4,
            vision_dim: 4,
            hidden_dim: 2,
            edge_dim: 2,
            concept_vis_dim: 2,
            concept_lin_dim: 2,
            property_num: 1,
            property_dim: 2,
        }
    }

    fn assert_rows_sum_to_one(ptr: &StackPtr) {
        for b in 0..ptr.batch {
            let sum = ptr.row_sum(b);
            assert!((sum - 1.0).abs() < 1e-5, "row {b} sums to {sum}");
        }
    }

    #[test]
    fn test_pointer_starts_at_base() {
        let ptr = StackPtr::at_base(&dims());
        assert_rows_sum_to_one(&ptr);
        for b in 0..2 {
            assert_eq!(ptr.data[b * 4], 1.0);
        }
    }

    #[test]
    fn test_moves_preserve_row_sums() {
        let mut ptr = StackPtr::at_base(&dims());
        // Smear the pointer to a non-trivial distribution first.
        ptr.data[0..4].copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        ptr.data[4..8].copy_from_slice(&[0.4, 0.3, 0.2, 0.1]);
        ptr.move_forward();
        assert_rows_sum_to_one(&ptr);
        ptr.move_backward();
        assert_rows_sum_to_one(&ptr);
    }

    #[test]
    fn test_move_forward_shifts_by_one() {
        let mut ptr = StackPtr::at_base(&dims());
        ptr.move_forward();
        assert_eq!(&ptr.data[0..4], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_move_forward_noop_at_top() {
        let mut ptr = StackPtr::at_base(&dims());
        for _ in 0..3 {
            ptr.move_forward();
        }
        assert_eq!(&ptr.data[0..4], &[0.0, 0.0, 0.0, 1.0]);
        ptr.move_forward(); // already at top: fixed point
        assert_eq!(&ptr.data[0..4], &[0.0, 0.0, 0.0, 1.0]);
        assert_rows_sum_to_one(&ptr);
    }

    #[test]
    fn test_move_backward_noop_at_base() {
        let mut ptr = StackPtr::at_base(&dims());
        ptr.move_backward(); // already at bottom: fixed point
        assert_eq!(&ptr.data[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_rows_sum_to_one(&ptr);
    }

    #[test]
    fn test_write_then_read_round_trip_one_hot() {
        let d = dims();
        let mut stack = AttStack::zeros(&d);
        let mut ptr = StackPtr::at_base(&d);
        ptr.move_forward();

        let mut att = Attention::zeros(&d);
        for (i, v) in att.data.iter_mut().enumerate() {
            *v = 0.01 * i as f32;
        }
        stack.write(&ptr, &att);
        let back = stack.read(&ptr);
        for (got, want) in back.data.iter().zip(att.data.iter()) {
            assert!((got - want).abs() < 1e-6, "round trip: {got} != {want}");
        }
    }

    #[test]
    fn test_write_leaves_other_slots_untouched_for_one_hot() {
        let d = dims();
        let mut stack = AttStack::zeros(&d);
        let base_ptr = StackPtr::at_base(&d);
        let mut ones = Attention::zeros(&d);
        for v in ones.data.iter_mut() {
            *v = 1.0;
        }
        stack.write(&base_ptr, &ones);

        let mut above = base_ptr.clone();
        above.move_forward();
        let read_above = stack.read(&above);
        assert!(read_above.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_soft_write_blends_by_pointer_mass() {
        let d = Dims { batch: 1, ..dims() };
        let mut stack = AttStack::zeros(&d);
        let mut ptr = StackPtr::at_base(&d);
        ptr.data.copy_from_slice(&[0.5, 0.5, 0.0, 0.0]);

        let mut ones = Attention::zeros(&d);
        for v in ones.data.iter_mut() {
            *v = 1.0;
        }
        stack.write(&ptr, &ones);
        // Slot 0 and 1 each got half the mass.
        assert!((stack.data[0] - 0.5).abs() < 1e-6);
        assert!((stack.data[1] - 0.5).abs() < 1e-6);
        assert_eq!(stack.data[2], 0.0);
    }

    #[test]
    fn test_sharpen_soft_concentrates_and_normalizes() {
        let d = Dims { batch: 1, ..dims() };
        let mut ptr = StackPtr::at_base(&d);
        ptr.data.copy_from_slice(&[0.1, 0.6, 0.2, 0.1]);
        ptr.sharpen_soft();
        assert_rows_sum_to_one(&ptr);
        assert!(ptr.data[1] > 0.9, "dominant slot should concentrate: {:?}", ptr.data);
    }

    #[test]
    fn test_sharpen_hard_is_one_hot() {
        let d = Dims { batch: 1, ..dims() };
        let mut ptr = StackPtr::at_base(&d);
        ptr.data.copy_from_slice(&[0.3, 0.3, 0.39, 0.01]);
        ptr.sharpen_hard();
        assert_eq!(&ptr.data[..], &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_episode_state_initialisation() {
        let d = dims();
        let state = EpisodeState::new(&d);
        assert!(state.stack.data.iter().all(|&v| v == 0.0));
        assert!(state.mem.data.iter().all(|&v| v == 0.0));
        assert_rows_sum_to_one(&state.ptr);
    }
}
