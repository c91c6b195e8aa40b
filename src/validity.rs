/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Static structural-safety matrix for module selection.
//!
//! A module may only run when the stack pointer position leaves enough
//! entries to pop and enough headroom to push. For module `m` with input
//! arity `k_in` and output arity `k_out`:
//!
//! - minimum admissible position: `k_in` (enough below the pointer to pop);
//! - maximum admissible position: `stack_len − 1 + k_in − k_out` (the net
//!   pointer delta may not run past the stack top), clamped to the top slot.
//!
//! The matrix depends only on `stack_len` and the fixed arity table — never
//! on inputs — so it is built once per configuration and handed to the
//! external controller, which multiplies `validityᵀ · pointer` into its
//! module-selection probabilities before dispatch. Overflow and underflow
//! are thereby impossible by construction; nothing in the hot path checks
//! bounds at run time. This holds for every stack length including the
//! degenerate `stack_len = 1`, where every admissible range is empty and all
//! modules are invalid everywhere.

use heapless::Vec as HVec;

use crate::modules::{ModuleKind, NUM_MODULES};
use crate::shape::ShapeError;
use crate::stack::StackPtr;

/// Largest stack depth the validity matrix supports.
///
/// Reasoning programs are short (a handful of pushes); 16 slots is far above
/// anything a controller requests in practice.
pub const MAX_STACK_LEN: usize = 16;

/// Capacity of the flat validity matrix: `MAX_STACK_LEN × NUM_MODULES`.
pub const MAX_VALIDITY_CELLS: usize = MAX_STACK_LEN * NUM_MODULES;

/// The `(stack_len × NUM_MODULES)` {0,1} validity matrix.
///
/// Row = pointer position, column = module (in [`ModuleKind::ALL`] order).
/// Fixed-capacity storage; rebuilding is only needed when `stack_len`
/// changes.
#[derive(Clone, Debug)]
pub struct ModuleValidity {
    /// Flat row-major cells, row stride [`NUM_MODULES`].
    cells: HVec<f32, MAX_VALIDITY_CELLS>,
    /// Stack depth the matrix was built for.
    stack_len: usize,
}

impl ModuleValidity {
    /// Build the matrix for a stack of depth `stack_len`.
    pub fn build(stack_len: usize) -> Result<Self, ShapeError> {
        if stack_len == 0 {
            return Err(ShapeError::ZeroAxis { what: "stack_len" });
        }
        if stack_len > MAX_STACK_LEN {
            return Err(ShapeError::BufferLen {
                what: "stack_len (validity matrix capacity)",
                expected: MAX_STACK_LEN,
                got: stack_len,
            });
        }
        let mut cells: HVec<f32, MAX_VALIDITY_CELLS> = HVec::new();
        for _ in 0..stack_len * NUM_MODULES {
            // Capacity proven above; push cannot fail.
            let _ = cells.push(0.0);
        }
        for (col, kind) in ModuleKind::ALL.iter().enumerate() {
            let k_in = kind.input_arity() as isize;
            let k_out = kind.output_arity() as isize;
            let min_pos = k_in;
            let max_pos = (stack_len as isize - 1 + k_in - k_out).min(stack_len as isize - 1);
            let mut pos = min_pos;
            while pos <= max_pos {
                if pos >= 0 && (pos as usize) < stack_len {
                    cells[pos as usize * NUM_MODULES + col] = 1.0;
                }
                pos += 1;
            }
        }
        Ok(Self { cells, stack_len })
    }

    /// Stack depth this matrix was built for.
    pub fn stack_len(&self) -> usize {
        self.stack_len
    }

    /// Whether `kind` is structurally safe at integer pointer position `pos`.
    pub fn is_valid(&self, pos: usize, kind: ModuleKind) -> bool {
        self.cells[pos * NUM_MODULES + kind as usize] != 0.0
    }

    /// Raw matrix entry for `(pos, kind)`.
    pub fn value(&self, pos: usize, kind: ModuleKind) -> f32 {
        self.cells[pos * NUM_MODULES + kind as usize]
    }

    /// Soft validity of `kind` under the pointer distribution of batch
    /// element `b`: `Σ_s validity[s, kind] · ptr[b, s]`.
    pub fn score(&self, ptr: &StackPtr, b: usize, kind: ModuleKind) -> f32 {
        debug_assert_eq!(ptr.stack_len, self.stack_len);
        let row = &ptr.data[b * self.stack_len..(b + 1) * self.stack_len];
        let col = kind as usize;
        let mut sum = 0.0f32;
        for (s, &p) in row.iter().enumerate() {
            sum += self.cells[s * NUM_MODULES + col] * p;
        }
        sum
    }

    /// Soft validity of every module for batch element `b`.
    pub fn scores(&self, ptr: &StackPtr, b: usize) -> [f32; NUM_MODULES] {
        let mut out = [0.0f32; NUM_MODULES];
        for (col, kind) in ModuleKind::ALL.iter().enumerate() {
            out[col] = self.score(ptr, b, *kind);
        }
        out
    }

    /// Zero out structurally unsafe entries of a module-probability vector
    /// and renormalize the remainder.
    ///
    /// This is the gating the external controller applies before dispatch.
    /// When every module is masked away (possible only for degenerate
    /// configurations) the vector is left all-zero for the caller to handle.
    pub fn mask_probs(&self, ptr: &StackPtr, b: usize, probs: &mut [f32; NUM_MODULES]) {
        let scores = self.scores(ptr, b);
        let mut sum = 0.0f32;
        for (p, s) in probs.iter_mut().zip(scores.iter()) {
            *p *= s;
            sum += *p;
        }
        if sum > 0.0 {
            for p in probs.iter_mut() {
                *p /= sum;
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
