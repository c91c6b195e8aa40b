//! HCG_SEG — portable snapshot of an episode state for persistence and
//! transport.
//!
//! A reasoning episode may be suspended between controller steps (long
//! multi-hop programs, distributed inference, debugging). The snapshot
//! captures the full `(stack, pointer, memory)` triple plus the sizing
//! header needed to validate it on restore. Only state is stored — the HCG
//! bundle and step inputs are owned by the surrounding system and re-supplied
//! on resume.
//!
//! # no_std
//!
//! This module requires the `serde` feature. It uses `alloc::vec::Vec` and is
//! compatible with no_std + alloc environments.

extern crate alloc;

use alloc::vec::Vec;

use crate::shape::{expect_len, Dims, ShapeError};
use crate::stack::{AttStack, EpisodeState, Memory, StackPtr};

/// Magic bytes identifying an HCG_SEG blob: "HCGS".
pub const HCG_SEG_MAGIC: u32 = 0x48_43_47_53;

/// Current HCG_SEG format version.
pub const HCG_SEG_VERSION: u16 = 1;

/// A serializable snapshot of an [`EpisodeState`].
///
/// Restoring validates every buffer against the recorded dims, so a snapshot
/// truncated or edited in transit fails fast instead of producing a
/// mis-shaped machine.
///
/// # Example
///
/// ```rust,ignore
/// use hcg_core::snapshot::EpisodeSnapshot;
///
/// let snapshot = EpisodeSnapshot::from_state(&dims, &state);
/// let json = serde_json::to_string(&snapshot).unwrap();
/// let restored: EpisodeSnapshot = serde_json::from_str(&json).unwrap();
/// let state = restored.restore().unwrap();
/// ```
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct EpisodeSnapshot {
    /// Format version — always [`HCG_SEG_VERSION`] for newly created
    /// snapshots.
    pub version: u16,
    /// Sizing header the buffers are validated against on restore.
    pub dims: DimsRecord,
    /// Flat `(B, N, G, S)` attention stack.
    pub stack: Vec<f32>,
    /// Flat `(B, S)` pointer distributions.
    pub ptr: Vec<f32>,
    /// Flat `(B, G·Dv)` memory register.
    pub mem: Vec<f32>,
}

/// Serializable subset of [`Dims`] — only the axes the episode state spans.
///
/// The HCG- and projection-side dims (`hidden_dim`, `edge_dim`, property
/// axes) are not part of the state and are re-supplied by the runtime on
/// resume.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DimsRecord {
    /// Batch size B.
    pub batch: usize,
    /// Concept count N.
    pub concepts: usize,
    /// Glimpse count G.
    pub glimpses: usize,
    /// Stack depth S.
    pub stack_len: usize,
    /// Vision feature dimension Dv.
    pub vision_dim: usize,
}

impl From<&Dims> for DimsRecord {
    fn from(d: &Dims) -> Self {
        Self {
            batch: d.batch,
            concepts: d.concepts,
            glimpses: d.glimpses,
            stack_len: d.stack_len,
            vision_dim: d.vision_dim,
        }
    }
}

impl EpisodeSnapshot {
    /// Capture a live [`EpisodeState`].
    pub fn from_state(dims: &Dims, state: &EpisodeState) -> Self {
        Self {
            version: HCG_SEG_VERSION,
            dims: DimsRecord::from(dims),
            stack: state.stack.data.clone(),
            ptr: state.ptr.data.clone(),
            mem: state.mem.data.clone(),
        }
    }

    /// Rebuild the episode state, validating every buffer length against the
    /// recorded dims.
    pub fn restore(&self) -> Result<EpisodeState, ShapeError> {
        let d = &self.dims;
        expect_len(
            "snapshot stack",
            d.batch * d.concepts * d.glimpses * d.stack_len,
            self.stack.len(),
        )?;
        expect_len("snapshot ptr", d.batch * d.stack_len, self.ptr.len())?;
        expect_len(
            "snapshot mem",
            d.batch * d.glimpses * d.vision_dim,
            self.mem.len(),
        )?;
        Ok(EpisodeState {
            stack: AttStack {
                data: self.stack.clone(),
                batch: d.batch,
                concepts: d.concepts,
                glimpses: d.glimpses,
                stack_len: d.stack_len,
            },
            ptr: StackPtr {
                data: self.ptr.clone(),
                batch: d.batch,
                stack_len: d.stack_len,
            },
            mem: Memory {
                data: self.mem.clone(),
                batch: d.batch,
                width: d.glimpses * d.vision_dim,
            },
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dims {
        Dims {
            batch: 1,
            concepts: 2,
            glimpses: 2,
            stack_len: 3,
            vision_dim: 4,
            hidden_dim: 2,
            edge_dim: 2,
            concept_vis_dim: 2,
            concept_lin_dim: 2,
            property_num: 1,
            property_dim: 2,
        }
    }

    #[test]
    fn test_snapshot_restores_exact_state() {
        let d = dims();
        let mut state = EpisodeState::new(&d);
        state.ptr.move_forward();
        for (i, v) in state.stack.data.iter_mut().enumerate() {
            *v = i as f32 * 0.01;
        }
        state.mem.data[3] = 2.5;

        let snap = EpisodeSnapshot::from_state(&d, &state);
        assert_eq!(snap.version, HCG_SEG_VERSION);
        let restored = snap.restore().unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_restore_rejects_truncated_buffers() {
        let d = dims();
        let state = EpisodeState::new(&d);
        let mut snap = EpisodeSnapshot::from_state(&d, &state);
        snap.ptr.pop();
        assert!(matches!(
            snap.restore(),
            Err(ShapeError::BufferLen { what: "snapshot ptr", .. })
        ));
    }
}
