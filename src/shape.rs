//! Sizing constants and fail-fast buffer validation.
//!
//! Every tensor the core touches is a flat row-major `f32` buffer; [`Dims`]
//! is the single source of truth for their expected lengths. Shape mismatch
//! between the externally supplied HCG bundle and the declared dims is one of
//! only two fault classes in this core (the other being numeric blow-up), and
//! it must surface at episode setup, never deep inside an operator.

use alloc::string::String;

/// All sizing constants for one reasoning episode.
///
/// Supplied by the external hierarchy builder (`concepts`, relation and
/// property dims) and the controller (`hidden_dim`); fixed for the lifetime
/// of the episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dims {
    /// Batch size B.
    pub batch: usize,
    /// Number of concepts N in the hierarchy level set.
    pub concepts: usize,
    /// Parallel attention glimpses G.
    pub glimpses: usize,
    /// Soft stack depth S.
    pub stack_len: usize,
    /// Vision feature dimension Dv (per concept / region).
    pub vision_dim: usize,
    /// Controller hidden dimension Dh (control vector width).
    pub hidden_dim: usize,
    /// Edge / relation embedding dimension De.
    pub edge_dim: usize,
    /// Visual half of the concept embedding, Dcv.
    pub concept_vis_dim: usize,
    /// Linguistic half of the concept embedding, Dcl (Dcv + Dcl = Dv).
    pub concept_lin_dim: usize,
    /// Number of properties P attributed per concept.
    pub property_num: usize,
    /// Property embedding dimension Dp.
    pub property_dim: usize,
}

impl Dims {
    /// Check internal consistency: no zero axis, and the concept embedding
    /// halves concatenate to the vision dimension.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let axes = [
            ("batch", self.batch),
            ("concepts", self.concepts),
            ("glimpses", self.glimpses),
            ("stack_len", self.stack_len),
            ("vision_dim", self.vision_dim),
            ("hidden_dim", self.hidden_dim),
            ("edge_dim", self.edge_dim),
            ("concept_vis_dim", self.concept_vis_dim),
            ("concept_lin_dim", self.concept_lin_dim),
            ("property_num", self.property_num),
            ("property_dim", self.property_dim),
        ];
        for (what, v) in axes {
            if v == 0 {
                return Err(ShapeError::ZeroAxis { what });
            }
        }
        if self.concept_vis_dim + self.concept_lin_dim != self.vision_dim {
            return Err(ShapeError::EmbeddingSplit {
                vis: self.concept_vis_dim,
                lin: self.concept_lin_dim,
                vision_dim: self.vision_dim,
            });
        }
        Ok(())
    }

    /// Length of the attention stack buffer `(B, N, G, S)`.
    pub fn att_stack_len(&self) -> usize {
        self.batch * self.concepts * self.glimpses * self.stack_len
    }

    /// Length of the stack pointer buffer `(B, S)`.
    pub fn stack_ptr_len(&self) -> usize {
        self.batch * self.stack_len
    }

    /// Length of one attention map `(B, N, G)`.
    pub fn attention_len(&self) -> usize {
        self.batch * self.concepts * self.glimpses
    }

    /// Length of the memory register `(B, G·Dv)`.
    pub fn memory_len(&self) -> usize {
        self.batch * self.glimpses * self.vision_dim
    }

    /// Length of a control vector `(B, Dh)`.
    pub fn control_len(&self) -> usize {
        self.batch * self.hidden_dim
    }

    /// Length of the vision / region feature buffers `(B, N, Dv)`.
    pub fn vision_feat_len(&self) -> usize {
        self.batch * self.concepts * self.vision_dim
    }

    /// Length of the edge feature buffer `(B, N, N, De)`.
    pub fn feat_edge_len(&self) -> usize {
        self.batch * self.concepts * self.concepts * self.edge_dim
    }

    /// Length of the plain relation mask `(B, N, N)`.
    pub fn relation_mask_len(&self) -> usize {
        self.batch * self.concepts * self.concepts
    }

    /// Length of the visual concept embeddings `(B, N, Dcv)`.
    pub fn concept_vis_len(&self) -> usize {
        self.batch * self.concepts * self.concept_vis_dim
    }

    /// Length of the linguistic concept embeddings `(B, N, Dcl)`.
    pub fn concept_lin_len(&self) -> usize {
        self.batch * self.concepts * self.concept_lin_dim
    }

    /// Length of the intra-level relation mask `(B, N, N, De)`.
    pub fn mono_mask_len(&self) -> usize {
        self.feat_edge_len()
    }

    /// Length of the cross-level relation mask `(B, N, N)`.
    pub fn cross_mask_len(&self) -> usize {
        self.relation_mask_len()
    }

    /// Length of the property attribution tensor `(B, N, P, Dp)`.
    pub fn concept_property_len(&self) -> usize {
        self.batch * self.concepts * self.property_num * self.property_dim
    }
}

/// Setup-time validation failure.
///
/// Raised only while wiring an episode together; the operator hot path is
/// total over well-shaped buffers and never returns errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeError {
    /// A buffer's length disagrees with the declared [`Dims`].
    BufferLen {
        /// Which buffer failed validation.
        what: &'static str,
        /// Length implied by the dims.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },
    /// A dimension was declared as zero.
    ZeroAxis {
        /// Which axis was zero.
        what: &'static str,
    },
    /// `concept_vis_dim + concept_lin_dim` does not equal `vision_dim`.
    EmbeddingSplit {
        /// Declared visual half.
        vis: usize,
        /// Declared linguistic half.
        lin: usize,
        /// Declared vision dimension.
        vision_dim: usize,
    },
    /// A named parameter was absent from the parameter map.
    MissingParam(String),
}

impl core::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferLen {
                what,
                expected,
                got,
            } => write!(f, "{what}: expected {expected} elements, got {got}"),
            Self::ZeroAxis { what } => write!(f, "{what}: axis must be non-zero"),
            Self::EmbeddingSplit {
                vis,
                lin,
                vision_dim,
            } => write!(
                f,
                "concept embedding halves {vis} + {lin} must equal vision_dim {vision_dim}"
            ),
            Self::MissingParam(name) => write!(f, "parameter map has no entry '{name}'"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ShapeError {}

/// Check a buffer length against its expected value.
pub fn expect_len(what: &'static str, expected: usize, got: usize) -> Result<(), ShapeError> {
    if expected == got {
        Ok(())
    } else {
        Err(ShapeError::BufferLen {
            what,
            expected,
            got,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dims() -> Dims {
        Dims {
            batch: 2,
            concepts: 5,
            glimpses: 2,
            stack_len: 4,
            vision_dim: 6,
            hidden_dim: 3,
            edge_dim: 4,
            concept_vis_dim: 3,
            concept_lin_dim: 3,
            property_num: 2,
            property_dim: 4,
        }
    }

    #[test]
    fn test_dims_validate_ok() {
        assert!(small_dims().validate().is_ok());
    }

    #[test]
    fn test_dims_rejects_zero_axis() {
        let mut d = small_dims();
        d.glimpses = 0;
        assert!(matches!(d.validate(), Err(ShapeError::ZeroAxis { .. })));
    }

    #[test]
    fn test_dims_rejects_bad_embedding_split() {
        let mut d = small_dims();
        d.concept_vis_dim = 4; // 4 + 3 != 6
        assert!(matches!(
            d.validate(),
            Err(ShapeError::EmbeddingSplit { .. })
        ));
    }

    #[test]
    fn test_expected_lengths() {
        let d = small_dims();
        assert_eq!(d.att_stack_len(), 2 * 5 * 2 * 4);
        assert_eq!(d.stack_ptr_len(), 2 * 4);
        assert_eq!(d.attention_len(), 2 * 5 * 2);
        assert_eq!(d.memory_len(), 2 * 2 * 6);
        assert_eq!(d.feat_edge_len(), 2 * 5 * 5 * 4);
        assert_eq!(d.concept_property_len(), 2 * 5 * 2 * 4);
    }

    #[test]
    fn test_expect_len_mismatch() {
        let err = expect_len("mono_mask", 10, 8).unwrap_err();
        assert_eq!(
            err,
            ShapeError::BufferLen {
                what: "mono_mask",
                expected: 10,
                got: 8
            }
        );
    }
}
