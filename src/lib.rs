//! # hcg-core
//!
//! Differentiable soft-stack machine for compositional reasoning over
//! hierarchical concept graphs (HCG).
//!
//! ---
//!
//! ## This is not a neural network framework. It is an execution engine.
//!
//! A compositional visual-question-answering system answers "what colour is
//! the thing left of the mug?" by running a short *program* — Find, Relate,
//! Filter, Describe — over attention distributions. This crate is the machine
//! that executes such programs while staying differentiable end to end.
//!
//! Three mechanisms make that possible without a single branch on data:
//!
//! **Soft stack** — a fixed-depth stack of attention maps addressed by a
//! *probability distribution* over slots instead of an integer index. Push
//! and pop are shift-by-one transforms of the pointer distribution with mass
//! clamped at the boundaries, so gradient flows through every stack
//! operation.
//!
//! **Validity masking** — a static `(stack_len × 7)` matrix derived from
//! each operator's pop/push arity. The external controller multiplies it
//! against the pointer before choosing an operator, so overflow and
//! underflow are impossible *by construction*, not by runtime check.
//!
//! **Shared fusion + clamp contract** — every operator merges its
//! query-conditioned feature with context through one parameter-free fusion
//! primitive, and every relational hop is bounded by the same max-clamp
//! normalizer, so repeated application cannot blow up numerically.
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! Controller ──c_i──▶ ModuleLibrary ──▶ (AttStack, StackPtr, Memory)'
//!                          ▲   ▲
//!                    HcgBundle   ModuleValidity (static)
//!                          ▲
//!                  Hierarchy Builder (external)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`shape`] | [`Dims`], [`ShapeError`] | Sizing constants; fail-fast buffer validation |
//! | [`fusion`] | [`fusion::fuse`] | `-(x-y)² + relu(x+y)` elementwise combinator |
//! | [`stack`] | [`AttStack`], [`StackPtr`], [`EpisodeState`] | Soft stack read/write and pointer shifting |
//! | [`validity`] | [`ModuleValidity`] | Static structural-safety matrix and pointer gating |
//! | [`modules`] | [`ModuleKind`], [`ModuleLibrary`] | The seven operators plus hard and blended dispatch |
//! | [`hcg`] | [`HcgBundle`] | Borrowed per-episode concept tensors |
//! | [`linear`] | [`linear::Linear`], [`linear::ParamMap`] | Forward-only projections and named weight loading |
//! | [`numeric`] | — | no_std exp/sigmoid/softmax and the max-clamp normalizer |
//! | [`snapshot`] | [`snapshot::EpisodeSnapshot`] | Serialisable episode capture (requires `serde` feature) |
//!
//! ## `no_std`
//!
//! This crate is `#![no_std]` by default; tensor buffers use `alloc`. Enable
//! the `std` feature for the demo binaries and heap-friendly helpers. Enable
//! `serde` for [`snapshot`] and `python-ffi` for the PyO3 bindings.
//!
//! ## License
//!
//! Business Source License 1.1. Free for evaluation and non-production use.

#![cfg_attr(not(any(feature = "std", feature = "python-ffi")), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

// Pull in std when the feature is enabled (for demos, ffi, etc.)
#[cfg(any(feature = "std", feature = "python-ffi"))]
extern crate std;

pub mod fusion;
pub mod hcg;
pub mod linear;
pub mod modules;
pub mod numeric;
pub mod shape;
pub mod stack;
pub mod validity;

#[cfg(feature = "serde")]
pub mod snapshot;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use hcg::HcgBundle;
pub use modules::{ModuleKind, ModuleLibrary, StepInputs};
pub use shape::{Dims, ShapeError};
pub use stack::{AttStack, Attention, EpisodeState, Memory, StackPtr};
pub use validity::ModuleValidity;

/// Multiplicative attenuation applied per hierarchy hop in Filter's
/// depth-decayed cross mask.
pub const DECAY_RATE: f32 = 0.9;

/// Number of hierarchy hops the Filter decay is unrolled over.
pub const NUM_LAYERS: usize = 2;
