//! Python FFI bindings via PyO3.
//!
//! Exposes the soft-stack machine to Python on flat float lists. The
//! surrounding research system (hierarchy builder, controller, training
//! loop) lives in Python; this surface covers episode construction, operator
//! stepping, blended dispatch and validity queries.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! from hcg_core import Dims, StackMachine
//!
//! dims = Dims(batch=1, concepts=8, glimpses=2, stack_len=4,
//!             vision_dim=64, hidden_dim=32, edge_dim=16,
//!             concept_vis_dim=32, concept_lin_dim=32,
//!             property_num=4, property_dim=8)
//! machine = StackMachine(dims, seed=7)
//! machine.set_hcg(concept_vis, concept_lin, mono_mask, cross_mask,
//!                 concept_property)
//!
//! machine.step("find", vision_feat, feat, feat_edge, control, relation_mask)
//! print(machine.validity_scores(0))   # 7 floats, one per operator
//! answer = machine.memory()           # flat (B, G*Dv) list
//! ```

#![allow(non_snake_case)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::hcg::HcgBundle;
use crate::linear::ParamMap;
use crate::modules::{ModuleKind, ModuleLibrary, StepInputs, NUM_MODULES};
use crate::shape::{Dims as RustDims, ShapeError};
use crate::stack::EpisodeState;
use crate::validity::ModuleValidity;

fn shape_err(e: ShapeError) -> PyErr {
    PyValueError::new_err(std::format!("{e}"))
}

// ── Dims ──────────────────────────────────────────────────────────────────────

/// Sizing constants for one reasoning episode.
///
/// All axes must be non-zero and concept_vis_dim + concept_lin_dim must
/// equal vision_dim.
#[pyclass(name = "Dims")]
#[derive(Clone)]
pub struct PyDims {
    inner: RustDims,
}

#[pymethods]
impl PyDims {
    /// Create and validate a Dims.
    #[new]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batch: usize,
        concepts: usize,
        glimpses: usize,
        stack_len: usize,
        vision_dim: usize,
        hidden_dim: usize,
        edge_dim: usize,
        concept_vis_dim: usize,
        concept_lin_dim: usize,
        property_num: usize,
        property_dim: usize,
    ) -> PyResult<Self> {
        let inner = RustDims {
            batch,
            concepts,
            glimpses,
            stack_len,
            vision_dim,
            hidden_dim,
            edge_dim,
            concept_vis_dim,
            concept_lin_dim,
            property_num,
            property_dim,
        };
        inner.validate().map_err(shape_err)?;
        Ok(Self { inner })
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        std::format!(
            "Dims(batch={}, concepts={}, glimpses={}, stack_len={}, vision_dim={})",
            self.inner.batch,
            self.inner.concepts,
            self.inner.glimpses,
            self.inner.stack_len,
            self.inner.vision_dim,
        )
    }
}

// ── StackMachine ──────────────────────────────────────────────────────────────

/// The differentiable soft-stack machine.
///
/// Owns the operator library, the validity matrix, the HCG bundle and the
/// episode state. All tensors cross the boundary as flat row-major float
/// lists; lengths are validated against the declared dims and a ValueError
/// is raised on mismatch.
#[pyclass(name = "StackMachine")]
pub struct PyStackMachine {
    dims: RustDims,
    library: ModuleLibrary,
    validity: ModuleValidity,
    state: EpisodeState,
    // Owned copies of the per-episode HCG tensors (the Rust core borrows).
    concept_vis: Vec<f32>,
    concept_lin: Vec<f32>,
    mono_mask: Vec<f32>,
    cross_mask: Vec<f32>,
    concept_property: Vec<f32>,
}

impl PyStackMachine {
    fn run(
        &mut self,
        vision_feat: Vec<f32>,
        feat: Vec<f32>,
        feat_edge: Vec<f32>,
        control: Vec<f32>,
        relation_mask: Vec<f32>,
        dispatch: impl FnOnce(&ModuleLibrary, &StepInputs<'_>, EpisodeState) -> EpisodeState,
    ) -> PyResult<()> {
        if self.concept_vis.is_empty() {
            return Err(PyValueError::new_err(
                "HCG bundle not set; call set_hcg() before stepping",
            ));
        }
        let hcg = HcgBundle::new(
            &self.dims,
            &self.concept_vis,
            &self.concept_lin,
            &self.mono_mask,
            &self.cross_mask,
            &self.concept_property,
        )
        .map_err(shape_err)?;
        let inputs = StepInputs::new(
            &self.dims,
            &vision_feat,
            &feat,
            &feat_edge,
            &control,
            &relation_mask,
            hcg,
        )
        .map_err(shape_err)?;
        let state = core::mem::replace(&mut self.state, EpisodeState::new(&self.dims));
        self.state = dispatch(&self.library, &inputs, state);
        Ok(())
    }
}

#[pymethods]
impl PyStackMachine {
    /// Create a machine with deterministic seeded projection weights.
    #[new]
    #[pyo3(signature = (dims, seed=0x5EED_CAFE))]
    pub fn new(dims: &PyDims, seed: u32) -> PyResult<Self> {
        let d = dims.inner;
        let library = ModuleLibrary::with_seed(d, seed).map_err(shape_err)?;
        let validity = ModuleValidity::build(d.stack_len).map_err(shape_err)?;
        Ok(Self {
            dims: d,
            library,
            validity,
            state: EpisodeState::new(&d),
            concept_vis: Vec::new(),
            concept_lin: Vec::new(),
            mono_mask: Vec::new(),
            cross_mask: Vec::new(),
            concept_property: Vec::new(),
        })
    }

    /// Supply the per-episode HCG tensors (flat row-major lists).
    #[allow(clippy::too_many_arguments)]
    pub fn set_hcg(
        &mut self,
        concept_vis: Vec<f32>,
        concept_lin: Vec<f32>,
        mono_mask: Vec<f32>,
        cross_mask: Vec<f32>,
        concept_property: Vec<f32>,
    ) -> PyResult<()> {
        // Validate now so step() cannot fail on stale lengths later.
        HcgBundle::new(
            &self.dims,
            &concept_vis,
            &concept_lin,
            &mono_mask,
            &cross_mask,
            &concept_property,
        )
        .map_err(shape_err)?;
        self.concept_vis = concept_vis;
        self.concept_lin = concept_lin;
        self.mono_mask = mono_mask;
        self.cross_mask = cross_mask;
        self.concept_property = concept_property;
        Ok(())
    }

    /// Load trained projection weights from a name → flat-list mapping
    /// (keys in the `<module>.<proj>.weight` / `.bias` convention).
    pub fn load_params(
        &mut self,
        params: std::collections::HashMap<String, Vec<f32>>,
    ) -> PyResult<()> {
        let mut map = ParamMap::new();
        for (name, values) in params {
            map.insert(name, values);
        }
        self.library.load_params(&map).map_err(shape_err)
    }

    /// Reset to a fresh episode: zero stack, pointer at slot 0, zero memory.
    pub fn reset(&mut self) {
        self.state = EpisodeState::new(&self.dims);
    }

    /// Run one operator by name ("noop", "find", "transform", "filter",
    /// "and", "describe", "relate").
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        module: &str,
        vision_feat: Vec<f32>,
        feat: Vec<f32>,
        feat_edge: Vec<f32>,
        control: Vec<f32>,
        relation_mask: Vec<f32>,
    ) -> PyResult<()> {
        let kind = ModuleKind::from_name(module).ok_or_else(|| {
            PyValueError::new_err(std::format!("unknown module name '{module}'"))
        })?;
        self.run(vision_feat, feat, feat_edge, control, relation_mask, |lib, inputs, state| {
            lib.apply(kind, inputs, state)
        })
    }

    /// Soft dispatch: run every operator and mix the outputs by `probs`
    /// (7 floats in validity-column order).
    #[allow(clippy::too_many_arguments)]
    pub fn step_blend(
        &mut self,
        probs: Vec<f32>,
        vision_feat: Vec<f32>,
        feat: Vec<f32>,
        feat_edge: Vec<f32>,
        control: Vec<f32>,
        relation_mask: Vec<f32>,
    ) -> PyResult<()> {
        if probs.len() != NUM_MODULES {
            return Err(PyValueError::new_err(std::format!(
                "probs must have exactly {NUM_MODULES} elements, got {}",
                probs.len()
            )));
        }
        let mut p = [0.0f32; NUM_MODULES];
        p.copy_from_slice(&probs);
        self.run(vision_feat, feat, feat_edge, control, relation_mask, |lib, inputs, state| {
            lib.apply_blend(&p, inputs, &state)
        })
    }

    /// Soft validity score of every operator for batch element `b`
    /// (`validityᵀ · pointer`, 7 floats in column order).
    pub fn validity_scores(&self, b: usize) -> PyResult<Vec<f32>> {
        if b >= self.dims.batch {
            return Err(PyValueError::new_err(std::format!(
                "batch index {b} out of range (batch={})",
                self.dims.batch
            )));
        }
        Ok(self.validity.scores(&self.state.ptr, b).to_vec())
    }

    /// Mask and renormalize a module-probability vector against the current
    /// pointer (7 floats in column order).
    pub fn mask_module_probs(&self, b: usize, probs: Vec<f32>) -> PyResult<Vec<f32>> {
        if probs.len() != NUM_MODULES {
            return Err(PyValueError::new_err(std::format!(
                "probs must have exactly {NUM_MODULES} elements, got {}",
                probs.len()
            )));
        }
        let mut p = [0.0f32; NUM_MODULES];
        p.copy_from_slice(&probs);
        self.validity.mask_probs(&self.state.ptr, b, &mut p);
        Ok(p.to_vec())
    }

    /// Sharpen the pointer: soft (softmax at temperature 0.1) or hard
    /// (argmax one-hot).
    #[pyo3(signature = (hard=false))]
    pub fn sharpen(&mut self, hard: bool) {
        if hard {
            self.state.ptr.sharpen_hard();
        } else {
            self.state.ptr.sharpen_soft();
        }
    }

    /// The current pointer distributions as a flat (B, S) list.
    pub fn pointer(&self) -> Vec<f32> {
        self.state.ptr.data.clone()
    }

    /// The current attention stack as a flat (B, N, G, S) list.
    pub fn stack(&self) -> Vec<f32> {
        self.state.stack.data.clone()
    }

    /// The memory register as a flat (B, G*Dv) list — the answer signal
    /// after a Describe step.
    pub fn memory(&self) -> Vec<f32> {
        self.state.mem.data.clone()
    }

    /// The attention under the current pointer as a flat (B, N, G) list.
    pub fn attention(&self) -> Vec<f32> {
        self.state.stack.read(&self.state.ptr).data
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        std::format!(
            "StackMachine(batch={}, concepts={}, stack_len={})",
            self.dims.batch,
            self.dims.concepts,
            self.dims.stack_len,
        )
    }
}

// ── Module entry point ────────────────────────────────────────────────────────

/// hcg_core — differentiable soft-stack machine Python bindings.
///
/// Exposes episode construction, operator stepping, blended dispatch and
/// validity queries on flat row-major float lists.
#[pymodule]
pub fn hcg_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDims>()?;
    m.add_class::<PyStackMachine>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("NUM_MODULES", NUM_MODULES)?;
    Ok(())
}
