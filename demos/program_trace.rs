//! # Soft-stack program trace
//!
//! Walks the canonical two-operand reasoning program — Find, Find, And,
//! Describe — through the machine and prints the pointer distribution, the
//! validity gate and the attention mass after every step. Run with:
//!
//! ```bash
//! cargo run --example program_trace
//! ```

use hcg_core::{
    Dims, EpisodeState, HcgBundle, ModuleKind, ModuleLibrary, ModuleValidity, StepInputs,
};

// ── Scene fixture ─────────────────────────────────────────────────────────────

/// A tiny synthetic scene: 5 concepts, 2 glimpses, stack depth 4.
fn dims() -> Dims {
    Dims {
        batch: 1,
        concepts: 5,
        glimpses: 2,
        stack_len: 4,
        vision_dim: 8,
        hidden_dim: 4,
        edge_dim: 3,
        concept_vis_dim: 4,
        concept_lin_dim: 4,
        property_num: 3,
        property_dim: 4,
    }
}

fn wave(len: usize, k: f32) -> Vec<f32> {
    (0..len).map(|i| ((i as f32) * k).sin() * 0.5).collect()
}

struct Scene {
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

fn scene(d: &Dims) -> Scene {
    Scene {
        vision: wave(d.vision_feat_len(), 0.31),
        feat: wave(d.vision_feat_len(), 0.73),
        edge: wave(d.feat_edge_len(), 0.11),
        control: wave(d.control_len(), 1.3),
        rel: vec![1.0; d.relation_mask_len()],
        vis: wave(d.concept_vis_len(), 0.91),
        lin: wave(d.concept_lin_len(), 0.53),
        mono: vec![0.5; d.mono_mask_len()],
        cross: vec![0.25; d.cross_mask_len()],
        prop: wave(d.concept_property_len(), 0.23),
    }
}

// ── Trace printing ────────────────────────────────────────────────────────────

fn print_state(label: &str, d: &Dims, state: &EpisodeState, validity: &ModuleValidity) {
    let ptr = &state.ptr.data[0..d.stack_len];
    let att = state.stack.read(&state.ptr);
    let mass: f32 = att.data.iter().sum();
    let mem_norm: f32 = state.mem.data.iter().map(|v| v * v).sum::<f32>().sqrt();

    println!("after {label:<10} ptr = {ptr:.3?}  att mass = {mass:.4}  |mem| = {mem_norm:.4}");
    print!("  admissible next:");
    let scores = validity.scores(&state.ptr, 0);
    for (kind, score) in ModuleKind::ALL.iter().zip(scores.iter()) {
        if *score > 0.5 {
            print!(" {}", kind.name());
        }
    }
    println!();
}

fn main() {
    let d = dims();
    let s = scene(&d);
    let hcg = HcgBundle::new(&d, &s.vis, &s.lin, &s.mono, &s.cross, &s.prop)
        .expect("scene HCG shapes");
    let inputs = StepInputs::new(&d, &s.vision, &s.feat, &s.edge, &s.control, &s.rel, hcg)
        .expect("scene input shapes");

    let lib = ModuleLibrary::with_seed(d, 2024).expect("valid dims");
    let validity = ModuleValidity::build(d.stack_len).expect("depth within capacity");

    println!("═══ soft-stack program trace ═══");
    println!(
        "scene: {} concepts, {} glimpses, stack depth {}\n",
        d.concepts, d.glimpses, d.stack_len
    );

    let mut state = EpisodeState::new(&d);
    print_state("init", &d, &state, &validity);

    for kind in [
        ModuleKind::Find,
        ModuleKind::Find,
        ModuleKind::And,
        ModuleKind::Describe,
    ] {
        state = lib.apply(kind, &inputs, state);
        print_state(kind.name(), &d, &state, &validity);
    }

    println!("\nmemory readout (glimpse-major, {} floats):", state.mem.data.len());
    for (g, row) in state.mem.data.chunks(d.vision_dim).enumerate() {
        println!("  glimpse {g}: {row:.4?}");
    }
}
