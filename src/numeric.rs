//! no_std float kernels shared by every operator.
//!
//! The stack machine runs in environments without `std` float intrinsics, so
//! the transcendental functions here are hand-rolled with documented accuracy
//! bounds. Everything operates on flat row-major `f32` buffers; the
//! `(batch, concepts, glimpses)` layout used by attention maps is indexed as
//! `(b * concepts + n) * glimpses + g`.

/// Rectified linear unit.
#[inline]
pub fn relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// Minimax polynomial approximation to exp(x), no_std compatible.
///
/// Range reduction: exp(x) = 2^k * exp(r) with r = x - k*ln2, |r| ≤ 0.5*ln2.
/// The degree-5 polynomial for exp(r) is accurate to < 1e-6 on that range.
pub fn exp_approx(x: f32) -> f32 {
    // Clamp to avoid overflow: exp(88) > f32::MAX
    let x = x.clamp(-87.0, 88.0);
    const LN2: f32 = 0.693_147_18;
    const INV_LN2: f32 = 1.442_695_04;
    let k = (x * INV_LN2 + 0.5) as i32 - (if x < 0.0 { 1 } else { 0 });
    let r = x - k as f32 * LN2;
    let r2 = r * r;
    let r4 = r2 * r2;
    let poly = 1.0 + r + 0.5 * r2 + (1.0 / 6.0) * r * r2
        + (1.0 / 24.0) * r4
        + (1.0 / 120.0) * r * r4;
    // Multiply by 2^k by adding k to the f32 exponent field (bias 127).
    let clamped_k = k.clamp(-126, 127);
    let scale_bits: u32 = ((127 + clamped_k) as u32) << 23;
    poly * f32::from_bits(scale_bits)
}

/// Logistic sigmoid built on [`exp_approx`].
///
/// Evaluated as `1 / (1 + exp(-x))` for x ≥ 0 and `exp(x) / (1 + exp(x))`
/// for x < 0 so the exponent argument is never positive.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + exp_approx(-x))
    } else {
        let e = exp_approx(x);
        e / (1.0 + e)
    }
}

/// In-place softmax over the concept axis of a `(batch, concepts, glimpses)`
/// buffer.
///
/// Each `(b, g)` column is shifted by its maximum before exponentiation, so
/// arbitrarily large logits cannot overflow. A column that sums to zero
/// (all `-inf`-like inputs) falls back to the uniform distribution.
pub fn softmax_concepts(data: &mut [f32], batch: usize, concepts: usize, glimpses: usize) {
    debug_assert_eq!(data.len(), batch * concepts * glimpses);
    for b in 0..batch {
        for g in 0..glimpses {
            let idx = |n: usize| (b * concepts + n) * glimpses + g;
            let mut max = f32::MIN;
            for n in 0..concepts {
                if data[idx(n)] > max {
                    max = data[idx(n)];
                }
            }
            let mut sum = 0.0f32;
            for n in 0..concepts {
                let e = exp_approx(data[idx(n)] - max);
                data[idx(n)] = e;
                sum += e;
            }
            if sum > 0.0 {
                for n in 0..concepts {
                    data[idx(n)] /= sum;
                }
            } else {
                let uniform = 1.0 / concepts as f32;
                for n in 0..concepts {
                    data[idx(n)] = uniform;
                }
            }
        }
    }
}

/// Max-clamp stabilizer for relational hops, in place over a
/// `(batch, concepts, glimpses)` buffer.
///
/// For each `(b, g)` column: `norm = max_n value`, with `norm` forced to 1
/// whenever `norm ≤ 1`, then every entry divided by `norm`. Repeated
/// relational propagation therefore cannot grow attention beyond 1, while
/// already-bounded attention passes through unchanged. Omitting this clamp
/// is a correctness bug, not an optimisation.
pub fn clamp_norm_max(data: &mut [f32], batch: usize, concepts: usize, glimpses: usize) {
    debug_assert_eq!(data.len(), batch * concepts * glimpses);
    for b in 0..batch {
        for g in 0..glimpses {
            let idx = |n: usize| (b * concepts + n) * glimpses + g;
            let mut norm = f32::MIN;
            for n in 0..concepts {
                if data[idx(n)] > norm {
                    norm = data[idx(n)];
                }
            }
            if norm <= 1.0 {
                norm = 1.0;
            }
            for n in 0..concepts {
                data[idx(n)] /= norm;
            }
        }
    }
}

/// Deterministic xorshift32 stream for parameterless bring-up of projection
/// weights. Not a statistical RNG — just a stable, seedable value source.
#[derive(Clone, Debug)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Create a stream from a non-zero seed (zero is remapped internally).
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Next raw 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next value uniform in [-scale, scale].
    pub fn next_symmetric(&mut self, scale: f32) -> f32 {
        let unit = (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32; // [0, 1)
        (2.0 * unit - 1.0) * scale
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
