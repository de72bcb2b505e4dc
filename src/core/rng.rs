use std::f64::consts::PI;

const UNIT_SCALE: f64 = 4_294_967_296.0;

/// Mulberry32 state. `next` hands back the successor instead of mutating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
    state: u32,
}

impl Generator {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next(self) -> (f64, Self) {
        let state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = (state ^ (state >> 15)).wrapping_mul(state | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (f64::from(out) / UNIT_SCALE, Self { state })
    }
}

/// Box-Muller (cosine branch) standard normal draw.
///
/// Consumes two uniforms per call, plus one more for each exact zero.
/// The sine companion is discarded so draw order stays one pair per variate.
pub fn standard_normal(rng: Generator) -> (f64, Generator) {
    let (u, rng) = nonzero_uniform(rng);
    let (v, rng) = nonzero_uniform(rng);
    let z = (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos();
    (z, rng)
}

fn nonzero_uniform(mut rng: Generator) -> (f64, Generator) {
    loop {
        let (x, next) = rng.next();
        rng = next;
        if x != 0.0 {
            return (x, rng);
        }
    }
}

pub fn derive_stream_seed(seed: u32, index: u32) -> u32 {
    // odd multiplier and fmix32 are both bijective, so indices never share a seed
    fmix32(seed.wrapping_add(index.wrapping_mul(0x9E37_79B9)))
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^ (h >> 16)
}
