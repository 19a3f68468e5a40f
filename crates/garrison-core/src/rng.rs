//! Deterministic RNG for the idle patrol routine.
//!
//! Small and dependency-free. Not cryptographic.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform value in [0, 1).
    pub fn next_f32_unit(&mut self) -> f32 {
        let x = (self.next_u64() as u32) >> 8;
        (x as f32) / ((1u32 << 24) as f32)
    }
}
