//! Seeded noise sources sampled in octaves.

use noise::{NoiseFn, OpenSimplex, Perlin};

use crate::WorldSeed;

/// Two independent gradient noise fields sharing one world seed.
///
/// The Perlin field drives terrain height and strata; the simplex field drives caves
/// and tree placement so the two features never correlate.
#[derive(Clone)]
pub struct LayeredNoise {
    seed: WorldSeed,
    perlin: Perlin,
    simplex: OpenSimplex,
}

impl LayeredNoise {
    /// Create both noise sources from a world seed.
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            seed,
            perlin: Perlin::new(seed as u32),
            simplex: OpenSimplex::new(seed.wrapping_add(1) as u32),
        }
    }

    /// Reseed both noise sources.
    pub fn set_seed(&mut self, seed: WorldSeed) {
        *self = Self::new(seed);
    }

    /// Current world seed.
    pub fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// Perlin noise summed over `octaves`, normalized to roughly `[-1, 1]`.
    pub fn perlin_octaves(&self, point: [f64; 3], octaves: u32) -> f64 {
        octave_sum(&self.perlin, point, octaves)
    }

    /// Simplex noise summed over `octaves`, normalized to roughly `[-1, 1]`.
    pub fn simplex_octaves(&self, point: [f64; 3], octaves: u32) -> f64 {
        octave_sum(&self.simplex, point, octaves)
    }

    /// Single-octave Perlin sample remapped to `[0, 1]`.
    pub fn perlin_unit(&self, point: [f64; 3]) -> f64 {
        to_unit(self.perlin.get(point))
    }

    /// Simplex sample over `octaves` remapped to `[0, 1]`.
    pub fn simplex_unit(&self, point: [f64; 3], octaves: u32) -> f64 {
        to_unit(self.simplex_octaves(point, octaves))
    }
}

impl std::fmt::Debug for LayeredNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredNoise")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Each octave doubles frequency and halves amplitude.
fn octave_sum<N: NoiseFn<f64, 3>>(source: &N, point: [f64; 3], octaves: u32) -> f64 {
    let mut frequency = 1.0;
    let mut amplitude = 1.0;
    let mut total = 0.0;
    let mut norm = 0.0;

    for _ in 0..octaves.max(1) {
        let p = [
            point[0] * frequency,
            point[1] * frequency,
            point[2] * frequency,
        ];
        total += source.get(p) * amplitude;
        norm += amplitude;
        frequency *= 2.0;
        amplitude *= 0.5;
    }

    total / norm
}

#[inline]
fn to_unit(value: f64) -> f64 {
    (value * 0.5 + 0.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_deterministic() {
        let a = LayeredNoise::new(7);
        let b = LayeredNoise::new(7);
        for i in 0..64 {
            let p = [f64::from(i) * 0.37, -1.5, f64::from(i) * 0.11];
            assert_eq!(a.perlin_octaves(p, 4), b.perlin_octaves(p, 4));
            assert_eq!(a.simplex_octaves(p, 6), b.simplex_octaves(p, 6));
        }
    }

    #[test]
    fn unit_samples_stay_in_range() {
        let noise = LayeredNoise::new(99);
        for i in -50..50 {
            let p = [f64::from(i) * 0.731, f64::from(i) * 0.173, 3.3];
            let v = noise.perlin_unit(p);
            assert!((0.0..=1.0).contains(&v));
            let v = noise.simplex_unit(p, 6);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn tolerates_huge_coordinates() {
        let noise = LayeredNoise::new(1);
        let v = noise.perlin_octaves([1.0e9, -3.0e8, 7.5e7], 8);
        assert!(v.is_finite());
    }

    #[test]
    fn reseed_changes_output() {
        let mut noise = LayeredNoise::new(1);
        let points: Vec<[f64; 3]> = (0..32)
            .map(|i| [f64::from(i) * 0.41 + 0.13, 0.27, f64::from(i) * 0.19 + 0.5])
            .collect();
        let before: Vec<f64> = points.iter().map(|p| noise.perlin_octaves(*p, 3)).collect();
        noise.set_seed(2);
        assert_eq!(noise.seed(), 2);
        let after: Vec<f64> = points.iter().map(|p| noise.perlin_octaves(*p, 3)).collect();
        assert_ne!(before, after);
    }
}
