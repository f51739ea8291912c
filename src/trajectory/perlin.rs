//! 1-D Perlin gradient noise

use rand::seq::SliceRandom;
use rand::SeedableRng;

/// 1-D Perlin noise sampler over a shuffled permutation table
pub struct Perlin1D {
    perm: [u8; 512],
}

impl Perlin1D {
    pub fn new(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut table: Vec<u8> = (0..=255).collect();
        table.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = table[i & 255];
        }
        Self { perm }
    }

    /// Sample noise at `x`; output lies in [-1, 1] and is 0 at integer
    /// lattice points.
    pub fn sample(&self, x: f64) -> f64 {
        let xi = (x.floor() as i64 & 255) as usize;
        let xf = x - x.floor();
        let u = fade(xf);

        let a = grad(self.perm[xi], xf);
        let b = grad(self.perm[xi + 1], xf - 1.0);
        a + u * (b - a)
    }
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn grad(hash: u8, x: f64) -> f64 {
    if hash & 1 == 0 {
        x
    } else {
        -x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_at_lattice_points() {
        let noise = Perlin1D::new(7);
        for i in 0..32 {
            assert!(noise.sample(i as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_bounded() {
        let noise = Perlin1D::new(42);
        let mut x = 0.0;
        while x < 64.0 {
            let v = noise.sample(x);
            assert!((-1.0..=1.0).contains(&v), "sample {v} out of range at {x}");
            x += 0.093;
        }
    }

    #[test]
    fn test_deterministic_per_seed() {
        let a = Perlin1D::new(5);
        let b = Perlin1D::new(5);
        let c = Perlin1D::new(6);
        assert_eq!(a.sample(3.7), b.sample(3.7));
        assert_ne!(a.sample(3.7), c.sample(3.7));
    }

    #[test]
    fn test_continuity() {
        let noise = Perlin1D::new(11);
        let mut prev = noise.sample(0.0);
        let mut x = 0.001;
        while x < 8.0 {
            let v = noise.sample(x);
            assert!((v - prev).abs() < 0.01, "discontinuity at {x}");
            prev = v;
            x += 0.001;
        }
    }
}
