// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives the per-node noise and the P/Q draws; every simulation task owns one.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
    // Second Box-Muller output, consumed by the next normal draw.
    spare_normal: Option<f64>,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self {
            state: seed,
            spare_normal: None,
        }
    }

    /// Generator for one (group, coupling, replica) task.
    ///
    /// The coordinates are folded into the sweep seed, so each task gets an
    /// independent stream no matter the order in which tasks are executed.
    pub fn for_task(sweep_seed: u64, group: usize, coupling: usize, replica: usize) -> Self {
        let mut h = splitmix64(sweep_seed);
        h = splitmix64(h ^ group as u64);
        h = splitmix64(h ^ coupling as u64);
        h = splitmix64(h ^ replica as u64);
        Self::new(h)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        // Marsaglia / Vigna family. Simple, fast, decent for simulation noise.
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        // 53 random mantissa bits -> [0,1).
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    #[inline]
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    /// Gaussian draw (Box-Muller, polar-free form).
    #[inline]
    pub fn normal(&mut self, mean: f64, std: f64) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return mean + std * z;
        }
        // u1 in (0,1] keeps ln() finite.
        let u1 = 1.0 - self.next_f64_01();
        let u2 = self.next_f64_01();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = core::f64::consts::TAU * u2;
        self.spare_normal = Some(r * theta.sin());
        mean + std * r * theta.cos()
    }

    pub fn fill_uniform(&mut self, out: &mut [f64], low: f64, high: f64) {
        for v in out.iter_mut() {
            *v = self.uniform(low, high);
        }
    }

    pub fn fill_normal(&mut self, out: &mut [f64], mean: f64, std: f64) {
        for v in out.iter_mut() {
            *v = self.normal(mean, std);
        }
    }
}

#[inline]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..100 {
            assert_eq!(a.normal(0.0, 1.0).to_bits(), b.normal(0.0, 1.0).to_bits());
        }
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = Prng::new(3);
        for _ in 0..10_000 {
            let x = rng.uniform(0.3, 0.5);
            assert!((0.3..0.5).contains(&x));
        }
    }

    #[test]
    fn normal_moments_are_plausible() {
        let mut rng = Prng::new(11);
        let n = 200_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let x = rng.normal(1.5, 0.1);
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert!((mean - 1.5).abs() < 2e-3, "mean {mean}");
        assert!((var.sqrt() - 0.1).abs() < 2e-3, "std {}", var.sqrt());
    }

    #[test]
    fn zero_std_normal_is_exactly_the_mean() {
        let mut rng = Prng::new(5);
        for _ in 0..64 {
            assert_eq!(rng.normal(0.0, 0.0), 0.0);
        }
    }

    #[test]
    fn task_streams_differ_by_coordinate() {
        let mut a = Prng::for_task(1, 0, 0, 1);
        let mut b = Prng::for_task(1, 0, 0, 2);
        let mut c = Prng::for_task(1, 0, 1, 1);
        let xa = a.next_f64_01();
        assert_ne!(xa, b.next_f64_01());
        assert_ne!(xa, c.next_f64_01());
    }
}
