//! Rollbackable random number generation.
//!
//! Each LP owns a [`Numerical`] state which is saved in every checkpoint, so
//! that silent re-execution after a rollback draws exactly the same sequence of
//! numbers as the original forward execution.
//!
//! The generator is George Marsaglia's multiply-with-carry, operating on the
//! two 32-bit halves of a 64-bit seed.

/// The divisors whose multiples are degenerate states of each generator half.
const SEED1_MODULUS: u32 = 0x9068_FFFF;
const SEED2_MODULUS: u32 = 0x464F_FFFF;

/// The random-number state of an LP.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Numerical {
    seed: u64,
    // Cached second deviate of the Box-Muller transform.
    iset: bool,
    gset: f64,
}

impl Numerical {
    /// Derives the initial state of the LP with the given global index from
    /// the master seed.
    ///
    /// Each LP receives the master seed rotated by its index modulo 64, which
    /// means that LPs whose indices are congruent modulo 64 start from the
    /// same seed.
    pub(crate) fn new(master_seed: u64, gid: usize) -> Self {
        Self::from_seed(master_seed.rotate_left((gid % 64) as u32))
    }

    /// Creates a state from a raw seed, which is sanitized if degenerate.
    pub(crate) fn from_seed(seed: u64) -> Self {
        Self {
            seed: sanitize_seed(seed),
            iset: false,
            gset: 0.0,
        }
    }

    fn halves(&self) -> (u32, u32) {
        (self.seed as u32, (self.seed >> 32) as u32)
    }

    /// Returns a uniformly distributed number in the open interval (0, 1).
    pub(crate) fn random(&mut self) -> f64 {
        let (mut s1, mut s2) = self.halves();
        s1 = 36969u32
            .wrapping_mul(s1 & 0xFFFF)
            .wrapping_add(s1 >> 16);
        s2 = 18000u32
            .wrapping_mul(s2 & 0xFFFF)
            .wrapping_add(s2 >> 16);
        self.seed = (s1 as u64) | ((s2 as u64) << 32);

        // The constant is 1/(2^32 + 2).
        let x = (s1 << 16).wrapping_add(s1 >> 16).wrapping_add(s2);

        (x as f64 + 1.0) * 2.328306435454494e-10
    }

    /// Returns a uniformly distributed integer in `[min, max]`.
    pub(crate) fn random_range(&mut self, min: i32, max: i32) -> i32 {
        let span = max as f64 - min as f64 + 1.0;

        (self.random() * span).floor() as i32 + min
    }

    /// Returns an integer in `[min, max]` with a non-uniform distribution
    /// whose skew is controlled by `x`.
    pub(crate) fn random_range_non_uniform(&mut self, x: i32, min: i32, max: i32) -> i32 {
        let a = self.random_range(0, x);
        let b = self.random_range(min, max);

        ((a | b) % (max - min + 1)) + min
    }

    /// Returns an exponentially distributed number with the given mean.
    ///
    /// The mean must be non-negative.
    pub(crate) fn expent(&mut self, mean: f64) -> f64 {
        -mean * (1.0 - self.random()).ln()
    }

    /// Returns a normally distributed number with zero mean and unit variance.
    pub(crate) fn normal(&mut self) -> f64 {
        if self.iset {
            self.iset = false;
            return self.gset;
        }

        let (v1, v2, rsq) = loop {
            let v1 = 2.0 * self.random() - 1.0;
            let v2 = 2.0 * self.random() - 1.0;
            let rsq = v1 * v1 + v2 * v2;
            if rsq < 1.0 && rsq != 0.0 {
                break (v1, v2, rsq);
            }
        };
        let fac = (-2.0 * rsq.ln() / rsq).sqrt();

        // Box-Muller yields two deviates: return one and keep the other.
        self.gset = v1 * fac;
        self.iset = true;

        v2 * fac
    }

    /// Returns a gamma-distributed number of integer order `ia >= 1`.
    pub(crate) fn gamma(&mut self, ia: u32) -> f64 {
        if ia < 6 {
            // Direct method: sum of waiting times.
            let mut x = 1.0;
            for _ in 0..ia {
                x *= self.random();
            }
            return -x.ln();
        }

        // Rejection method.
        let am = (ia - 1) as f64;
        let s = (2.0 * am + 1.0).sqrt();
        loop {
            let (x, y) = loop {
                let y = loop {
                    let v1 = self.random();
                    let v2 = 2.0 * self.random() - 1.0;
                    if v1 * v1 + v2 * v2 <= 1.0 {
                        break v2 / v1;
                    }
                };
                let x = s * y + am;
                if x >= 0.0 {
                    break (x, y);
                }
            };
            let e = (1.0 + y * y) * (am * (x / am).ln() - s * y).exp();
            if self.random() <= e {
                return x;
            }
        }
    }

    /// Returns a sample of the waiting time of a Poisson process with unit
    /// rate.
    pub(crate) fn poisson(&mut self) -> f64 {
        self.gamma(1)
    }

    /// Returns a Zipf-distributed integer in `[1, limit]` with the given skew.
    pub(crate) fn zipf(&mut self, skew: f64, limit: u32) -> u32 {
        let a = skew;
        let b = 2f64.powf(a - 1.0);
        loop {
            let u = self.random();
            let v = self.random();
            let x = u.powf(-1.0 / a - 1.0).floor();
            let t = (1.0 + 1.0 / x).powf(a - 1.0);
            if v * x * (t - 1.0) / (b - 1.0) <= t / b && x <= limit as f64 {
                return x as u32;
            }
        }
    }
}

/// Replaces the degenerate states of each generator half.
///
/// Any multiple of the modulus of a half, including 0, is a fixed point of the
/// generator. Such a half is replaced by its bitwise inverse, reduced modulo
/// the same divisor.
fn sanitize_seed(seed: u64) -> u64 {
    fn sanitize_half(half: u32, modulus: u32) -> u32 {
        match half % modulus {
            0 => (half ^ u32::MAX) % modulus,
            h => h,
        }
    }

    let s1 = sanitize_half(seed as u32, SEED1_MODULUS);
    let s2 = sanitize_half((seed >> 32) as u32, SEED2_MODULUS);

    (s1 as u64) | ((s2 as u64) << 32)
}
