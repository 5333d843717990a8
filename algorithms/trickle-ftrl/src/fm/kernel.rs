//! Width-`k` lane kernel for the factorization-machine inner products.
//!
//! The hot loop of the FM forward pass accumulates, for every nonzero
//! feature, `sums[lane] += v[lane] * x` and `sums_sq[lane] += (v[lane] * x)²`
//! across all latent lanes. On x86-64 with AVX2 available at runtime the
//! loop processes eight f32 (or four f64) lanes per instruction; everywhere
//! else a scalar loop with identical external behavior is used.
//!
//! Numeric contract: the summation order across lanes is unspecified, so
//! the vectorized and scalar paths may differ in the last bits. Nothing in
//! the training math depends on which path ran.

use trickle::Float;

/// Lane-wise accumulation primitive, specialized per storage width.
pub trait LatentKernel: Sized + Copy {
    /// `sums[lane] += v[lane] * x` and `sums_sq[lane] += (v[lane] * x)²`
    /// for every latent lane.
    fn accumulate_lanes(v: &[Self], x: Self, sums: &mut [Self], sums_sq: &mut [Self]);
}

/// Pairwise-interaction term from the accumulated lane sums:
/// `0.5 * Σ_lane (sums² − sums_sq)`.
pub(crate) fn interaction_term<F: Float>(sums: &[F], sums_sq: &[F]) -> F {
    let total = sums
        .iter()
        .zip(sums_sq.iter())
        .map(|(&s, &q)| s * s - q)
        .sum::<F>();
    F::cast(0.5) * total
}

fn accumulate_lanes_scalar<F: Float>(v: &[F], x: F, sums: &mut [F], sums_sq: &mut [F]) {
    for ((&v, s), q) in v.iter().zip(sums.iter_mut()).zip(sums_sq.iter_mut()) {
        let prod = v * x;
        *s += prod;
        *q += prod * prod;
    }
}

impl LatentKernel for f32 {
    fn accumulate_lanes(v: &[f32], x: f32, sums: &mut [f32], sums_sq: &mut [f32]) {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                unsafe { accumulate_lanes_f32_avx2(v, x, sums, sums_sq) };
                return;
            }
        }
        accumulate_lanes_scalar(v, x, sums, sums_sq);
    }
}

impl LatentKernel for f64 {
    fn accumulate_lanes(v: &[f64], x: f64, sums: &mut [f64], sums_sq: &mut [f64]) {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                unsafe { accumulate_lanes_f64_avx2(v, x, sums, sums_sq) };
                return;
            }
        }
        accumulate_lanes_scalar(v, x, sums, sums_sq);
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn accumulate_lanes_f32_avx2(v: &[f32], x: f32, sums: &mut [f32], sums_sq: &mut [f32]) {
    use std::arch::x86_64::*;

    let lanes = v.len();
    let broadcast = _mm256_set1_ps(x);
    let mut i = 0;
    while i + 8 <= lanes {
        let factors = _mm256_loadu_ps(v.as_ptr().add(i));
        let prod = _mm256_mul_ps(factors, broadcast);

        let s = _mm256_loadu_ps(sums.as_ptr().add(i));
        _mm256_storeu_ps(sums.as_mut_ptr().add(i), _mm256_add_ps(s, prod));

        let q = _mm256_loadu_ps(sums_sq.as_ptr().add(i));
        _mm256_storeu_ps(
            sums_sq.as_mut_ptr().add(i),
            _mm256_add_ps(q, _mm256_mul_ps(prod, prod)),
        );
        i += 8;
    }
    accumulate_lanes_scalar(&v[i..], x, &mut sums[i..], &mut sums_sq[i..]);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn accumulate_lanes_f64_avx2(v: &[f64], x: f64, sums: &mut [f64], sums_sq: &mut [f64]) {
    use std::arch::x86_64::*;

    let lanes = v.len();
    let broadcast = _mm256_set1_pd(x);
    let mut i = 0;
    while i + 4 <= lanes {
        let factors = _mm256_loadu_pd(v.as_ptr().add(i));
        let prod = _mm256_mul_pd(factors, broadcast);

        let s = _mm256_loadu_pd(sums.as_ptr().add(i));
        _mm256_storeu_pd(sums.as_mut_ptr().add(i), _mm256_add_pd(s, prod));

        let q = _mm256_loadu_pd(sums_sq.as_ptr().add(i));
        _mm256_storeu_pd(
            sums_sq.as_mut_ptr().add(i),
            _mm256_add_pd(q, _mm256_mul_pd(prod, prod)),
        );
        i += 4;
    }
    accumulate_lanes_scalar(&v[i..], x, &mut sums[i..], &mut sums_sq[i..]);
}
