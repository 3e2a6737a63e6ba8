//! Special functions needed to fit and evaluate the delay distributions.

use std::f64::consts::{PI, SQRT_2};

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const MAX_ITERATIONS: usize = 1000;
const EPSILON: f64 = 1e-14;

/// Natural logarithm of the gamma function, for x > 0.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        //reflection formula
        (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut sum = LANCZOS_COEFFICIENTS[0];
        for (i, coefficient) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
            sum += coefficient / (x + i as f64);
        }
        let t = x + LANCZOS_G + 0.5;
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
    }
}

/// The digamma function (derivative of ln_gamma), for x > 0.
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln()
        - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0)))
}

/// The trigamma function (derivative of digamma), for x > 0.
pub fn trigamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result
        + inv
        + 0.5 * inv2
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

/// Complementary error function, as erfc(x) = Q(1/2, x²) for x >= 0.
pub fn erfc(x: f64) -> f64 {
    let upper = regularised_gamma(0.5, x * x).1;
    if x >= 0.0 { upper } else { 2.0 - upper }
}

/// Cumulative distribution function of the standard normal distribution.
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// The regularised lower incomplete gamma function P(a, x), for a > 0 and x >= 0.
pub fn regularised_lower_gamma(a: f64, x: f64) -> f64 {
    regularised_gamma(a, x).0
}

/// Returns (P(a, x), Q(a, x)). Whichever of the two is small is computed directly, so that tails keep
/// their relative precision.
fn regularised_gamma(a: f64, x: f64) -> (f64, f64) {
    if x <= 0.0 {
        return (0.0, 1.0);
    }
    if x.is_infinite() {
        return (1.0, 0.0);
    }

    let ln_prefix = a * x.ln() - x - ln_gamma(a);

    if x < a + 1.0 {
        //series representation
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut denominator = a;
        for _ in 0..MAX_ITERATIONS {
            denominator += 1.0;
            term *= x / denominator;
            sum += term;
            if term.abs() < sum.abs() * EPSILON {
                break;
            }
        }
        let lower = (sum * ln_prefix.exp()).clamp(0.0, 1.0);
        (lower, 1.0 - lower)
    } else {
        //continued fraction for the upper function (modified Lentz)
        let tiny = f64::MIN_POSITIVE / EPSILON;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_ITERATIONS {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPSILON {
                break;
            }
        }
        let upper = (ln_prefix.exp() * h).clamp(0.0, 1.0);
        (1.0 - upper, upper)
    }
}
