use std::fmt::Display;

use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Weibull};
use serde_json::{Map, Value};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString};

use crate::math::special_functions::{regularised_lower_gamma, standard_normal_cdf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DelayFamily {
    Degenerate,
    Uniform,
    Exponential,
    Gamma,
    #[strum(serialize = "lognormal")]
    LogNormal,
    Weibull,
    Normal,
}

impl DelayFamily {
    /// The number of free parameters a fit of this family estimates.
    pub fn get_number_of_parameters(&self) -> usize {
        match self {
            DelayFamily::Degenerate => 0,
            DelayFamily::Uniform | DelayFamily::Exponential => 1,
            DelayFamily::Gamma
            | DelayFamily::LogNormal
            | DelayFamily::Weibull
            | DelayFamily::Normal => 2,
        }
    }
}

/// A fitted waiting-time distribution. Models are plain values: they hold no reference to the
/// samples they were fitted on, and can be sampled from any thread with any random generator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DelayModel {
    Degenerate { value: f64 },
    Uniform { max: f64 },
    Exponential { rate: f64 },
    Gamma { shape: f64, scale: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Weibull { shape: f64, scale: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl DelayModel {
    pub fn zero() -> Self {
        DelayModel::Degenerate { value: 0.0 }
    }

    pub fn get_family(&self) -> DelayFamily {
        match self {
            DelayModel::Degenerate { .. } => DelayFamily::Degenerate,
            DelayModel::Uniform { .. } => DelayFamily::Uniform,
            DelayModel::Exponential { .. } => DelayFamily::Exponential,
            DelayModel::Gamma { .. } => DelayFamily::Gamma,
            DelayModel::LogNormal { .. } => DelayFamily::LogNormal,
            DelayModel::Weibull { .. } => DelayFamily::Weibull,
            DelayModel::Normal { .. } => DelayFamily::Normal,
        }
    }

    /// Draws a delay. The result may be negative (normal) or huge; callers clip it.
    /// Parameters that the distribution rejects yield a zero delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            DelayModel::Degenerate { value } => value,
            DelayModel::Uniform { max } => {
                if max > 0.0 && max.is_finite() {
                    rng.gen_range(0.0..=max)
                } else {
                    0.0
                }
            }
            DelayModel::Exponential { rate } => Exp::new(rate)
                .map(|d| d.sample(rng))
                .unwrap_or(0.0),
            DelayModel::Gamma { shape, scale } => Gamma::new(shape, scale)
                .map(|d| d.sample(rng))
                .unwrap_or(0.0),
            DelayModel::LogNormal { mu, sigma } => LogNormal::new(mu, sigma)
                .map(|d| d.sample(rng))
                .unwrap_or(0.0),
            DelayModel::Weibull { shape, scale } => Weibull::new(scale, shape)
                .map(|d| d.sample(rng))
                .unwrap_or(0.0),
            DelayModel::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(|d| d.sample(rng))
                .unwrap_or(0.0),
        }
    }

    /// Cumulative distribution function.
    pub fn cdf(&self, x: f64) -> f64 {
        match *self {
            DelayModel::Degenerate { value } => {
                if x >= value {
                    1.0
                } else {
                    0.0
                }
            }
            DelayModel::Uniform { max } => {
                if max <= 0.0 {
                    if x >= 0.0 { 1.0 } else { 0.0 }
                } else {
                    (x / max).clamp(0.0, 1.0)
                }
            }
            DelayModel::Exponential { rate } => {
                if x <= 0.0 {
                    0.0
                } else {
                    1.0 - (-rate * x).exp()
                }
            }
            DelayModel::Gamma { shape, scale } => regularised_lower_gamma(shape, x / scale),
            DelayModel::LogNormal { mu, sigma } => {
                if x <= 0.0 {
                    0.0
                } else {
                    standard_normal_cdf((x.ln() - mu) / sigma)
                }
            }
            DelayModel::Weibull { shape, scale } => {
                if x <= 0.0 {
                    0.0
                } else {
                    1.0 - (-(x / scale).powf(shape)).exp()
                }
            }
            DelayModel::Normal { mean, std_dev } => standard_normal_cdf((x - mean) / std_dev),
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            DelayModel::Degenerate { value } => value,
            DelayModel::Uniform { max } => max / 2.0,
            DelayModel::Exponential { rate } => 1.0 / rate,
            DelayModel::Gamma { shape, scale } => shape * scale,
            DelayModel::LogNormal { mu, sigma } => (mu + sigma * sigma / 2.0).exp(),
            DelayModel::Weibull { shape, scale } => {
                scale * crate::math::special_functions::ln_gamma(1.0 + 1.0 / shape).exp()
            }
            DelayModel::Normal { mean, .. } => mean,
        }
    }

    pub fn get_parameters(&self) -> Vec<(&'static str, f64)> {
        match *self {
            DelayModel::Degenerate { value } => vec![("value", value)],
            DelayModel::Uniform { max } => vec![("min", 0.0), ("max", max)],
            DelayModel::Exponential { rate } => vec![("rate", rate)],
            DelayModel::Gamma { shape, scale } => vec![("shape", shape), ("scale", scale)],
            DelayModel::LogNormal { mu, sigma } => vec![("mu", mu), ("sigma", sigma)],
            DelayModel::Weibull { shape, scale } => vec![("shape", shape), ("scale", scale)],
            DelayModel::Normal { mean, std_dev } => vec![("mean", mean), ("std_dev", std_dev)],
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "family".to_string(),
            Value::String(self.get_family().to_string()),
        );
        for (name, value) in self.get_parameters() {
            object.insert(
                name.to_string(),
                serde_json::Number::from_f64(value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        }
        Value::Object(object)
    }
}

impl Display for DelayModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.get_family())?;
        for (i, (name, value)) in self.get_parameters().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:.6}", name, value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    use super::{DelayFamily, DelayModel};

    #[test]
    fn degenerate_and_uniform() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(DelayModel::zero().sample(&mut rng), 0.0);
        assert_eq!(DelayModel::Uniform { max: 0.0 }.sample(&mut rng), 0.0);
        for _ in 0..100 {
            let x = DelayModel::Uniform { max: 4.0 }.sample(&mut rng);
            assert!((0.0..=4.0).contains(&x));
        }
    }

    #[test]
    fn invalid_parameters_sample_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(DelayModel::Exponential { rate: -1.0 }.sample(&mut rng), 0.0);
        assert_eq!(
            DelayModel::Gamma {
                shape: 0.0,
                scale: 1.0
            }
            .sample(&mut rng),
            0.0
        );
    }

    #[test]
    fn sample_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let model = DelayModel::Exponential { rate: 2.0 };
        let n = 20000;
        let mean = (0..n).map(|_| model.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 0.5).abs() < 0.05);
        assert_eq!(model.mean(), 0.5);
    }

    #[test]
    fn cdfs() {
        let exponential = DelayModel::Exponential { rate: 1.0 };
        let gamma = DelayModel::Gamma {
            shape: 1.0,
            scale: 1.0,
        };
        let weibull = DelayModel::Weibull {
            shape: 1.0,
            scale: 1.0,
        };
        for x in [0.1, 0.5, 2.0] {
            assert!((exponential.cdf(x) - gamma.cdf(x)).abs() < 1e-9);
            assert!((exponential.cdf(x) - weibull.cdf(x)).abs() < 1e-9);
        }
        let lognormal = DelayModel::LogNormal { mu: 0.0, sigma: 1.0 };
        assert!((lognormal.cdf(1.0) - 0.5).abs() < 1e-6);
        assert_eq!(lognormal.cdf(-1.0), 0.0);
    }

    #[test]
    fn families() {
        for family in DelayFamily::iter() {
            assert_eq!(DelayFamily::from_str(&family.to_string()).unwrap(), family);
        }
        assert_eq!(
            DelayModel::LogNormal { mu: 0.0, sigma: 1.0 }
                .get_family()
                .to_string(),
            "lognormal"
        );
        assert_eq!(
            DelayModel::Exponential { rate: 2.0 }.to_string(),
            "exponential(rate=2.000000)"
        );
    }
}
