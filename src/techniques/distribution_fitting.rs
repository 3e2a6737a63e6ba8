use itertools::Itertools;

use crate::{
    ebi_framework::simulation_config::SimulationConfig,
    math::{
        delay_model::{DelayFamily, DelayModel},
        special_functions::{digamma, trigamma},
    },
};

const NEWTON_ITERATIONS: usize = 200;
const NEWTON_TOLERANCE: f64 = 1e-10;

/// A fitted model together with its one-sample Kolmogorov-Smirnov statistic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fit {
    pub model: DelayModel,
    pub ks_statistic: Option<f64>,
}

/**
 * Chooses a waiting-time model for the samples.
 *
 * Without samples, the delay is zero. With fewer than `min_samples_for_fitting` samples, the delay
 * is uniform on [0, 2·mean]. Otherwise, every enabled family is fitted by maximum likelihood and the
 * one with the lowest Kolmogorov-Smirnov statistic is returned, where a family with more parameters
 * has to beat a simpler one by more than `parsimony_margin`. Families that cannot be fitted are left
 * out; if none remains, the uniform model is used.
 *
 * Fitting is deterministic.
 */
pub fn fit(samples: &[f64], config: &SimulationConfig) -> Fit {
    let samples = samples
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect::<Vec<_>>();

    if samples.is_empty() {
        return Fit {
            model: DelayModel::zero(),
            ks_statistic: None,
        };
    }

    let mean = mean(&samples);
    let fallback = Fit {
        model: DelayModel::Uniform { max: 2.0 * mean },
        ks_statistic: None,
    };

    if samples.len() < config.min_samples_for_fitting {
        return fallback;
    }

    if samples.iter().all(|x| *x == samples[0]) {
        return Fit {
            model: DelayModel::Degenerate { value: samples[0] },
            ks_statistic: Some(0.0),
        };
    }

    let sorted = samples
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect::<Vec<_>>();

    let mut best: Option<Fit> = None;
    for family in enabled_families(config) {
        let model = match fit_family(family, &sorted) {
            Some(model) => model,
            None => {
                log::debug!("could not fit {} to {} samples", family, sorted.len());
                continue;
            }
        };
        let ks = ks_statistic(&sorted, &model);
        if !ks.is_finite() {
            continue;
        }
        log::debug!("fitted {} with KS statistic {:.6}", model, ks);

        let candidate = Fit {
            model,
            ks_statistic: Some(ks),
        };
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let current_ks = current.ks_statistic.unwrap_or(f64::INFINITY);
                let margin = if family.get_number_of_parameters()
                    > current.model.get_family().get_number_of_parameters()
                {
                    config.parsimony_margin
                } else {
                    0.0
                };
                if ks + margin < current_ks {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.unwrap_or(fallback)
}

pub fn enabled_families(config: &SimulationConfig) -> Vec<DelayFamily> {
    let mut result = vec![
        DelayFamily::Exponential,
        DelayFamily::Gamma,
        DelayFamily::LogNormal,
        DelayFamily::Weibull,
    ];
    if config.include_normal {
        result.push(DelayFamily::Normal);
    }
    result
}

/// Maximum-likelihood fit of a family; `None` if the samples do not allow one.
pub fn fit_family(family: DelayFamily, samples: &[f64]) -> Option<DelayModel> {
    match family {
        DelayFamily::Exponential => fit_exponential(samples),
        DelayFamily::Gamma => fit_gamma(samples),
        DelayFamily::LogNormal => fit_lognormal(samples),
        DelayFamily::Weibull => fit_weibull(samples),
        DelayFamily::Normal => fit_normal(samples),
        DelayFamily::Degenerate | DelayFamily::Uniform => None,
    }
}

/// The one-sample Kolmogorov-Smirnov statistic of sorted samples against the model.
pub fn ks_statistic(sorted_samples: &[f64], model: &DelayModel) -> f64 {
    let n = sorted_samples.len() as f64;
    sorted_samples
        .iter()
        .enumerate()
        .map(|(i, x)| {
            let cdf = model.cdf(*x);
            let above = (i + 1) as f64 / n - cdf;
            let below = cdf - i as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max)
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn all_positive(samples: &[f64]) -> bool {
    !samples.is_empty() && samples.iter().all(|x| *x > 0.0)
}

fn fit_exponential(samples: &[f64]) -> Option<DelayModel> {
    let mean = mean(samples);
    if mean > 0.0 && samples.iter().all(|x| *x >= 0.0) {
        Some(DelayModel::Exponential { rate: 1.0 / mean })
    } else {
        None
    }
}

fn fit_gamma(samples: &[f64]) -> Option<DelayModel> {
    if !all_positive(samples) {
        return None;
    }
    let mean = mean(samples);
    let mean_ln = samples.iter().map(|x| x.ln()).sum::<f64>() / samples.len() as f64;
    let s = mean.ln() - mean_ln;
    if s <= 0.0 || !s.is_finite() {
        return None;
    }

    //Newton on ln(k) - digamma(k) = s, starting from the closed-form approximation
    let mut shape = (3.0 - s + ((s - 3.0).powi(2) + 24.0 * s).sqrt()) / (12.0 * s);
    for _ in 0..NEWTON_ITERATIONS {
        let f = shape.ln() - digamma(shape) - s;
        let derivative = 1.0 / shape - trigamma(shape);
        let mut step = f / derivative;
        while shape - step <= 0.0 {
            step /= 2.0;
        }
        shape -= step;
        if step.abs() < NEWTON_TOLERANCE * shape {
            let scale = mean / shape;
            return valid(DelayModel::Gamma { shape, scale });
        }
    }
    None
}

fn fit_lognormal(samples: &[f64]) -> Option<DelayModel> {
    if !all_positive(samples) {
        return None;
    }
    let logs = samples.iter().map(|x| x.ln()).collect::<Vec<_>>();
    let mu = mean(&logs);
    let sigma = (logs.iter().map(|l| (l - mu).powi(2)).sum::<f64>() / logs.len() as f64).sqrt();
    if sigma > 0.0 {
        valid(DelayModel::LogNormal { mu, sigma })
    } else {
        None
    }
}

fn fit_weibull(samples: &[f64]) -> Option<DelayModel> {
    if !all_positive(samples) {
        return None;
    }

    //the shape does not depend on the unit, so work on samples in (0, 1] to avoid overflow
    let maximum = samples.iter().copied().fold(f64::MIN, f64::max);
    let scaled = samples.iter().map(|x| x / maximum).collect::<Vec<_>>();
    let logs = scaled.iter().map(|x| x.ln()).collect::<Vec<_>>();
    let mean_ln = mean(&logs);
    let std_ln = (logs.iter().map(|l| (l - mean_ln).powi(2)).sum::<f64>() / logs.len() as f64).sqrt();
    if std_ln <= 0.0 {
        return None;
    }

    //Newton on sum(x^k ln x) / sum(x^k) - 1/k - mean(ln x) = 0
    let mut shape = 1.2825 / std_ln;
    for _ in 0..NEWTON_ITERATIONS {
        let (mut s0, mut s1, mut s2) = (0.0, 0.0, 0.0);
        for (x, l) in scaled.iter().zip(logs.iter()) {
            let xk = x.powf(shape);
            s0 += xk;
            s1 += xk * l;
            s2 += xk * l * l;
        }
        let g = s1 / s0 - 1.0 / shape - mean_ln;
        let derivative = (s2 * s0 - s1 * s1) / (s0 * s0) + 1.0 / (shape * shape);
        let mut step = g / derivative;
        if !step.is_finite() {
            return None;
        }
        while shape - step <= 0.0 {
            step /= 2.0;
        }
        shape -= step;
        if step.abs() < NEWTON_TOLERANCE * shape {
            let s0 = scaled.iter().map(|x| x.powf(shape)).sum::<f64>();
            let scale = maximum * (s0 / scaled.len() as f64).powf(1.0 / shape);
            return valid(DelayModel::Weibull { shape, scale });
        }
    }
    None
}

fn fit_normal(samples: &[f64]) -> Option<DelayModel> {
    let mean = mean(samples);
    let std_dev =
        (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64).sqrt();
    if std_dev > 0.0 {
        valid(DelayModel::Normal { mean, std_dev })
    } else {
        None
    }
}

fn valid(model: DelayModel) -> Option<DelayModel> {
    if model
        .get_parameters()
        .iter()
        .all(|(_, value)| value.is_finite())
    {
        Some(model)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Gamma, Weibull};

    use crate::{
        ebi_framework::simulation_config::SimulationConfig,
        math::delay_model::{DelayFamily, DelayModel},
    };

    use super::{fit, fit_family, ks_statistic};

    fn exponential_quantiles(n: usize, rate: f64) -> Vec<f64> {
        (1..=n)
            .map(|i| -(1.0 - (i as f64 - 0.5) / n as f64).ln() / rate)
            .collect()
    }

    #[test]
    fn fit_empty_and_small() {
        let config = SimulationConfig::default();
        assert_eq!(fit(&[], &config).model, DelayModel::zero());
        assert_eq!(
            fit(&[1.0, 2.0, 3.0], &config).model,
            DelayModel::Uniform { max: 4.0 }
        );
    }

    #[test]
    fn fit_exponential_samples() {
        let config = SimulationConfig {
            parsimony_margin: 0.01,
            ..Default::default()
        };
        let samples = exponential_quantiles(200, 2.0);
        let result = fit(&samples, &config);
        assert_eq!(result.model.get_family(), DelayFamily::Exponential);
        assert!((result.model.mean() - 0.5).abs() < 0.05);
        assert!(result.ks_statistic.unwrap() < 0.05);
    }

    #[test]
    fn fit_default_margin_keeps_clear_winners() {
        let config = SimulationConfig::default();

        //few exponential samples stay exponential
        let samples = exponential_quantiles(70, 2.0);
        assert_eq!(fit(&samples, &config).model.get_family(), DelayFamily::Exponential);

        //a clearly non-exponential shape still gets a two-parameter family
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let gamma = Gamma::new(6.0, 1.0).unwrap();
        let samples = (0..1000).map(|_| gamma.sample(&mut rng)).collect::<Vec<_>>();
        assert_ne!(fit(&samples, &config).model.get_family(), DelayFamily::Exponential);
    }

    #[test]
    fn fit_is_deterministic() {
        let config = SimulationConfig::default();
        let samples = exponential_quantiles(100, 0.1);
        assert_eq!(fit(&samples, &config), fit(&samples, &config));
    }

    #[test]
    fn fit_negative_samples() {
        let samples = (0..100).map(|i| i as f64 - 49.5).collect::<Vec<_>>();

        //only the normal family accepts negative samples
        let config = SimulationConfig::default();
        assert_eq!(fit(&samples, &config).model.get_family(), DelayFamily::Normal);

        let config = SimulationConfig {
            include_normal: false,
            ..Default::default()
        };
        assert_eq!(fit(&samples, &config).model.get_family(), DelayFamily::Uniform);
    }

    #[test]
    fn fit_constant_samples() {
        let config = SimulationConfig::default();
        let samples = vec![3.0; 50];
        assert_eq!(fit(&samples, &config).model, DelayModel::Degenerate { value: 3.0 });
    }

    #[test]
    fn gamma_mle() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let gamma = Gamma::new(3.0, 2.0).unwrap();
        let samples = (0..5000).map(|_| gamma.sample(&mut rng)).collect::<Vec<_>>();

        match fit_family(DelayFamily::Gamma, &samples).unwrap() {
            DelayModel::Gamma { shape, scale } => {
                assert!((shape - 3.0).abs() < 0.3);
                assert!((scale - 2.0).abs() < 0.2);
            }
            other => panic!("unexpected model {}", other),
        }
    }

    #[test]
    fn weibull_mle() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let weibull = Weibull::new(5.0, 1.5).unwrap();
        let samples = (0..5000).map(|_| weibull.sample(&mut rng)).collect::<Vec<_>>();

        match fit_family(DelayFamily::Weibull, &samples).unwrap() {
            DelayModel::Weibull { shape, scale } => {
                assert!((shape - 1.5).abs() < 0.1);
                assert!((scale - 5.0).abs() < 0.3);
            }
            other => panic!("unexpected model {}", other),
        }
    }

    #[test]
    fn ks_of_perfect_fit() {
        let samples = exponential_quantiles(100, 1.0);
        let ks = ks_statistic(&samples, &DelayModel::Exponential { rate: 1.0 });
        assert!((ks - 0.005).abs() < 1e-9);
    }

    #[test]
    fn log_families_reject_zero() {
        let mut samples = exponential_quantiles(50, 1.0);
        samples.push(0.0);
        assert!(fit_family(DelayFamily::Gamma, &samples).is_none());
        assert!(fit_family(DelayFamily::LogNormal, &samples).is_none());
        assert!(fit_family(DelayFamily::Weibull, &samples).is_none());
        assert!(fit_family(DelayFamily::Exponential, &samples).is_some());
    }
}
