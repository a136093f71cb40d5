//! ## availsim-core::random::distribution
//! **Interval samplers for stochastic producers**
//!
//! A [`Distribution`] is immutable configuration: it holds parameters only
//! and draws from whatever stream it is handed, so duplicating a producer
//! duplicates its distributions without sharing any random state.

use rand::distr::Uniform;
use rand_distr::{Distribution as _, Exp, Normal, Weibull};

use super::RandomStream;
use crate::error::{DistributionError, ProducerError};
use crate::time::SimTime;

#[derive(Clone, Debug)]
enum Sampler {
    Exponential(Exp<f64>),
    Constant(f64),
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    Weibull(Weibull<f64>),
}

/// A parameterised sampler producing interval values.
#[derive(Clone, Debug)]
pub struct Distribution {
    name: &'static str,
    sampler: Sampler,
}

impl Distribution {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Draws one raw value.
    pub fn sample(&self, stream: &mut RandomStream) -> f64 {
        match &self.sampler {
            Sampler::Exponential(d) => d.sample(stream),
            Sampler::Constant(v) => *v,
            Sampler::Uniform(d) => d.sample(stream),
            Sampler::Normal(d) => d.sample(stream),
            Sampler::Weibull(d) => d.sample(stream),
        }
    }

    /// Draws one interval in whole time units.
    ///
    /// Rounds to the nearest unit with a floor of 1, since wake times must lie
    /// strictly in the future. Negative or non-finite draws are sampling faults.
    pub fn sample_interval(&self, stream: &mut RandomStream) -> Result<SimTime, ProducerError> {
        let value = self.sample(stream);
        if !value.is_finite() || value < 0.0 {
            return Err(ProducerError::Sampling(format!(
                "{} distribution produced invalid interval {value}",
                self.name
            )));
        }
        let units = value.round();
        if units >= SimTime::MAX as f64 {
            return Err(ProducerError::Sampling(format!(
                "{} distribution produced interval {value} beyond simulated time range",
                self.name
            )));
        }
        Ok((units as SimTime).max(1))
    }
}

/// Stateless factory for [`Distribution`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DistributionProvider;

impl DistributionProvider {
    pub fn new() -> Self {
        Self
    }

    /// Exponential distribution with the given mean.
    pub fn exponential(&self, mean: f64) -> Result<Distribution, DistributionError> {
        require_positive("exponential", "mean", mean)?;
        let exp = Exp::new(1.0 / mean)
            .map_err(|e| DistributionError::new("exponential", e.to_string()))?;
        Ok(Distribution {
            name: "exponential",
            sampler: Sampler::Exponential(exp),
        })
    }

    /// Always yields `value`.
    pub fn constant(&self, value: f64) -> Result<Distribution, DistributionError> {
        if !value.is_finite() || value < 0.0 {
            return Err(DistributionError::new(
                "constant",
                format!("value must be finite and non-negative, got {value}"),
            ));
        }
        Ok(Distribution {
            name: "constant",
            sampler: Sampler::Constant(value),
        })
    }

    /// Uniform over `[low, high)`.
    pub fn uniform(&self, low: f64, high: f64) -> Result<Distribution, DistributionError> {
        if !low.is_finite() || low < 0.0 {
            return Err(DistributionError::new(
                "uniform",
                format!("low bound must be finite and non-negative, got {low}"),
            ));
        }
        let uniform =
            Uniform::new(low, high).map_err(|e| DistributionError::new("uniform", e.to_string()))?;
        Ok(Distribution {
            name: "uniform",
            sampler: Sampler::Uniform(uniform),
        })
    }

    /// Normal distribution. Draws below zero fail the run when sampled as an
    /// interval, so keep `mean` several deviations above zero.
    pub fn normal(&self, mean: f64, std_dev: f64) -> Result<Distribution, DistributionError> {
        require_positive("normal", "mean", mean)?;
        let normal =
            Normal::new(mean, std_dev).map_err(|e| DistributionError::new("normal", e.to_string()))?;
        Ok(Distribution {
            name: "normal",
            sampler: Sampler::Normal(normal),
        })
    }

    /// Weibull distribution, common for wear-out failure modelling.
    pub fn weibull(&self, scale: f64, shape: f64) -> Result<Distribution, DistributionError> {
        require_positive("weibull", "scale", scale)?;
        require_positive("weibull", "shape", shape)?;
        let weibull = Weibull::new(scale, shape)
            .map_err(|e| DistributionError::new("weibull", e.to_string()))?;
        Ok(Distribution {
            name: "weibull",
            sampler: Sampler::Weibull(weibull),
        })
    }
}

fn require_positive(
    distribution: &'static str,
    parameter: &str,
    value: f64,
) -> Result<(), DistributionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DistributionError::new(
            distribution,
            format!("{parameter} must be finite and positive, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::RandomProvider;

    #[test]
    fn exponential_mean_converges() {
        let dist = DistributionProvider::new().exponential(250.0).unwrap();
        let mut stream = RandomProvider::new(11).stream_for("exp");
        let n = 200_000;
        let total: f64 = (0..n).map(|_| dist.sample(&mut stream)).sum();
        let mean = total / n as f64;
        assert!((mean - 250.0).abs() < 250.0 * 0.02, "mean was {mean}");
    }

    #[test]
    fn rejects_non_positive_mean() {
        let provider = DistributionProvider::new();
        assert!(provider.exponential(0.0).is_err());
        assert!(provider.exponential(-3.0).is_err());
        assert!(provider.exponential(f64::NAN).is_err());
        assert!(provider.weibull(1.0, 0.0).is_err());
        assert!(provider.uniform(5.0, 1.0).is_err());
    }

    #[test]
    fn intervals_are_at_least_one_unit() {
        let dist = DistributionProvider::new().constant(0.2).unwrap();
        let mut stream = RandomProvider::new(0).stream_for("c");
        assert_eq!(dist.sample_interval(&mut stream), Ok(1));
    }

    #[test]
    fn intervals_round_to_nearest_unit() {
        let provider = DistributionProvider::new();
        let mut stream = RandomProvider::new(0).stream_for("c");
        assert_eq!(provider.constant(7.4).unwrap().sample_interval(&mut stream), Ok(7));
        assert_eq!(provider.constant(7.5).unwrap().sample_interval(&mut stream), Ok(8));
    }

    #[test]
    fn negative_draw_is_a_sampling_fault() {
        // Mean 1 with a huge deviation goes negative almost immediately.
        let dist = DistributionProvider::new().normal(1.0, 1_000.0).unwrap();
        let mut stream = RandomProvider::new(3).stream_for("n");
        let failed = (0..100).any(|_| {
            matches!(dist.sample_interval(&mut stream), Err(ProducerError::Sampling(_)))
        });
        assert!(failed);
    }

    #[test]
    fn uniform_stays_in_range() {
        let dist = DistributionProvider::new().uniform(10.0, 20.0).unwrap();
        let mut stream = RandomProvider::new(4).stream_for("u");
        for _ in 0..1_000 {
            let v = dist.sample(&mut stream);
            assert!((10.0..20.0).contains(&v));
        }
    }
}
