use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FilterError, Result};

/// Construction parameters for a single [`TimingBloomFilter`].
///
/// [`TimingBloomFilter`]: crate::filter::TimingBloomFilter
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct TimingFilterConfig {
    /// Expected number of unique keys within one `decay_time`.
    pub capacity: usize,

    /// How long an added key stays fresh.
    pub decay_time: Duration,

    /// Target false-positive rate at capacity.
    #[builder(default = "0.005")]
    pub error_rate: f64,
}

impl TimingFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidConfig(
                "Capacity must be greater than 0".to_string(),
            ));
        }
        if self.error_rate <= 0.0 || self.error_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Error rate must be between 0 and 1".to_string(),
            ));
        }
        if self.decay_time.is_zero() {
            return Err(FilterError::InvalidConfig(
                "Decay time must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Construction parameters for a [`ScalingTimingBloomFilter`].
///
/// The base `capacity`/`error_rate`/`decay_time` triple describes tier 0;
/// each further tier grows its capacity by `growth_factor` and tightens
/// its error budget by `error_tightening_ratio`, which keeps the compound
/// false-positive rate of the whole collection at or below `error_rate`.
///
/// [`ScalingTimingBloomFilter`]: crate::scaling::ScalingTimingBloomFilter
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct ScalingFilterConfig {
    /// Expected unique keys within one `decay_time` for the first tier.
    pub capacity: usize,

    /// How long an added key stays fresh.
    pub decay_time: Duration,

    /// Compound false-positive target across all tiers.
    #[builder(default = "0.005")]
    pub error_rate: f64,

    /// Per-tier error budget ratio ε_{i+1} / ε_i.
    #[builder(default = "0.9")]
    pub error_tightening_ratio: f64,

    /// Per-tier capacity ratio N_{i+1} / N_i.
    #[builder(default = "2.0 * std::f64::consts::SQRT_2")]
    pub growth_factor: f64,

    /// Estimated fill above which the insertion target is considered full
    /// and a new tier is added.
    #[builder(default = "0.9")]
    pub max_fill_factor: f64,

    /// Estimated fill below which a lone oversized tier is replaced by a
    /// smaller one.
    #[builder(default = "0.2")]
    pub min_fill_factor: f64,
}

impl ScalingFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidConfig(
                "Capacity must be greater than 0".to_string(),
            ));
        }
        if self.error_rate <= 0.0 || self.error_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Error rate must be between 0 and 1".to_string(),
            ));
        }
        if self.decay_time.is_zero() {
            return Err(FilterError::InvalidConfig(
                "Decay time must be greater than 0".to_string(),
            ));
        }
        if self.error_tightening_ratio <= 0.0 || self.error_tightening_ratio >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Error tightening ratio must be between 0 and 1".to_string(),
            ));
        }
        if self.growth_factor <= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Growth factor must be greater than 1".to_string(),
            ));
        }
        if self.max_fill_factor <= 0.0 || self.max_fill_factor >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Max fill factor must be between 0 and 1".to_string(),
            ));
        }
        if self.min_fill_factor <= 0.0 || self.min_fill_factor >= 1.0 {
            return Err(FilterError::InvalidConfig(
                "Min fill factor must be between 0 and 1".to_string(),
            ));
        }
        if self.min_fill_factor >= self.max_fill_factor {
            return Err(FilterError::InvalidConfig(
                "Min fill factor must be below max fill factor".to_string(),
            ));
        }
        Ok(())
    }

    /// Error budget of the first tier. With ε_0 = ε · (1 - r) the
    /// geometric series Σ ε_0 · r^i sums to exactly the configured
    /// compound target.
    pub fn tier_zero_error(&self) -> f64 {
        self.error_rate * (1.0 - self.error_tightening_ratio)
    }

    /// Error budget for tier `i`: ε_i = ε_0 · r^i.
    pub fn error_for_tier(&self, tier: usize) -> f64 {
        self.tier_zero_error() * self.error_tightening_ratio.powi(tier as i32)
    }

    /// Capacity for tier `i`: N_i = round(N_0 · g^i), floored at 1.
    pub fn capacity_for_tier(&self, tier: usize) -> usize {
        let capacity = self.capacity as f64 * self.growth_factor.powi(tier as i32);
        (capacity.round() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_scaling_config() -> ScalingFilterConfig {
        ScalingFilterConfigBuilder::default()
            .capacity(1000_usize)
            .decay_time(Duration::from_secs(60))
            .build()
            .expect("Failed to build config")
    }

    #[test]
    fn test_defaults() {
        let config = base_scaling_config();
        assert_eq!(config.error_rate, 0.005);
        assert_eq!(config.error_tightening_ratio, 0.9);
        assert!((config.growth_factor - 2.0 * std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(config.max_fill_factor, 0.9);
        assert_eq!(config.min_fill_factor, 0.2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tier_error_budget_sums_to_target() {
        let config = base_scaling_config();
        let total: f64 = (0..1000).map(|i| config.error_for_tier(i)).sum();
        assert!(
            total <= config.error_rate + 1e-12,
            "budget sum {total} exceeds target {}",
            config.error_rate
        );
        assert!((total - config.error_rate).abs() < 1e-6);
    }

    #[test]
    fn test_tier_capacity_growth() {
        let config = ScalingFilterConfigBuilder::default()
            .capacity(30_usize)
            .decay_time(Duration::from_secs(60))
            .growth_factor(2.0)
            .build()
            .unwrap();
        assert_eq!(config.capacity_for_tier(0), 30);
        assert_eq!(config.capacity_for_tier(1), 60);
        assert_eq!(config.capacity_for_tier(2), 120);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let ok = base_scaling_config();

        let mut bad = ok.clone();
        bad.capacity = 0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.error_rate = 1.0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.decay_time = Duration::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.growth_factor = 1.0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.error_tightening_ratio = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.min_fill_factor = 0.95;
        assert!(bad.validate().is_err(), "min fill above max fill");
    }
}
