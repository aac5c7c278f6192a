use crate::config::{ScalingFilterConfig, TimingFilterConfig};
use crate::error::{FilterError, Result};
use crate::filter::TimingBloomFilter;
use crate::ticker::{Ticker, TickerHandle};
use crate::traits::{TimingFilterOps, TimingFilterStats};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A collection of [`TimingBloomFilter`]s that grows and shrinks with the
/// key stream.
///
/// Tiers are ordered by creation; the tail is the insertion target. When
/// the target's estimated fill crosses `max_fill_factor`, a new tier is
/// appended with `growth_factor` more capacity and a tighter error
/// budget, so the compound false-positive rate over every tier that ever
/// existed stays at or below the configured target. Decay sweeps all
/// tiers, reclaims the ones that emptied, and swaps a lone underfilled
/// oversized tier for a smaller one.
pub struct ScalingTimingBloomFilter {
    core: Arc<ScalingCore>,
    decay_handle: Mutex<Option<TickerHandle>>,
}

struct ScalingCore {
    config: ScalingFilterConfig,
    ticker: Arc<dyn Ticker>,
    filters: RwLock<Vec<TimingBloomFilter>>,
}

/// Point-in-time view of one tier, for introspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSnapshot {
    pub tier: usize,
    pub capacity: usize,
    pub nonzero_cells: usize,
}

impl ScalingTimingBloomFilter {
    pub fn new(config: ScalingFilterConfig, ticker: Arc<dyn Ticker>) -> Result<Self> {
        config.validate()?;

        let core = Arc::new(ScalingCore {
            config,
            ticker,
            filters: RwLock::new(Vec::new()),
        });
        // seed tier 0 as the initial insertion target
        let first = core.build_tier(0);
        core.filters.write().push(first);

        Ok(Self {
            core,
            decay_handle: Mutex::new(None),
        })
    }

    /// Number of live tiers.
    pub fn num_filters(&self) -> usize {
        self.core.filters.read().len()
    }

    /// Compound false-positive bound of the live tiers,
    /// 1 - Π(1 - ε_i). Always at or below the configured `error_rate`.
    pub fn expected_error(&self) -> f64 {
        let filters = self.core.filters.read();
        1.0 - filters
            .iter()
            .map(|filter| 1.0 - filter.error_rate())
            .product::<f64>()
    }

    pub fn tier_snapshots(&self) -> Vec<TierSnapshot> {
        self.core
            .filters
            .read()
            .iter()
            .map(|filter| TierSnapshot {
                tier: filter.tier(),
                capacity: filter.capacity(),
                nonzero_cells: filter.nonzero_cells(),
            })
            .collect()
    }

    pub fn decay_time(&self) -> std::time::Duration {
        self.core.config.decay_time
    }

    /// Whether the combined periodic decay callback is registered.
    pub fn is_running(&self) -> bool {
        self.decay_handle.lock().is_some()
    }
}

impl ScalingCore {
    fn build_tier(&self, tier: usize) -> TimingBloomFilter {
        let config = TimingFilterConfig {
            capacity: self.config.capacity_for_tier(tier),
            decay_time: self.config.decay_time,
            error_rate: self.config.error_for_tier(tier),
        };
        TimingBloomFilter::with_tier(config, tier, Arc::clone(&self.ticker))
            .expect("tier parameters derive from a validated config")
    }

    fn add(&self, key: &[u8]) -> usize {
        let mut filters = self.filters.write();
        let target_full = match filters.last() {
            Some(target) => {
                target.size_estimate()
                    >= self.config.max_fill_factor * target.capacity() as f64
            }
            None => true,
        };
        if target_full {
            let tier = filters.iter().map(|f| f.tier() + 1).max().unwrap_or(0);
            debug!(tier, live = filters.len() + 1, "insertion target full, adding tier");
            filters.push(self.build_tier(tier));
        }
        filters
            .last()
            .expect("insertion target exists after the scaling check")
            .add(key)
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.filters
            .read()
            .iter()
            .any(|filter| filter.contains(key))
    }

    fn decay(&self) {
        let mut filters = self.filters.write();
        for filter in filters.iter() {
            filter.decay();
        }

        // reclaim fully-decayed tiers; the insertion target survives even
        // when empty
        if let Some(target) = filters.len().checked_sub(1) {
            let mut index = 0;
            filters.retain(|filter| {
                let keep = index == target || filter.nonzero_cells() > 0;
                if !keep {
                    debug!(tier = filter.tier(), "reclaiming empty tier");
                }
                index += 1;
                keep
            });
        }

        // shrink: a lone oversized tier that went quiet is replaced by the
        // next smaller one; it empties out and is reclaimed by a later sweep
        if filters.len() == 1 {
            let (tier, estimate, capacity) = {
                let filter = &filters[0];
                (filter.tier(), filter.size_estimate(), filter.capacity())
            };
            if tier > 0
                && estimate > 0.0
                && estimate < self.config.min_fill_factor * capacity as f64
            {
                debug!(from_tier = tier, to_tier = tier - 1, "shrinking insertion target");
                filters.push(self.build_tier(tier - 1));
            }
        }
    }

    fn size_estimate(&self) -> f64 {
        self.filters
            .read()
            .iter()
            .map(|filter| filter.size_estimate())
            .sum()
    }
}

impl TimingFilterOps for ScalingTimingBloomFilter {
    fn add(&self, key: &[u8]) -> usize {
        self.core.add(key)
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.core.contains(key)
    }

    fn decay(&self) {
        self.core.decay();
    }

    fn size_estimate(&self) -> f64 {
        self.core.size_estimate()
    }

    fn start(&self) -> Result<()> {
        let mut handle = self.decay_handle.lock();
        if handle.is_some() {
            return Err(FilterError::AlreadyStarted);
        }
        let core: Weak<ScalingCore> = Arc::downgrade(&self.core);
        let id = self.core.ticker.schedule_periodic(
            Box::new(move || {
                if let Some(core) = core.upgrade() {
                    core.decay();
                }
            }),
            self.core.config.decay_time / 2,
        );
        *handle = Some(id);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        match self.decay_handle.lock().take() {
            Some(id) => {
                self.core.ticker.cancel(id);
                Ok(())
            }
            None => Err(FilterError::NotStarted),
        }
    }
}

impl TimingFilterStats for ScalingTimingBloomFilter {
    fn capacity(&self) -> usize {
        self.core
            .filters
            .read()
            .iter()
            .map(|filter| filter.capacity())
            .sum()
    }

    fn error_rate(&self) -> f64 {
        self.core.config.error_rate
    }

    fn num_cells(&self) -> usize {
        self.core
            .filters
            .read()
            .iter()
            .map(|filter| filter.num_cells())
            .sum()
    }

    fn nonzero_cells(&self) -> usize {
        self.core
            .filters
            .read()
            .iter()
            .map(|filter| filter.nonzero_cells())
            .sum()
    }
}

impl Drop for ScalingTimingBloomFilter {
    fn drop(&mut self) {
        if let Some(id) = self.decay_handle.lock().take() {
            self.core.ticker.cancel(id);
        }
    }
}

impl std::fmt::Debug for ScalingTimingBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalingTimingBloomFilter")
            .field("capacity", &self.core.config.capacity)
            .field("error_rate", &self.core.config.error_rate)
            .field("decay_time", &self.core.config.decay_time)
            .field("num_filters", &self.num_filters())
            .finish()
    }
}
