use crate::error::Result;

/// Operations shared by [`TimingBloomFilter`] and
/// [`ScalingTimingBloomFilter`].
///
/// [`TimingBloomFilter`]: crate::filter::TimingBloomFilter
/// [`ScalingTimingBloomFilter`]: crate::scaling::ScalingTimingBloomFilter
pub trait TimingFilterOps {
    /// Records the key as observed now. Returns the nonzero-cell count of
    /// the filter that received the key, which the scaling controller uses
    /// to track fill.
    fn add(&self, key: &[u8]) -> usize;

    /// Whether the key was observed within the last `decay_time`. May
    /// report false positives at the configured rate, never false
    /// negatives inside the freshness window.
    fn contains(&self, key: &[u8]) -> bool;

    /// Sweeps every cell once, clearing ticks outside the valid window.
    fn decay(&self);

    /// Estimated number of currently-fresh keys.
    fn size_estimate(&self) -> f64;

    /// Registers the periodic decay callback with the ticker.
    fn start(&self) -> Result<()>;

    /// Deregisters the periodic decay callback.
    fn stop(&self) -> Result<()>;
}

/// Read-only statistics shared by both filter kinds. For the scaling
/// composite, cell and capacity figures are summed over live tiers.
pub trait TimingFilterStats {
    fn capacity(&self) -> usize;
    fn error_rate(&self) -> f64;
    fn num_cells(&self) -> usize;
    fn nonzero_cells(&self) -> usize;
}
