//! Time-decaying Bloom filters for streaming deduplication.
//!
//! Answers "was this key observed in the last `decay_time` seconds?" with
//! a tunable false-positive rate and a few bits per element, for pipelines
//! where an exact set would cost too much memory.
//!
//! How it works:
//!    * Every Bloom position is a 4-bit cell storing a cyclic tick stamp
//!      instead of a single bit; 0 means empty, 1..=15 name the time
//!      bucket the cell was last touched in.
//!    * The tick clock advances once per `decay_time / 7`, so the valid
//!      window (the last 7 ticks) spans half the 15-tick ring and a cell
//!      older than `decay_time` is recognizably stale from a local read.
//!    * A periodic decay sweep clears stale cells before their ticks could
//!      wrap back into the window; `start`/`stop` register it on an
//!      injected [`Ticker`], and `decay` can also be driven by hand.
//!    * [`ScalingTimingBloomFilter`] keeps an ordered list of filters with
//!      geometrically growing capacities and tightening error budgets,
//!      appending a tier when the insertion target fills up and reclaiming
//!      tiers that decay to empty, so the compound false-positive rate
//!      stays below the configured target at any load.
//!
//! Trade-offs:
//!    * No per-key deletion: entries only leave by decaying.
//!    * Expiry is quantized to the tick width, so a key can go stale up to
//!      one tick before `decay_time` has fully elapsed.
//!    * A single logical writer is assumed; cell updates are
//!      read-modify-write on shared bytes behind the filter's lock.

pub mod cells;
pub mod config;
pub mod error;
pub mod filter;
pub mod hash;
pub mod scaling;
pub mod tick;
pub mod ticker;
pub mod traits;

pub use config::{
    ScalingFilterConfig, ScalingFilterConfigBuilder, TimingFilterConfig,
    TimingFilterConfigBuilder,
};
pub use error::{FilterError, Result};
pub use filter::TimingBloomFilter;
pub use hash::{cell_indexes, optimal_num_cells, optimal_num_hashes};
pub use scaling::{ScalingTimingBloomFilter, TierSnapshot};
pub use ticker::{ManualTicker, Ticker, TickerCallback, TickerHandle, TokioTicker};
pub use traits::{TimingFilterOps, TimingFilterStats};
