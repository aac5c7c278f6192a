use crate::cells::CellArray;
use crate::config::TimingFilterConfig;
use crate::error::{FilterError, Result};
use crate::hash::{cell_indexes, optimal_num_cells, optimal_num_hashes};
use crate::tick::TickClock;
use crate::ticker::{Ticker, TickerHandle};
use crate::traits::{TimingFilterOps, TimingFilterStats};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// A Bloom filter whose entries expire.
///
/// Instead of one bit, every Bloom position holds a 4-bit tick stamp
/// recording when it was last touched. `contains` accepts a key only if
/// all its cells carry ticks inside the current valid window, and the
/// periodic decay sweep clears cells that have fallen out of it, so a key
/// stops being reported roughly `decay_time` after its last `add`.
///
/// All methods take `&self`; interior locking serializes writers. The
/// wall clock and the periodic sweep both come from the injected
/// [`Ticker`].
pub struct TimingBloomFilter {
    core: Arc<FilterCore>,
    decay_handle: Mutex<Option<TickerHandle>>,
}

struct FilterCore {
    config: TimingFilterConfig,
    tier: usize,
    num_cells: usize,
    num_hashes: usize,
    clock: TickClock,
    ticker: Arc<dyn Ticker>,
    state: RwLock<CellState>,
}

struct CellState {
    cells: CellArray,
    nonzero_cells: usize,
}

impl TimingBloomFilter {
    pub fn new(config: TimingFilterConfig, ticker: Arc<dyn Ticker>) -> Result<Self> {
        Self::with_tier(config, 0, ticker)
    }

    /// Builds a filter carrying a tier index, used by the scaling
    /// controller to derive per-tier capacity and error budgets.
    pub(crate) fn with_tier(
        config: TimingFilterConfig,
        tier: usize,
        ticker: Arc<dyn Ticker>,
    ) -> Result<Self> {
        config.validate()?;

        let num_cells = optimal_num_cells(config.capacity, config.error_rate);
        let num_hashes = optimal_num_hashes(config.capacity, num_cells);
        let clock = TickClock::new(config.decay_time);

        debug!(
            capacity = config.capacity,
            num_cells, num_hashes, tier, "creating timing bloom filter"
        );

        Ok(Self {
            core: Arc::new(FilterCore {
                config,
                tier,
                num_cells,
                num_hashes,
                clock,
                ticker,
                state: RwLock::new(CellState {
                    cells: CellArray::new(num_cells),
                    nonzero_cells: 0,
                }),
            }),
            decay_handle: Mutex::new(None),
        })
    }

    /// The sweep cadence [`start`](Self::start) registers: half the decay
    /// time. Callers running their own loop must call
    /// [`decay`](TimingFilterOps::decay) at least this often.
    pub fn decay_interval(&self) -> Duration {
        self.core.config.decay_time / 2
    }

    pub fn decay_time(&self) -> Duration {
        self.core.config.decay_time
    }

    pub fn tier(&self) -> usize {
        self.core.tier
    }

    pub fn num_hashes(&self) -> usize {
        self.core.num_hashes
    }

    /// Whether the periodic decay callback is currently registered.
    pub fn is_running(&self) -> bool {
        self.decay_handle.lock().is_some()
    }
}

impl FilterCore {
    fn add(&self, key: &[u8]) -> usize {
        let tick = self.clock.current(self.ticker.now());
        let mut state = self.state.write();
        for index in cell_indexes(key, self.num_hashes, self.num_cells) {
            if state.cells.set(index, tick) == 0 {
                state.nonzero_cells += 1;
            }
        }
        state.nonzero_cells
    }

    fn contains(&self, key: &[u8]) -> bool {
        let window = self.clock.window(self.ticker.now());
        let state = self.state.read();
        cell_indexes(key, self.num_hashes, self.num_cells)
            .into_iter()
            .all(|index| window.contains(state.cells.get(index)))
    }

    fn decay(&self) {
        let window = self.clock.window(self.ticker.now());
        let mut state = self.state.write();
        let mut nonzero_cells = 0;
        for index in 0..state.cells.len() {
            let value = state.cells.get(index);
            if value == 0 {
                continue;
            }
            if window.contains(value) {
                nonzero_cells += 1;
            } else {
                state.cells.clear(index);
            }
        }
        state.nonzero_cells = nonzero_cells;
    }

    fn size_estimate(&self) -> f64 {
        let nonzero_cells = self.state.read().nonzero_cells;
        if nonzero_cells == 0 {
            return 0.0;
        }
        let num_cells = self.num_cells as f64;
        // clamp the fill away from 1.0 so a saturated filter yields a
        // large finite estimate instead of ln(0)
        let fill = (nonzero_cells as f64 / num_cells).min(1.0 - f64::EPSILON);
        -(num_cells / self.num_hashes as f64) * (1.0 - fill).ln()
    }
}

impl TimingFilterOps for TimingBloomFilter {
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
        let core: Weak<FilterCore> = Arc::downgrade(&self.core);
        let id = self.core.ticker.schedule_periodic(
            Box::new(move || {
                // weak so a dropped filter is not kept alive by its timer
                if let Some(core) = core.upgrade() {
                    core.decay();
                }
            }),
            self.decay_interval(),
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

impl TimingFilterStats for TimingBloomFilter {
    fn capacity(&self) -> usize {
        self.core.config.capacity
    }

    fn error_rate(&self) -> f64 {
        self.core.config.error_rate
    }

    fn num_cells(&self) -> usize {
        self.core.num_cells
    }

    fn nonzero_cells(&self) -> usize {
        self.core.state.read().nonzero_cells
    }
}

impl Drop for TimingBloomFilter {
    fn drop(&mut self) {
        if let Some(id) = self.decay_handle.lock().take() {
            self.core.ticker.cancel(id);
        }
    }
}

impl std::fmt::Debug for TimingBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingBloomFilter")
            .field("capacity", &self.core.config.capacity)
            .field("error_rate", &self.core.config.error_rate)
            .field("decay_time", &self.core.config.decay_time)
            .field("num_cells", &self.core.num_cells)
            .field("num_hashes", &self.core.num_hashes)
            .field("tier", &self.core.tier)
            .finish()
    }
}
