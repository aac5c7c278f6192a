use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TickerCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Opaque token returned by [`Ticker::schedule_periodic`], used to cancel
/// the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickerHandle(u64);

/// Clock and periodic-callback source injected into the filters.
///
/// A `Ticker` supplies the wall clock consulted on every operation and
/// runs the registered decay callbacks. Implementations may sit on a real
/// event loop ([`TokioTicker`]) or be driven by hand ([`ManualTicker`]).
pub trait Ticker: Send + Sync {
    /// Registers `callback` to fire every `interval`, first firing one
    /// interval from now.
    fn schedule_periodic(&self, callback: TickerCallback, interval: Duration) -> TickerHandle;

    /// Deregisters a callback. Unknown handles are ignored.
    fn cancel(&self, handle: TickerHandle);

    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// [`Ticker`] backed by the ambient tokio runtime.
///
/// Each registration spawns a task around [`tokio::time::interval`];
/// `schedule_periodic` must therefore run inside a runtime. Cancelling
/// aborts the task, and dropping the ticker aborts every outstanding one.
#[derive(Default)]
pub struct TokioTicker {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, tokio::task::JoinHandle<()>>>,
}

impl TokioTicker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ticker for TokioTicker {
    fn schedule_periodic(&self, callback: TickerCallback, interval: Duration) -> TickerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick of a tokio interval completes immediately
            timer.tick().await;
            loop {
                timer.tick().await;
                callback();
            }
        });
        self.tasks.lock().insert(id, task);
        TickerHandle(id)
    }

    fn cancel(&self, handle: TickerHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle.0) {
            task.abort();
        }
    }

    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl Drop for TokioTicker {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

/// Hand-driven [`Ticker`] for tests and embedders with their own loop.
///
/// Time only moves when [`advance`](ManualTicker::advance) or
/// [`set_now`](ManualTicker::set_now) is called. `advance` fires due
/// callbacks in timestamp order, moving the clock to each fire time
/// before invoking, so a callback that reads `now()` sees the instant it
/// was scheduled for.
pub struct ManualTicker {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: f64,
    next_id: u64,
    tasks: BTreeMap<u64, ManualTask>,
}

struct ManualTask {
    interval: f64,
    next_fire: f64,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl ManualTicker {
    /// A ticker whose clock starts at t = 0.
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(now: f64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                next_id: 0,
                tasks: BTreeMap::new(),
            }),
        }
    }

    /// Moves the clock forward by `seconds`, firing every registered
    /// callback that falls due along the way.
    pub fn advance(&self, seconds: f64) {
        let target = self.state.lock().now + seconds;
        loop {
            let due = {
                let mut state = self.state.lock();
                let candidate = state
                    .tasks
                    .iter()
                    .filter(|(_, task)| task.next_fire <= target)
                    .min_by(|(id_a, a), (id_b, b)| {
                        a.next_fire.total_cmp(&b.next_fire).then(id_a.cmp(id_b))
                    })
                    .map(|(&id, task)| (id, task.next_fire, Arc::clone(&task.callback)));
                match candidate {
                    Some((id, fire_at, callback)) => {
                        state.now = state.now.max(fire_at);
                        if let Some(task) = state.tasks.get_mut(&id) {
                            task.next_fire = fire_at + task.interval;
                        }
                        Some(callback)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            // invoke outside the lock: callbacks read the clock and may
            // re-enter schedule_periodic/cancel
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Jumps the clock to an absolute time without firing callbacks.
    /// Pending fire times keep their original schedule.
    pub fn set_now(&self, now: f64) {
        self.state.lock().now = now;
    }
}

impl Default for ManualTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for ManualTicker {
    fn schedule_periodic(&self, callback: TickerCallback, interval: Duration) -> TickerHandle {
        let interval = interval.as_secs_f64();
        debug_assert!(interval > 0.0, "periodic interval must be positive");
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let next_fire = state.now + interval;
        state.tasks.insert(
            id,
            ManualTask {
                interval,
                next_fire,
                callback: Arc::from(callback),
            },
        );
        TickerHandle(id)
    }

    fn cancel(&self, handle: TickerHandle) {
        self.state.lock().tasks.remove(&handle.0);
    }

    fn now(&self) -> f64 {
        self.state.lock().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_clock_starts_where_told() {
        let ticker = ManualTicker::starting_at(100.0);
        assert_eq!(ticker.now(), 100.0);
        ticker.advance(2.5);
        assert_eq!(ticker.now(), 102.5);
        ticker.set_now(7.0);
        assert_eq!(ticker.now(), 7.0);
    }

    #[test]
    fn test_manual_periodic_fires_per_interval() {
        let ticker = ManualTicker::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        ticker.schedule_periodic(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_secs(10),
        );

        ticker.advance(9.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0, "not due yet");
        ticker.advance(1.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        ticker.advance(35.0);
        assert_eq!(fired.load(Ordering::SeqCst), 4, "catches up missed fires");
    }

    #[test]
    fn test_manual_callback_sees_fire_time() {
        let ticker = Arc::new(ManualTicker::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ticker_ref = Arc::clone(&ticker);
        let seen_ref = Arc::clone(&seen);
        ticker.schedule_periodic(
            Box::new(move || {
                seen_ref.lock().push(ticker_ref.now());
            }),
            Duration::from_secs(5),
        );

        ticker.advance(12.0);
        assert_eq!(*seen.lock(), vec![5.0, 10.0]);
        assert_eq!(ticker.now(), 12.0);
    }

    #[test]
    fn test_manual_cancel_stops_firing() {
        let ticker = ManualTicker::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = ticker.schedule_periodic(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_secs(1),
        );

        ticker.advance(3.0);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        ticker.cancel(handle);
        ticker.advance(3.0);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_manual_interleaves_two_schedules() {
        let ticker = ManualTicker::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_a = Arc::clone(&order);
        let order_b = Arc::clone(&order);
        ticker.schedule_periodic(
            Box::new(move || order_a.lock().push('a')),
            Duration::from_secs(2),
        );
        ticker.schedule_periodic(
            Box::new(move || order_b.lock().push('b')),
            Duration::from_secs(3),
        );

        ticker.advance(6.0);
        // a at 2,4,6; b at 3,6 — ties resolved by registration order
        assert_eq!(*order.lock(), vec!['a', 'b', 'a', 'a', 'b']);
    }

    #[tokio::test]
    async fn test_tokio_periodic_fires() {
        let ticker = TokioTicker::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = ticker.schedule_periodic(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_running = fired.load(Ordering::SeqCst);
        assert!(after_running >= 2, "expected several fires, got {after_running}");

        ticker.cancel(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_cancel = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_tokio_now_tracks_system_clock() {
        let ticker = TokioTicker::new();
        let t = ticker.now();
        // seconds-since-epoch, sometime after 2020
        assert!(t > 1_577_836_800.0);
    }
}
