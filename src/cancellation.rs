//! Cancellable timers: CancellationToken + generation guard.
//! Every periodic task the session runs (expression sampling, relief ticks)
//! is spawned through here, so one call tears them all down and a tick
//! that races a cancellation cannot write into the next mode's state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One timer family. Advancing the generation cancels every task spawned
/// under the previous one and issues a fresh token.
pub struct TaskGeneration {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl TaskGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel current tasks, advance generation, return a guard for the new one.
    pub fn cancel_and_advance(&self) -> GenerationGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationGuard::new(Arc::clone(&self.generation), gen, child)
    }
}

impl Default for TaskGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Checked by a task before every write. Stale once its generation has
/// been advanced past or its token cancelled.
#[derive(Clone)]
pub struct GenerationGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl GenerationGuard {
    pub fn new(generation: Arc<AtomicU64>, my_generation: u64, token: CancellationToken) -> Self {
        Self {
            generation,
            my_generation,
            token,
        }
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Not cancelled and still current.
    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn my_generation(&self) -> u64 {
        self.my_generation
    }
}

/// All timer families owned by one session.
pub struct SessionTimers {
    /// Expression sampling interval.
    pub sampling: TaskGeneration,
    /// Override-mode ticks (pacer, bubbles, affirmation rotator).
    pub relief: TaskGeneration,
    live: Arc<AtomicUsize>,
}

impl SessionTimers {
    pub fn new() -> Self {
        Self {
            sampling: TaskGeneration::new(),
            relief: TaskGeneration::new(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cancel every timer family.
    pub fn cancel_all_and_advance(&self) {
        self.sampling.cancel_and_advance();
        self.relief.cancel_and_advance();
    }

    /// Number of timer tasks that have not yet exited.
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Spawn a periodic task on the ambient tokio runtime. The first tick
    /// fires one `period` after spawning. `on_tick` runs only while the
    /// guard is current; the task exits on cancellation or when `on_tick`
    /// returns false. Returns None when no runtime is available.
    pub fn spawn_interval<F>(
        &self,
        name: &'static str,
        guard: GenerationGuard,
        period: Duration,
        mut on_tick: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.spawn_tracked(name, guard.clone(), async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = guard.token().cancelled() => break,
                    _ = interval.tick() => {
                        if !guard.should_continue() || !on_tick() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn spawn_tracked<Fut>(
        &self,
        name: &'static str,
        guard: GenerationGuard,
        fut: Fut,
    ) -> Option<JoinHandle<()>>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(timer = name, "no async runtime, timer not started");
                return None;
            }
        };
        let live = LiveTimer::enter(Arc::clone(&self.live));
        let generation = guard.my_generation();
        debug!(timer = name, generation, "timer_started");
        Some(handle.spawn(async move {
            let _live = live;
            fut.await;
            debug!(timer = name, generation, "timer_stopped");
        }))
    }
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts a timer task as live until dropped.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_makes_old_guard_stale() {
        let family = TaskGeneration::new();
        let old = family.cancel_and_advance();
        assert!(old.should_continue());
        let new = family.cancel_and_advance();
        assert!(!old.is_current());
        assert!(old.is_cancelled());
        assert!(new.should_continue());
        assert_eq!(new.my_generation(), 2);
    }

    #[test]
    fn spawn_without_runtime_returns_none() {
        let timers = SessionTimers::new();
        let guard = timers.relief.cancel_and_advance();
        assert!(timers
            .spawn_interval("test", guard, Duration::from_secs(1), || true)
            .is_none());
        assert_eq!(timers.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_until_cancelled() {
        let timers = SessionTimers::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let guard = timers.relief.cancel_and_advance();
        let handle = timers
            .spawn_interval("test", guard, Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(timers.live_timers(), 1);

        timers.cancel_all_and_advance();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(timers.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_returning_false_stops_timer() {
        let timers = SessionTimers::new();
        let guard = timers.sampling.cancel_and_advance();
        let mut remaining = 2;
        let handle = timers
            .spawn_interval("test", guard, Duration::from_millis(100), move || {
                remaining -= 1;
                remaining > 0
            })
            .unwrap();
        handle.await.unwrap();
        assert_eq!(timers.live_timers(), 0);
    }
}
