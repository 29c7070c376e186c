//! Timer driver for sleep registrations.
//!
//! One background thread per process owns a deadline heap. Sleeps register
//! a waker with a deadline; the thread parks until the earliest deadline and
//! wakes everything that expired, outside the lock.

use crate::tracing_compat::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, OnceLock};
use std::task::Waker;
use std::thread;
use std::time::Instant;

/// Stale heap entries tolerated before the heap is rebuilt.
const COMPACT_THRESHOLD: usize = 64;

/// Identifies one timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
    deadline: Instant,
}

impl TimerHandle {
    /// Deadline the timer fires at.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[derive(Debug, Default)]
struct DriverState {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    wakers: HashMap<u64, Waker>,
    next_id: u64,
    thread_started: bool,
}

impl DriverState {
    fn collect_expired(&mut self, now: Instant) -> Vec<Waker> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(waker) = self.wakers.remove(&id) {
                expired.push(waker);
            }
        }
        expired
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        // Skip entries whose registration was cancelled.
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.wakers.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    fn compact(&mut self) {
        if self.heap.len() <= COMPACT_THRESHOLD || self.heap.len() <= 2 * self.wakers.len() {
            return;
        }
        let wakers = &self.wakers;
        self.heap.retain(|Reverse((_, id))| wakers.contains_key(id));
    }
}

/// Process-wide timer driver.
#[derive(Debug, Default)]
pub struct TimerDriver {
    state: Mutex<DriverState>,
    cond: Condvar,
}

static DRIVER: OnceLock<Arc<TimerDriver>> = OnceLock::new();

impl TimerDriver {
    /// The driver shared by every runtime in the process.
    pub fn global() -> &'static Arc<Self> {
        DRIVER.get_or_init(|| Arc::new(Self::default()))
    }

    /// Registers `waker` to be woken once `deadline` has passed.
    pub fn register(self: &Arc<Self>, deadline: Instant, waker: Waker) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let earliest = state.next_deadline().map_or(true, |next| deadline < next);
        state.heap.push(Reverse((deadline, id)));
        state.wakers.insert(id, waker);
        let start = !state.thread_started;
        state.thread_started = true;
        drop(state);
        if start {
            self.start_thread();
        }
        if earliest {
            self.cond.notify_one();
        }
        TimerHandle { id, deadline }
    }

    /// Replaces the waker of a live registration.
    ///
    /// Returns false if the timer already fired or was cancelled.
    pub fn update(&self, handle: &TimerHandle, waker: &Waker) -> bool {
        let mut state = self.state.lock();
        match state.wakers.get_mut(&handle.id) {
            Some(existing) => {
                if !existing.will_wake(waker) {
                    existing.clone_from(waker);
                }
                true
            }
            None => false,
        }
    }

    /// Cancels a registration. Returns true if it had not fired yet.
    pub fn cancel(&self, handle: &TimerHandle) -> bool {
        let mut state = self.state.lock();
        let removed = state.wakers.remove(&handle.id).is_some();
        state.compact();
        removed
    }

    /// Number of registrations that have not fired.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().wakers.len()
    }

    /// Wakes every registration whose deadline passed. Returns how many
    /// fired.
    fn process_timers(&self) -> usize {
        let expired = self.state.lock().collect_expired(Instant::now());
        let fired = expired.len();
        for waker in expired {
            waker.wake();
        }
        fired
    }

    fn start_thread(self: &Arc<Self>) {
        let driver = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("coscope-timer".into())
            .spawn(move || {
                debug!("timer thread started");
                driver.run();
            });
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn timer thread");
            self.state.lock().thread_started = false;
        }
    }

    fn run(&self) {
        loop {
            if self.process_timers() > 0 {
                continue;
            }
            let mut state = self.state.lock();
            match state.next_deadline() {
                Some(deadline) => {
                    let _ = self.cond.wait_until(&mut state, deadline);
                }
                None => self.cond.wait(&mut state),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::time::Duration;

    struct CountingWake(AtomicUsize);

    impl Wake for CountingWake {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Arc<CountingWake>, Waker) {
        let counter = Arc::new(CountingWake(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        (counter, waker)
    }

    #[test]
    fn expired_entries_fire_once() {
        let mut state = DriverState::default();
        let (counter, waker) = counting();
        let now = Instant::now();
        state.heap.push(Reverse((now, 0)));
        state.wakers.insert(0, waker.clone());
        state.heap.push(Reverse((now + Duration::from_secs(60), 1)));
        state.wakers.insert(1, waker);
        let expired = state.collect_expired(now);
        assert_eq!(expired.len(), 1);
        expired.into_iter().for_each(Waker::wake);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(state.collect_expired(now).is_empty());
        assert_eq!(state.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn cancelled_entries_are_skipped_and_compacted() {
        let mut state = DriverState::default();
        let (_counter, waker) = counting();
        let base = Instant::now() + Duration::from_secs(60);
        for id in 0..100_u64 {
            state.heap.push(Reverse((base + Duration::from_millis(id), id)));
            state.wakers.insert(id, waker.clone());
        }
        for id in 0..90_u64 {
            state.wakers.remove(&id);
        }
        state.compact();
        assert_eq!(state.heap.len(), 10);
        assert_eq!(state.next_deadline(), Some(base + Duration::from_millis(90)));
    }

    #[test]
    fn driver_thread_wakes_registered_timer() {
        let driver = TimerDriver::global();
        let (counter, waker) = counting();
        let handle = driver.register(Instant::now() + Duration::from_millis(10), waker);
        assert!(crate::test_utils::wait_until(Duration::from_secs(5), || {
            counter.0.load(Ordering::SeqCst) == 1
        }));
        assert!(!driver.cancel(&handle));
    }
}
