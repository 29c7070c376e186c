//! Time primitives: sleep, timeouts and yielding.
//!
//! - [`Sleep`]: a future that completes after a deadline
//! - [`Timeout`]: a wrapper that adds a deadline to any future
//! - [`yield_now`]: re-queue the current task
//!
//! All deadlines use the wall clock. Timers are served by one background
//! thread, started on the first sleep.
//!
//! # Cancel Safety
//!
//! - `Sleep`: can be dropped and recreated without side effects
//! - `Timeout`: the inner future is dropped on expiry and may have done
//!   partial work
//!
//! # Example
//!
//! ```ignore
//! use coscope::time::{sleep, timeout};
//! use std::time::Duration;
//!
//! sleep(Duration::from_millis(100)).await;
//!
//! match timeout(Duration::from_secs(5), expensive_operation()).await {
//!     Ok(result) => println!("completed: {result}"),
//!     Err(_) => println!("timed out"),
//! }
//! ```

mod driver;
mod sleep;
mod timeout;
mod yield_now;

pub use driver::{TimerDriver, TimerHandle};
pub use sleep::{sleep, sleep_until, Sleep};
pub use timeout::{timeout, timeout_at, Timeout};
pub use yield_now::{yield_now, YieldNow};

use std::time::{Duration, Instant};

/// The instant `after` from now, or `None` when that is past what `Instant`
/// can represent. Callers treat `None` as no deadline.
pub(crate) fn deadline_after(after: Duration) -> Option<Instant> {
    Instant::now().checked_add(after)
}
