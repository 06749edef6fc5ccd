//! High-resolution periodic callbacks
//!
//! `ThreadScheduler` runs each callback on its own thread against absolute
//! deadlines, so a late tick does not shift the ones after it. A tick more
//! than one period late is dropped instead of being replayed in a burst.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

/// Callback run on every tick
pub type TickCallback = Box<dyn FnMut() + Send + 'static>;

/// Handle to a running periodic callback
pub trait TickHandle: Send {
    /// Stop ticking; once this returns the callback will not run again
    fn stop(&mut self);
}

/// Source of periodic callbacks
pub trait PeriodicScheduler: Send + Sync {
    fn schedule(&self, period: Duration, callback: TickCallback) -> io::Result<Box<dyn TickHandle>>;
}

/// Below this the wait spins instead of sleeping
const SPIN_MARGIN: Duration = Duration::from_micros(100);

/// One dedicated thread per scheduled callback
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl PeriodicScheduler for ThreadScheduler {
    fn schedule(
        &self,
        period: Duration,
        mut callback: TickCallback,
    ) -> io::Result<Box<dyn TickHandle>> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let period = period.max(Duration::from_micros(100));

        let thread = thread::Builder::new()
            .name("gyromouse-tick".into())
            .spawn(move || {
                debug!("Ticker started ({:?} period)", period);
                let mut deadline = Instant::now() + period;
                let mut dropped = 0u64;

                while flag.load(Ordering::Acquire) {
                    wait_until(deadline, &flag);
                    if !flag.load(Ordering::Acquire) {
                        break;
                    }
                    callback();

                    deadline += period;
                    let now = Instant::now();
                    if now > deadline + period {
                        let behind = now.duration_since(deadline);
                        dropped += (behind.as_nanos() / period.as_nanos()) as u64;
                        trace!("Ticker {:?} behind, skipping", behind);
                        deadline = now + period;
                    }
                }
                debug!("Ticker stopped ({} late ticks dropped)", dropped);
            })?;

        Ok(Box::new(ThreadTickHandle {
            running,
            thread: Some(thread),
        }))
    }
}

/// Sleep until shortly before `deadline`, then spin
fn wait_until(deadline: Instant, running: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::Acquire) {
            return;
        }
        let remaining = deadline - now;
        if remaining > SPIN_MARGIN {
            thread::park_timeout(remaining - SPIN_MARGIN);
        } else {
            std::hint::spin_loop();
        }
    }
}

struct ThreadTickHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TickHandle for ThreadTickHandle {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // Stopped from inside the callback; the loop exits after it returns
            return;
        }
        thread.thread().unpark();
        if thread.join().is_err() {
            error!("Ticker thread panicked");
        }
    }
}

impl Drop for ThreadTickHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ticks_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut handle = ThreadScheduler
            .schedule(
                Duration::from_millis(1),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(30));
        handle.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut handle = ThreadScheduler
            .schedule(Duration::from_millis(1), Box::new(|| {}))
            .unwrap();
        handle.stop();
        handle.stop();
    }

    #[test]
    fn test_slow_callback_does_not_burst() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut handle = ThreadScheduler
            .schedule(
                Duration::from_millis(1),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        handle.stop();
        // Roughly one tick per 5 ms, never a catch-up run of 1 ms ticks
        assert!(count.load(Ordering::SeqCst) <= 12);
    }
}
