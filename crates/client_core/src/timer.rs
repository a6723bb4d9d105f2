//! Elapsed-seconds ticker behind the "generating... Ns" progress display.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct ElapsedTimer {
    elapsed: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the counter to zero and ticks it once per second until
    /// [`stop`](Self::stop). A ticker that is already running is stopped first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.elapsed.store(0, Ordering::SeqCst);

        let elapsed = Arc::clone(&self.elapsed);
        self.handle = Some(tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + TICK, TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                elapsed.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    /// Stops ticking and keeps the last count. Returns `false` when nothing was
    /// running.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
