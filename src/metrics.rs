// src/metrics.rs

//! Timing and memory measurement for child processes.
//!
//! Memory tracking uses `sysinfo` and is best-effort:
//! - Memory is sampled periodically on a helper thread.
//! - Only the direct child is sampled, not its descendants
//!   (`npx ts-node` reports the launcher, not the node process it spawns).
//! - If the PID cannot be inspected the tracker returns `None`.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, System};

/// Default sampling interval.
pub const SAMPLE_EVERY: Duration = Duration::from_millis(20);

/// Metrics collected for a single process invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Peak RSS in KB, if any sample was taken.
    pub peak_memory_kb: Option<u64>,
}

/// Tracks peak resident memory of a child process while it runs.
pub struct MemoryTracker {
    stop: Arc<AtomicBool>,
    peak_kb: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MemoryTracker {
    /// Start sampling `pid` every `sample_every`.
    ///
    /// The sampler stops on its own once the process is gone.
    pub fn start(pid: u32, sample_every: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let peak_kb = Arc::new(AtomicU64::new(0));

        let stop_flag = Arc::clone(&stop);
        let peak = Arc::clone(&peak_kb);

        let handle = thread::spawn(move || {
            let pid = Pid::from_u32(pid);
            let mut system = System::new();

            while !stop_flag.load(Ordering::Relaxed) {
                system.refresh_process(pid);

                match system.process(pid) {
                    // sysinfo reports bytes
                    Some(process) => {
                        peak.fetch_max(process.memory() / 1024, Ordering::Relaxed);
                    }
                    None => break,
                }

                thread::sleep(sample_every);
            }
        });

        Self {
            stop,
            peak_kb,
            handle: Some(handle),
        }
    }

    /// Stop sampling and return the peak RSS in KB.
    pub fn stop_and_take(mut self) -> Option<u64> {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        match self.peak_kb.load(Ordering::Relaxed) {
            0 => None,
            kb => Some(kb),
        }
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
