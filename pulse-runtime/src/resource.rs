//! Resource statistics for sections that opt in.
//!
//! A [`ResourceMonitor`] owns one dedicated sampling thread for the
//! lifetime of the process. While its activation refcount is nonzero the
//! thread pulls a CPU/memory reading for the owning process every
//! sampling interval and folds it into two running averages; while the
//! refcount is zero the thread parks on a condition variable rather than
//! exiting. Activation is reference-counted so overlapping entries from
//! many threads sharing one section drive exactly one sampling loop.
//!
//! The OS read itself sits behind the [`ResourceSampler`] trait; the
//! production implementation uses `sysinfo`, tests substitute a scripted
//! fake. A sampler may return negative fields on transient failure --
//! those readings are discarded, never propagated as errors.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Interval between resource reads while a monitor is active.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// One CPU/memory snapshot for a process.
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    /// Whole-percent CPU usage; negative on a failed read.
    pub cpu_percent: i64,
    /// Resident memory in bytes; negative on a failed read.
    pub memory_bytes: i64,
}

impl Reading {
    /// Marker for a failed read; both averages discard it.
    pub fn invalid() -> Self {
        Self {
            cpu_percent: -1,
            memory_bytes: -1,
        }
    }
}

/// Source of resource readings for a process id.
pub trait ResourceSampler: Send {
    fn sample(&mut self, pid: u32) -> Reading;
}

/// `sysinfo`-backed sampler refreshing only the monitored process.
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self, pid: u32) -> Reading {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.system.process(pid) {
            Some(process) => Reading {
                cpu_percent: process.cpu_usage().round() as i64,
                memory_bytes: process.memory() as i64,
            },
            None => Reading::invalid(),
        }
    }
}

/// Peak and cumulative mean of a scalar sample stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceInfo {
    peak: i64,
    total: i64,
    count: i64,
}

impl ResourceInfo {
    /// Fold in one sample. Negative values are invalid readings and are
    /// dropped without touching any state.
    pub fn update(&mut self, value: i64) {
        if value < 0 {
            return;
        }
        if value > self.peak {
            self.peak = value;
        }
        self.total += value;
        self.count += 1;
    }

    pub fn peak(&self) -> i64 {
        self.peak
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Running mean; zero before the first valid sample.
    pub fn avg(&self) -> i64 {
        if self.count == 0 {
            0
        } else {
            self.total / self.count
        }
    }
}

#[derive(Default)]
struct MonitorStats {
    cpu: ResourceInfo,
    memory: ResourceInfo,
}

struct MonitorShared {
    pid: u32,
    interval: Duration,
    refcount: AtomicI64,
    stats: Mutex<MonitorStats>,
    wakeup: Condvar,
}

/// Reference-counted background CPU/memory monitor, owned 1:1 by a
/// section that opted into resource statistics.
pub struct ResourceMonitor {
    shared: Arc<MonitorShared>,
}

impl ResourceMonitor {
    /// Monitor the current process with the default interval.
    pub fn new() -> Self {
        Self::with_sampler(
            std::process::id(),
            SAMPLE_INTERVAL,
            Box::new(SystemSampler::new()),
        )
    }

    /// Monitor `pid` through an arbitrary sampler. The sampling thread is
    /// spawned here and never torn down; it parks while inactive.
    pub fn with_sampler(
        pid: u32,
        interval: Duration,
        sampler: Box<dyn ResourceSampler + Send>,
    ) -> Self {
        let shared = Arc::new(MonitorShared {
            pid,
            interval,
            refcount: AtomicI64::new(0),
            stats: Mutex::new(MonitorStats::default()),
            wakeup: Condvar::new(),
        });
        let loop_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("pulse-sampler".into())
            .spawn(move || sampling_loop(loop_shared, sampler));
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn resource sampling thread");
        }
        Self { shared }
    }

    /// First activation (0 -> 1) wakes the parked sampling loop; further
    /// activations only bump the refcount.
    pub fn activate(&self) {
        if self.shared.refcount.fetch_add(1, Ordering::SeqCst) == 0 {
            // Take the lock so the notify cannot race the loop between
            // its refcount check and its wait.
            let _guard = self
                .shared
                .stats
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            self.shared.wakeup.notify_one();
        }
    }

    /// Drop one activation. The loop itself observes the zero and parks;
    /// sampling is not cut off mid-cycle. Extra deactivations are ignored
    /// rather than driving the count negative.
    pub fn deactivate(&self) {
        let _ = self
            .shared
            .refcount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count > 0).then_some(count - 1)
            });
    }

    pub fn active_count(&self) -> i64 {
        self.shared.refcount.load(Ordering::SeqCst)
    }

    pub fn cpu_info(&self) -> ResourceInfo {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cpu
    }

    pub fn memory_info(&self) -> ResourceInfo {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .memory
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn sampling_loop(shared: Arc<MonitorShared>, mut sampler: Box<dyn ResourceSampler + Send>) {
    loop {
        if shared.refcount.load(Ordering::SeqCst) == 0 {
            let guard = shared.stats.lock().unwrap_or_else(|e| e.into_inner());
            // wait_while re-checks after spurious wakeups and after a
            // notify that raced an immediate deactivate.
            let _guard = shared
                .wakeup
                .wait_while(guard, |_| shared.refcount.load(Ordering::SeqCst) == 0)
                .unwrap_or_else(|e| e.into_inner());
        }

        let reading = sampler.sample(shared.pid);
        {
            let mut stats = shared.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.cpu.update(reading.cpu_percent);
            stats.memory.update(reading.memory_bytes);
        }

        thread::sleep(shared.interval);
    }
}
