//! Per-call-site timing aggregation.
//!
//! A [`Section`] is shared by every thread that executes its call site.
//! All state sits behind one mutex held only for the duration of a
//! begin, an end, or the section's contribution to a report. Recursion
//! safety comes from a per-thread refcount: the begin timestamp is
//! recorded only on the outermost entry (0 -> 1) and cost time only on
//! the matching outermost exit, so N levels of recursion measure one
//! outer interval, not N sub-intervals.
//!
//! `begin`/`end` are infallible by contract -- they sit on arbitrary hot
//! paths. Mismatched pairs degrade report accuracy (and surface as a
//! warning line in the report via the refcount invariant) but never
//! corrupt state or panic.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::resource::ResourceMonitor;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

/// Process-local small integer id for the calling thread, assigned on
/// first use. Used as the per-thread key inside sections so reports show
/// stable `Thread Id:N` lines.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

#[derive(Default)]
struct SectionStats {
    call_count: BTreeMap<u64, u64>,
    total_call_count: u64,
    /// Per-thread recursion depth. Negative means an extra `end`.
    active_ref: BTreeMap<u64, i64>,
    total_active_ref: i64,
    begin_time: BTreeMap<u64, Instant>,
    cost_time: BTreeMap<u64, Duration>,
    total_cost_time: Duration,
}

/// Live aggregator of timing and (optionally) resource statistics for
/// one call site.
pub struct Section {
    stats: Mutex<SectionStats>,
    monitor: Option<ResourceMonitor>,
}

impl Section {
    pub(crate) fn new(with_resources: bool) -> Self {
        Self {
            stats: Mutex::new(SectionStats::default()),
            monitor: with_resources.then(ResourceMonitor::new),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_monitor(monitor: ResourceMonitor) -> Self {
        Self {
            stats: Mutex::new(SectionStats::default()),
            monitor: Some(monitor),
        }
    }

    /// Enter the section on `thread_id`. Records the begin timestamp and
    /// activates the resource monitor only on the outermost entry.
    pub fn begin(&self, thread_id: u64) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());

        *stats.call_count.entry(thread_id).or_insert(0) += 1;
        stats.total_call_count += 1;

        let depth = *stats.active_ref.entry(thread_id).or_insert(0);
        if depth == 0 {
            stats.begin_time.insert(thread_id, Instant::now());
            if let Some(monitor) = &self.monitor {
                monitor.activate();
            }
        }

        *stats.active_ref.entry(thread_id).or_insert(0) += 1;
        stats.total_active_ref += 1;
    }

    /// Leave the section on `thread_id`. Cost time is charged on the
    /// outermost exit; an extra, unmatched `end` drives the refcount
    /// negative and overwrites this thread's cost time instead of
    /// accumulating (preserved historical behavior, surfaced in the
    /// report through the refcount mismatch warning).
    pub fn end(&self, thread_id: u64) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());

        let depth = {
            let entry = stats.active_ref.entry(thread_id).or_insert(0);
            *entry -= 1;
            *entry
        };
        stats.total_active_ref -= 1;

        if depth <= 0 {
            if let Some(begin) = stats.begin_time.get(&thread_id).copied() {
                let elapsed = begin.elapsed();
                if depth == 0 {
                    *stats
                        .cost_time
                        .entry(thread_id)
                        .or_insert(Duration::ZERO) += elapsed;
                } else {
                    stats.cost_time.insert(thread_id, elapsed);
                }
                stats.total_cost_time += elapsed;
            }

            if let Some(monitor) = &self.monitor {
                monitor.deactivate();
            }
        }
    }

    /// Enter the section and return a guard that leaves it on drop, on
    /// every exit path. The guard remembers the entering thread id so the
    /// per-thread refcounts stay paired even if the guard is moved.
    #[must_use = "dropping the guard immediately ends the section"]
    pub fn enter(self: &Arc<Self>) -> SectionGuard {
        let thread_id = current_thread_id();
        self.begin(thread_id);
        SectionGuard {
            section: Arc::clone(self),
            thread_id,
        }
    }

    pub fn monitor(&self) -> Option<&ResourceMonitor> {
        self.monitor.as_ref()
    }

    pub fn total_call_count(&self) -> u64 {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_call_count
    }

    pub fn total_cost_time(&self) -> Duration {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_cost_time
    }

    /// Sum of per-thread recursion depths. Zero is the steady state; any
    /// other value signals unmatched begin/end pairs in the caller.
    pub fn total_active_ref(&self) -> i64 {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_active_ref
    }

    /// Cost time recorded for one thread so far.
    pub fn thread_cost_time(&self, thread_id: u64) -> Option<Duration> {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cost_time
            .get(&thread_id)
            .copied()
    }

    /// Render this section's statistics for the report. Holds the
    /// section lock for the duration of the write.
    pub(crate) fn serialize(&self, w: &mut dyn Write) -> io::Result<()> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());

        if stats.total_active_ref != 0 {
            writeln!(w, "Performance Profiler Not Match!")?;
        }

        for (thread_id, cost) in &stats.cost_time {
            let calls = stats.call_count.get(thread_id).copied().unwrap_or(0);
            writeln!(
                w,
                "Thread Id:{}, Cost Time:{:.2}, Call Count:{}",
                thread_id,
                cost.as_secs_f64(),
                calls
            )?;
        }

        writeln!(
            w,
            "Total Cost Time:{:.2}, Total Call Count:{}",
            stats.total_cost_time.as_secs_f64(),
            stats.total_call_count
        )?;

        if let Some(monitor) = &self.monitor {
            let cpu = monitor.cpu_info();
            writeln!(w, "[Cpu] Peak:{}%, Avg:{}%", cpu.peak(), cpu.avg())?;
            let memory = monitor.memory_info();
            writeln!(
                w,
                "[Memory] Peak:{}K, Avg:{}K",
                memory.peak() / 1024,
                memory.avg() / 1024
            )?;
        }

        Ok(())
    }
}

/// RAII handle produced by [`Section::enter`].
pub struct SectionGuard {
    section: Arc<Section>,
    thread_id: u64,
}

impl Drop for SectionGuard {
    fn drop(&mut self) {
        self.section.end(self.thread_id);
    }
}
