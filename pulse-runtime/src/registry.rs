//! Process-wide section registry.
//!
//! Lazily constructed on first access rather than at static-init time:
//! when the runtime is loaded as part of a dynamic library the control
//! server thread must not start before the host program's entry point
//! runs. `OnceLock` gives the construct-exactly-once guarantee under
//! concurrent first access.
//!
//! Sections are created on first encounter of a call site and never
//! removed. The map is bounded by the number of distinct instrumentation
//! points in the program, which is static.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Local};

use crate::control;
use crate::options::Options;
use crate::section::Section;
use crate::site::CallSite;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Map from call site to its live section, plus the profiler start time
/// used in report headers.
pub struct Registry {
    begin_time: DateTime<Local>,
    sections: Mutex<BTreeMap<CallSite, Arc<Section>>>,
}

impl Registry {
    /// The process-wide registry. First access starts the control server
    /// thread and registers the process-exit report hook.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| {
            control::spawn_server(std::process::id());
            // atexit rather than Drop: the registry is 'static and is
            // never dropped.
            unsafe {
                libc::atexit(report_at_exit);
            }
            Registry {
                begin_time: Local::now(),
                sections: Mutex::new(BTreeMap::new()),
            }
        })
    }

    /// Look up or create the section for `site`. The registry lock is
    /// held only for the lookup/insert; callers then synchronize through
    /// the returned section itself. The first registration decides the
    /// description and whether a resource monitor is attached.
    pub fn section(&self, site: CallSite, with_resources: bool) -> Arc<Section> {
        let mut sections = self.sections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(section) = sections.get(&site) {
            return Arc::clone(section);
        }
        let section = Arc::new(Section::new(with_resources));
        sections.insert(site, Arc::clone(&section));
        section
    }

    pub fn begin_time(&self) -> &DateTime<Local> {
        &self.begin_time
    }

    /// Point-in-time copy of the registry, ordered for report output:
    /// cost-time sort wins over call-count sort when both bits are set,
    /// otherwise entries keep the call sites' natural order. Section
    /// totals are read after the registry lock is released, so the
    /// report is a best-effort snapshot, not a transactional one.
    pub fn snapshot(&self, flags: Options) -> Vec<(CallSite, Arc<Section>)> {
        let mut entries: Vec<(CallSite, Arc<Section>)> = {
            let sections = self.sections.lock().unwrap_or_else(|e| e.into_inner());
            sections
                .iter()
                .map(|(site, section)| (site.clone(), Arc::clone(section)))
                .collect()
        };

        if flags.contains(Options::SORT_BY_COST_TIME) {
            entries.sort_by_key(|(_, section)| std::cmp::Reverse(section.total_cost_time()));
        } else if flags.contains(Options::SORT_BY_CALL_COUNT) {
            entries.sort_by_key(|(_, section)| std::cmp::Reverse(section.total_call_count()));
        }
        entries
    }
}

extern "C" fn report_at_exit() {
    // Unwinding into the C runtime would abort; the final report is
    // best-effort.
    let _ = std::panic::catch_unwind(crate::report::output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lookup_is_idempotent_and_first_description_wins() {
        let registry = Registry::global();
        let first = registry.section(
            CallSite::new("idem.rs", "f", 11, "first description"),
            false,
        );
        let second = registry.section(
            CallSite::new("idem.rs", "f", 11, "second description"),
            false,
        );
        assert!(Arc::ptr_eq(&first, &second));

        let entries = registry.snapshot(Options::empty());
        let (site, _) = entries
            .iter()
            .find(|(site, _)| site.file() == "idem.rs" && site.line() == 11)
            .expect("site registered");
        assert_eq!(site.description(), "first description");
    }

    #[test]
    fn distinct_lines_create_distinct_sections() {
        let registry = Registry::global();
        let a = registry.section(CallSite::new("multi.rs", "f", 21, ""), false);
        let b = registry.section(CallSite::new("multi.rs", "f", 22, ""), false);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn snapshot_sorts_by_cost_time_then_call_count() {
        let registry = Registry::global();
        let busy = registry.section(CallSite::new("sort.rs", "busy", 31, ""), false);
        let slow = registry.section(CallSite::new("sort.rs", "slow", 32, ""), false);

        // busy: many cheap calls; slow: one expensive call.
        for _ in 0..10 {
            busy.begin(90);
            busy.end(90);
        }
        slow.begin(90);
        std::thread::sleep(Duration::from_millis(15));
        slow.end(90);

        let by_cost = registry.snapshot(Options::SORT_BY_COST_TIME);
        let cost_pos = |name: &str| {
            by_cost
                .iter()
                .position(|(site, _)| site.function() == name && site.file() == "sort.rs")
                .unwrap()
        };
        assert!(cost_pos("slow") < cost_pos("busy"));

        let by_calls = registry.snapshot(Options::SORT_BY_CALL_COUNT);
        let call_pos = |name: &str| {
            by_calls
                .iter()
                .position(|(site, _)| site.function() == name && site.file() == "sort.rs")
                .unwrap()
        };
        assert!(call_pos("busy") < call_pos("slow"));

        // Cost-time sort takes precedence when both bits are set.
        let both = registry.snapshot(Options::SORT_BY_COST_TIME | Options::SORT_BY_CALL_COUNT);
        let both_pos = |name: &str| {
            both.iter()
                .position(|(site, _)| site.function() == name && site.file() == "sort.rs")
                .unwrap()
        };
        assert!(both_pos("slow") < both_pos("busy"));
    }

    #[test]
    fn unsorted_snapshot_keeps_natural_site_order() {
        let registry = Registry::global();
        registry.section(CallSite::new("order_b.rs", "f", 41, ""), false);
        registry.section(CallSite::new("order_a.rs", "f", 40, ""), false);

        let entries = registry.snapshot(Options::empty());
        let pos = |file: &str| {
            entries
                .iter()
                .position(|(site, _)| site.file() == file)
                .unwrap()
        };
        assert!(
            pos("order_a.rs") < pos("order_b.rs"),
            "line 40 precedes line 41 in natural order"
        );
    }
}
