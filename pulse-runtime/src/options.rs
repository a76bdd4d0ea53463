//! Process-wide profiler configuration.
//!
//! A single atomic bitmask, readable from any instrumented call site without
//! passing configuration through the call graph. Default is empty: no
//! profiling, no report destinations. Mutated programmatically via
//! [`set_options`] or remotely through the control channel.

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Profiler configuration bits.
    ///
    /// Destination bits combine: a report is written to every configured
    /// destination. The sort bits are mutually exclusive in practice;
    /// cost-time sort wins if both are set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Options: u32 {
        /// Master switch: sections record nothing while this is unset.
        const PROFILER = 2;
        /// Write reports to stdout.
        const SAVE_TO_CONSOLE = 4;
        /// Write reports to the report file.
        const SAVE_TO_FILE = 8;
        /// Order report entries by total call count, descending.
        const SORT_BY_CALL_COUNT = 16;
        /// Order report entries by total cost time, descending.
        const SORT_BY_COST_TIME = 32;
    }
}

static OPTIONS: AtomicU32 = AtomicU32::new(0);

/// Replace the current option set.
pub fn set_options(options: Options) {
    OPTIONS.store(options.bits(), Ordering::Relaxed);
}

/// OR additional bits into the current option set.
pub fn merge_options(extra: Options) {
    OPTIONS.fetch_or(extra.bits(), Ordering::Relaxed);
}

/// Read the current option set.
pub fn options() -> Options {
    Options::from_bits_truncate(OPTIONS.load(Ordering::Relaxed))
}

/// True when the profiler master switch is on.
pub fn enabled() -> bool {
    options().contains(Options::PROFILER)
}
