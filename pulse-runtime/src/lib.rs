//! In-process call-site performance profiler with runtime control.
//!
//! Instrumented code marks regions with the `profile_*` macros. Each
//! distinct call site gets one [`Section`] in the process-wide
//! [`Registry`]; sections aggregate recursion-safe wall time and call
//! counts per thread, and can optionally drive a background CPU/memory
//! [`ResourceMonitor`]. All instrumentation is gated on the [`Options`]
//! bitmask, so an unconfigured process pays one atomic load per marker.
//!
//! A control server thread (started lazily with the registry) accepts
//! `state` / `save` / `enable` / `disable` commands over a Unix socket
//! named from the process id, so an operator can reconfigure the
//! profiler and pull reports without restarting the process. A final
//! report is also written at process exit when a destination is
//! configured.
//!
//! ```no_run
//! use pulse_runtime::{set_options, Options};
//!
//! set_options(Options::PROFILER | Options::SAVE_TO_FILE);
//!
//! fn hot_path() {
//!     let _section = pulse_runtime::profile_scope!("hot path");
//!     // work measured here, across every exit path
//! }
//! ```

mod control;
mod options;
mod registry;
mod report;
mod resource;
mod section;
mod site;

pub use control::{socket_path, ControlServer};
pub use options::{enabled, merge_options, options, set_options, Options};
pub use registry::Registry;
pub use report::{default_report_path, output, render, REPORT_PATH_ENV};
pub use resource::{Reading, ResourceInfo, ResourceMonitor, ResourceSampler, SystemSampler};
pub use section::{current_thread_id, Section, SectionGuard};
pub use site::CallSite;

/// Resolve the enclosing function's path at the expansion site.
///
/// Works by naming a local item and stripping its suffix from
/// `type_name`, since Rust has no `function!()` counterpart to `file!()`.
#[doc(hidden)]
#[macro_export]
macro_rules! __function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

/// Begin an explicitly paired profiling section, binding the handle to
/// `$handle`. Close it with [`profile_end!`] naming the same handle.
///
/// When the profiler is disabled the handle is `None` and nothing is
/// recorded. Prefer [`profile_scope!`] unless begin and end genuinely
/// cannot share a scope.
#[macro_export]
macro_rules! profile_begin {
    ($handle:ident, $desc:expr) => {
        $crate::profile_begin!($handle, $desc, false);
    };
    ($handle:ident, $desc:expr, $resources:expr) => {
        let $handle: ::std::option::Option<::std::sync::Arc<$crate::Section>> =
            if $crate::enabled() {
                let section = $crate::Registry::global().section(
                    $crate::CallSite::new(file!(), $crate::__function_name!(), line!(), $desc),
                    $resources,
                );
                section.begin($crate::current_thread_id());
                ::std::option::Option::Some(section)
            } else {
                ::std::option::Option::None
            };
    };
}

/// End a section opened by [`profile_begin!`] with the same handle.
#[macro_export]
macro_rules! profile_end {
    ($handle:ident) => {
        if let ::std::option::Option::Some(section) = &$handle {
            section.end($crate::current_thread_id());
        }
    };
}

/// [`profile_begin!`] with a resource monitor attached to the section.
///
/// Every resource-monitored section owns a dedicated sampling thread, so
/// use these sparingly.
#[macro_export]
macro_rules! profile_resource_begin {
    ($handle:ident, $desc:expr) => {
        $crate::profile_begin!($handle, $desc, true);
    };
}

/// End a section opened by [`profile_resource_begin!`].
#[macro_export]
macro_rules! profile_resource_end {
    ($handle:ident) => {
        $crate::profile_end!($handle);
    };
}

/// Profile the enclosing scope, ending on drop on every exit path.
/// Evaluates to an `Option<SectionGuard>`; bind it to a named variable
/// so it lives to the end of the scope.
#[macro_export]
macro_rules! profile_scope {
    ($desc:expr) => {
        $crate::profile_scope!($desc, false)
    };
    ($desc:expr, $resources:expr) => {{
        if $crate::enabled() {
            let section = $crate::Registry::global().section(
                $crate::CallSite::new(file!(), $crate::__function_name!(), line!(), $desc),
                $resources,
            );
            ::std::option::Option::Some($crate::Section::enter(&section))
        } else {
            ::std::option::Option::None
        }
    }};
}

/// [`profile_scope!`] with a resource monitor attached to the section.
#[macro_export]
macro_rules! profile_resource_scope {
    ($desc:expr) => {
        $crate::profile_scope!($desc, true)
    };
}
