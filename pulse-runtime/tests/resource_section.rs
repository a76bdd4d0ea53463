//! Integration test: a resource-monitored section samples the real
//! process through sysinfo while the section is active.

use std::time::Duration;

use pulse_runtime::{profile_resource_scope, set_options, Options, Registry};

#[test]
fn resource_scope_collects_samples_while_active() {
    set_options(Options::PROFILER);

    {
        let _section = profile_resource_scope!("resource scope");
        // Long enough for several 100ms sampling cycles.
        std::thread::sleep(Duration::from_millis(350));
    }

    let (_, section) = Registry::global()
        .snapshot(Options::empty())
        .into_iter()
        .find(|(site, _)| site.description() == "resource scope")
        .expect("resource site registered");

    let monitor = section.monitor().expect("section opted into resources");
    assert_eq!(monitor.active_count(), 0, "deactivated after scope exit");

    let memory = monitor.memory_info();
    assert!(
        memory.count() >= 1,
        "expected at least one sample, got {}",
        memory.count()
    );
    assert!(memory.peak() > 0, "a live process has resident memory");

    // CPU percent can legitimately read zero, but never negative into
    // the averages.
    let cpu = monitor.cpu_info();
    assert!(cpu.peak() >= 0);
    assert_eq!(cpu.count(), memory.count());

    set_options(Options::empty());
}
