use nix::sched::CpuSet;
use nix::sched::sched_setaffinity;
use nix::sys::signal::Signal;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use sysinfo::System;

/// pin the calling thread to one core
pub fn pin_self(core: usize) -> nix::Result<()> {
    let mut set = CpuSet::new();
    set.set(core)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}

/// pin a process and every descendant to one core; children spawned after
/// the walk are caught by the next supervision poll
pub fn pin_tree(pid: u32, core: usize) {
    let mut set = CpuSet::new();
    if set.set(core).is_err() {
        return;
    }
    for p in tree(pid) {
        if let Err(e) = sched_setaffinity(Pid::from_raw(p as i32), &set) {
            log::debug!("pinning pid {} to core {} failed: {}", p, core, e);
        }
    }
}

/// SIGKILL a process and every descendant; misses are logged, never raised
pub fn kill_tree(pid: u32) {
    for p in tree(pid).into_iter().rev() {
        if let Err(e) = kill(Pid::from_raw(p as i32), Signal::SIGKILL) {
            log::info!("tried killing pid {} - {}", p, e);
        }
    }
}

/// the pid plus its transitive children, parents before children
fn tree(root: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();
    let mut pids = vec![root];
    let mut i = 0;
    while i < pids.len() {
        let parent = sysinfo::Pid::from_u32(pids[i]);
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) {
                pids.push(pid.as_u32());
            }
        }
        i += 1;
    }
    pids
}
