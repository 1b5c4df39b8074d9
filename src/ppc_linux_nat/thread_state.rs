use super::hw_point::HwDebugPoint;
use crate::ptid::Ptid;
use libc::pid_t;
use std::collections::HashMap;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ThreadDebugState {
    pub ptid: Ptid,
    /// The hardware of this thread may not match the requests of its
    /// process.
    pub stale: bool,
}

/// A slot we programmed into a thread, and with what.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct InstalledSlot {
    pub slot: i64,
    pub point: HwDebugPoint,
}

/// What each thread's hardware holds, as far as we know.
#[derive(Default, Debug)]
pub struct ThreadStateTracker {
    states: HashMap<Ptid, ThreadDebugState>,
    installed: HashMap<Ptid, Vec<InstalledSlot>>,
}

impl ThreadStateTracker {
    pub fn new() -> ThreadStateTracker {
        Default::default()
    }

    /// Threads we haven't seen before are assumed stale.
    pub fn get_or_create(&mut self, ptid: Ptid) -> &mut ThreadDebugState {
        self.states
            .entry(ptid)
            .or_insert(ThreadDebugState { ptid, stale: true })
    }

    pub fn get(&self, ptid: Ptid) -> Option<&ThreadDebugState> {
        self.states.get(&ptid)
    }

    pub fn is_stale(&self, ptid: Ptid) -> bool {
        self.states.get(&ptid).map_or(true, |s| s.stale)
    }

    pub fn has_installed(&self, ptid: Ptid) -> bool {
        self.installed.contains_key(&ptid)
    }

    pub fn installed(&self, ptid: Ptid) -> &[InstalledSlot] {
        self.installed.get(&ptid).map_or(&[], |v| v.as_slice())
    }

    pub fn installed_mut(&mut self, ptid: Ptid) -> &mut Vec<InstalledSlot> {
        self.installed.entry(ptid).or_default()
    }

    /// The kernel copies debug registers to a new thread on fork and clone
    /// (or might). Assume it did; resync copes if it didn't.
    pub fn copy_installed(&mut self, from: Ptid, to: Ptid) {
        if let Some(slots) = self.installed.get(&from).cloned() {
            self.installed.insert(to, slots);
        }
    }

    pub fn erase(&mut self, ptid: Ptid) {
        self.states.remove(&ptid);
        self.installed.remove(&ptid);
    }

    pub fn erase_installed(&mut self, ptid: Ptid) {
        self.installed.remove(&ptid);
    }

    pub fn erase_process(&mut self, pid: pid_t) {
        let filter = Ptid::from_pid(pid);
        self.states.retain(|p, _| !p.matches(filter));
        self.installed.retain(|p, _| !p.matches(filter));
    }
}
