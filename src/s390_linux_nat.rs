//! Hardware breakpoints and watchpoints for s390 Linux threads, using the
//! Program Event Recording (PER) facility.
//!
//! PER has a single address range per thread. All watchpoints and
//! breakpoints of a process are folded into it and the kernel reports the
//! kind of event in the PER lowcore.

use crate::{
    bindings::s390_per::{
        per_struct,
        PERC_STORAGE_ALTERATION,
        PERC_STORE_REAL_ADDRESS,
        PER_CONTROL_ALTERATION,
        PER_CONTROL_BRANCH_ADDRESS,
        PER_EVENT_BRANCH,
        PER_EVENT_IFETCH,
        PER_EVENT_NULLIFICATION,
        PER_EVENT_STORE,
        PER_FLAG_SINGLE_STEP,
    },
    error::{DregError, DregResult},
    flags::Flags,
    kernel::PerKernel,
    log::LogLevel::{LogDebug, LogInfo, LogWarn},
    lwp::{LwpControl, LwpInfo, TrapInfo},
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
    target::{BpType, CanUseHw, HwBpType, HwDebugTarget, WatchCondition},
};
use libc::pid_t;
use nix::errno::Errno;
use std::collections::HashMap;

/// An inclusive address range.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct WatchArea {
    pub lo_addr: u64,
    pub hi_addr: u64,
}

#[derive(Clone, Default, Debug)]
pub struct S390DebugRegState {
    pub watch_areas: Vec<WatchArea>,
    pub break_areas: Vec<WatchArea>,
}

pub struct S390LinuxNatTarget<K: PerKernel> {
    kernel: K,
    processes: HashMap<pid_t, S390DebugRegState>,
    /// Threads that ever had PER info, and whether it must be rewritten.
    per_info_changed: HashMap<Ptid, bool>,
}

impl<K: PerKernel> S390LinuxNatTarget<K> {
    pub fn new(kernel: K) -> S390LinuxNatTarget<K> {
        S390LinuxNatTarget {
            kernel,
            processes: HashMap::new(),
            per_info_changed: HashMap::new(),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn debug_reg_state(&self, pid: pid_t) -> Option<&S390DebugRegState> {
        self.processes.get(&pid)
    }

    fn state_mut(&mut self, pid: pid_t) -> &mut S390DebugRegState {
        self.processes.entry(pid).or_default()
    }

    fn mark_per_info_changed(&mut self, ptid: Ptid) {
        self.per_info_changed.insert(ptid, true);
    }

    /// Make sure all threads of `pid` rewrite their PER info before they
    /// run again. Every running thread is asked to stop even after a
    /// failure; threads that are already gone don't count as one.
    fn refresh_per_info(&mut self, lwps: &mut dyn LwpControl, pid: pid_t) -> DregResult<()> {
        let threads = lwps.lwps_of(pid);
        for &ptid in &threads {
            self.mark_per_info_changed(ptid);
        }

        let mut result = Ok(());
        for &ptid in &threads {
            if lwps.is_stopped(ptid) {
                continue;
            }
            match lwps.stop_lwp(ptid) {
                Ok(()) => (),
                Err(e) if e.errno() == Errno::ESRCH => {
                    log!(LogDebug, "{}: gone before it could be stopped", ptid)
                }
                Err(e) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    fn tid_of(ptid: Ptid) -> pid_t {
        if ptid.lwp_p() {
            ptid.lwp()
        } else {
            ptid.pid()
        }
    }

    pub fn show_debug_regs(&mut self, ptid: Ptid, where_: &str) -> DregResult<()> {
        let tid = Self::tid_of(ptid);
        let per_info = self
            .kernel
            .peek_per_info(tid)
            .map_err(|e| DregError::ptrace("Couldn't retrieve debug regs", ptid, e))?;
        log!(
            LogInfo,
            "PER (debug) state for {} -- {}\n  cr9-11: {:x} {:x} {:x}\n  start, end: {:x} {:x}\n  code/ATMID: {:x}  address: {:x}  PAID: {:x}",
            tid,
            where_,
            per_info.control_regs[0],
            per_info.control_regs[1],
            per_info.control_regs[2],
            per_info.starting_addr,
            per_info.ending_addr,
            per_info.lowcore.perc_atmid,
            per_info.lowcore.address,
            per_info.lowcore.access_id
        );
        Ok(())
    }
}

/// The PER block for a thread of a process with `state`.
fn build_per_info(state: &S390DebugRegState, step: bool) -> per_struct {
    let mut per_info = per_struct::default();
    if step {
        // Only older kernels look at this.
        per_info.flags |= PER_FLAG_SINGLE_STEP;
    }

    let mut watch_lo_addr = u64::MAX;
    let mut watch_hi_addr = 0;

    if !state.watch_areas.is_empty() {
        for area in &state.watch_areas {
            watch_lo_addr = watch_lo_addr.min(area.lo_addr);
            watch_hi_addr = watch_hi_addr.max(area.hi_addr);
        }
        per_info.control_regs[0] |= PER_EVENT_STORE | PER_CONTROL_ALTERATION;
    }

    // Our nullification setting could conflict with the kernel's while
    // single stepping, so breakpoints wait for the next plain resume.
    if !state.break_areas.is_empty() && !step {
        for area in &state.break_areas {
            watch_lo_addr = watch_lo_addr.min(area.lo_addr);
            watch_hi_addr = watch_hi_addr.max(area.hi_addr);
        }

        if watch_hi_addr == watch_lo_addr {
            // One breakpoint: nullify the fetch of exactly that address.
            per_info.control_regs[0] |= PER_EVENT_NULLIFICATION | PER_EVENT_IFETCH;
        } else {
            // Stop after any instruction in the range and any branch into
            // it. The range must include the instruction before the first
            // breakpoint.
            watch_lo_addr = watch_lo_addr.saturating_sub(6);
            per_info.control_regs[0] |=
                PER_EVENT_BRANCH | PER_EVENT_IFETCH | PER_CONTROL_BRANCH_ADDRESS;
        }
    }

    per_info.starting_addr = watch_lo_addr;
    per_info.ending_addr = watch_hi_addr;
    per_info
}

impl<K: PerKernel> HwDebugTarget for S390LinuxNatTarget<K> {
    fn can_use_hw_breakpoint(
        &mut self,
        _inferior: Ptid,
        bp_type: BpType,
        _cnt: usize,
        _othertype: usize,
    ) -> CanUseHw {
        match bp_type {
            BpType::HardwareWatchpoint | BpType::HardwareBreakpoint => CanUseHw::Available,
            _ => CanUseHw::Unsupported,
        }
    }

    fn region_ok_for_hw_watchpoint(
        &mut self,
        _inferior: Ptid,
        _addr: RemotePtr<Void>,
        _len: usize,
    ) -> usize {
        1
    }

    fn insert_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        _type_: HwBpType,
        _cond: Option<&WatchCondition>,
    ) -> DregResult<bool> {
        let lo_addr = addr.as_u64();
        let area = WatchArea {
            lo_addr,
            hi_addr: lo_addr.saturating_add((len as u64).saturating_sub(1)),
        };
        self.state_mut(inferior.pid()).watch_areas.push(area);
        if let Err(e) = self.refresh_per_info(lwps, inferior.pid()) {
            self.state_mut(inferior.pid()).watch_areas.pop();
            return Err(e);
        }
        Ok(true)
    }

    fn remove_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        _type_: HwBpType,
        _cond: Option<&WatchCondition>,
    ) -> DregResult<bool> {
        let lo_addr = addr.as_u64();
        let area = WatchArea {
            lo_addr,
            hi_addr: lo_addr.saturating_add((len as u64).saturating_sub(1)),
        };
        let areas = &mut self.state_mut(inferior.pid()).watch_areas;
        match areas.iter().position(|a| *a == area) {
            Some(ix) => {
                areas.swap_remove(ix);
                if let Err(e) = self.refresh_per_info(lwps, inferior.pid()) {
                    self.state_mut(inferior.pid()).watch_areas.push(area);
                    return Err(e);
                }
                Ok(true)
            }
            None => {
                log!(LogWarn, "Attempt to remove nonexistent watchpoint.");
                Ok(false)
            }
        }
    }

    fn insert_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        _len: usize,
    ) -> DregResult<bool> {
        let area = WatchArea {
            lo_addr: addr.as_u64(),
            hi_addr: addr.as_u64(),
        };
        self.state_mut(inferior.pid()).break_areas.push(area);
        if let Err(e) = self.refresh_per_info(lwps, inferior.pid()) {
            self.state_mut(inferior.pid()).break_areas.pop();
            return Err(e);
        }
        Ok(true)
    }

    fn remove_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        _len: usize,
    ) -> DregResult<bool> {
        let areas = &mut self.state_mut(inferior.pid()).break_areas;
        match areas.iter().position(|a| a.lo_addr == addr.as_u64()) {
            Some(ix) => {
                let area = areas.swap_remove(ix);
                if let Err(e) = self.refresh_per_info(lwps, inferior.pid()) {
                    self.state_mut(inferior.pid()).break_areas.push(area);
                    return Err(e);
                }
                Ok(true)
            }
            None => {
                log!(LogWarn, "Attempt to remove nonexistent breakpoint.");
                Ok(false)
            }
        }
    }

    fn stopped_by_watchpoint(&mut self, ptid: Ptid, trap: &TrapInfo) -> DregResult<bool> {
        if Flags::get().show_debug_regs {
            self.show_debug_regs(ptid, "stop")?;
        }

        match self.processes.get(&ptid.pid()) {
            Some(state) if !state.watch_areas.is_empty() => (),
            _ => return Ok(false),
        }

        if !trap.is_hw_breakpoint_trap() {
            return Ok(false);
        }

        let lowcore = self
            .kernel
            .peek_per_lowcore(Self::tid_of(ptid))
            .map_err(|e| DregError::ptrace("Couldn't retrieve watchpoint status", ptid, e))?;

        Ok(lowcore.perc_atmid & PERC_STORAGE_ALTERATION != 0
            && lowcore.perc_atmid & PERC_STORE_REAL_ADDRESS == 0)
    }

    fn low_new_thread(&mut self, ptid: Ptid) {
        self.mark_per_info_changed(ptid);
    }

    fn low_delete_thread(&mut self, ptid: Ptid) {
        self.per_info_changed.remove(&ptid);
    }

    fn low_new_fork(&mut self, parent: Ptid, child_pid: pid_t) {
        // Nothing was ever set in the parent.
        if !self.per_info_changed.contains_key(&parent) {
            return;
        }

        let parent_state = self.state_mut(parent.pid()).clone();
        *self.state_mut(child_pid) = parent_state;
    }

    fn low_forget_process(&mut self, pid: pid_t) {
        self.processes.remove(&pid);
    }

    fn low_prepare_to_resume(&mut self, lwp: &LwpInfo) -> DregResult<()> {
        let ptid = lwp.ptid;
        let step = lwp.stepping;

        let changed = match self.per_info_changed.get(&ptid) {
            Some(&changed) => changed,
            // Never had PER info.
            None => return Ok(()),
        };

        let state = self
            .processes
            .get(&ptid.pid())
            .cloned()
            .unwrap_or_default();

        // Breakpoints are taken out while stepping, so stepping with
        // breakpoints always rewrites PER info.
        if !changed && (!step || state.break_areas.is_empty()) {
            return Ok(());
        }

        let per_info = build_per_info(&state, step);
        let tid = Self::tid_of(ptid);
        self.kernel
            .poke_per_info(tid, &per_info)
            .map_err(|e| DregError::ptrace("Couldn't modify watchpoint status", ptid, e))?;

        // Put the breakpoints back after the step.
        let changed_after = step && !state.break_areas.is_empty();
        self.per_info_changed.insert(ptid, changed_after);

        if Flags::get().show_debug_regs {
            self.show_debug_regs(ptid, "resume")?;
        }

        Ok(())
    }
}
