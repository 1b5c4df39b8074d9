//! What the breakpoint layer of the debugger expects from a native target
//! that can program hardware breakpoints and watchpoints.

use crate::{
    error::DregResult,
    lwp::{LwpControl, LwpInfo, TrapInfo},
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
};
use libc::pid_t;

/// The kind of breakpoint the breakpoint layer is asking about in
/// `can_use_hw_breakpoint()`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BpType {
    /// A watchpoint the breakpoint layer would like to put in hardware.
    Watchpoint,
    HardwareWatchpoint,
    ReadWatchpoint,
    AccessWatchpoint,
    HardwareBreakpoint,
    /// Anything else, e.g. a software breakpoint.
    Other,
}

impl BpType {
    pub fn is_watchpoint(self) -> bool {
        match self {
            BpType::Watchpoint
            | BpType::HardwareWatchpoint
            | BpType::ReadWatchpoint
            | BpType::AccessWatchpoint => true,
            BpType::HardwareBreakpoint | BpType::Other => false,
        }
    }
}

/// Which accesses trigger a hardware watchpoint.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum HwBpType {
    Write,
    Read,
    Access,
    Execute,
}

/// Answer to `can_use_hw_breakpoint()`. The discriminants are the
/// traditional 0 / -1 / 1 return values.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(i32)]
pub enum CanUseHw {
    /// The target has no slots of this kind at all.
    Unsupported = 0,
    /// Not enough slots for the requested count.
    Insufficient = -1,
    Available = 1,
}

/// A watchpoint condition already reduced by the breakpoint layer to
/// "the `len` bytes at the watched address equal `data_value`", which
/// is what data value compare hardware can evaluate.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct WatchCondition {
    pub data_value: u64,
    pub len: usize,
}

/// Answer to `masked_watch_num_registers()`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MaskedWatchRegisters {
    Unsupported,
    /// The mask would cover kernel address space.
    KernelSpace,
    Registers(usize),
}

/// Hardware breakpoint and watchpoint operations of a native target.
///
/// Inserting and removing only records the request; the hardware is
/// programmed by `low_prepare_to_resume()` right before each thread runs.
/// `Ok(false)` means the target can't do what was asked, `Err` means the
/// kernel failed us and the caller should not resume.
pub trait HwDebugTarget {
    fn can_use_hw_breakpoint(
        &mut self,
        inferior: Ptid,
        bp_type: BpType,
        cnt: usize,
        othertype: usize,
    ) -> CanUseHw;

    /// How many slots are needed to watch `len` bytes at `addr`. 0 if it
    /// can't be done.
    fn region_ok_for_hw_watchpoint(
        &mut self,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> usize;

    fn insert_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        type_: HwBpType,
        cond: Option<&WatchCondition>,
    ) -> DregResult<bool>;

    fn remove_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        type_: HwBpType,
        cond: Option<&WatchCondition>,
    ) -> DregResult<bool>;

    /// `len == 0` is a breakpoint on a single instruction address.
    fn insert_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> DregResult<bool>;

    fn remove_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> DregResult<bool>;

    fn insert_mask_watchpoint(
        &mut self,
        _lwps: &mut dyn LwpControl,
        _inferior: Ptid,
        _addr: RemotePtr<Void>,
        _mask: u64,
        _type_: HwBpType,
    ) -> DregResult<bool> {
        Ok(false)
    }

    fn remove_mask_watchpoint(
        &mut self,
        _lwps: &mut dyn LwpControl,
        _inferior: Ptid,
        _addr: RemotePtr<Void>,
        _mask: u64,
        _type_: HwBpType,
    ) -> DregResult<bool> {
        Ok(false)
    }

    fn masked_watch_num_registers(
        &mut self,
        _inferior: Ptid,
        _addr: RemotePtr<Void>,
        _mask: u64,
    ) -> MaskedWatchRegisters {
        MaskedWatchRegisters::Unsupported
    }

    /// Number of slots a ranged hardware breakpoint takes, if supported.
    fn ranged_break_num_registers(&mut self, _inferior: Ptid) -> Option<usize> {
        None
    }

    fn can_accel_watchpoint_condition(
        &mut self,
        _inferior: Ptid,
        _addr: RemotePtr<Void>,
        _len: usize,
        _type_: HwBpType,
        _cond: Option<&WatchCondition>,
    ) -> bool {
        false
    }

    /// Does a reported trap address `addr` belong to the watchpoint
    /// covering `length` bytes at `start`?
    fn watchpoint_addr_within_range(
        &self,
        addr: RemotePtr<Void>,
        start: RemotePtr<Void>,
        length: usize,
    ) -> bool {
        start <= addr && addr.as_u64() - start.as_u64() < length as u64
    }

    fn stopped_by_watchpoint(&mut self, ptid: Ptid, trap: &TrapInfo) -> DregResult<bool>;

    /// The data address that triggered the watchpoint, if known.
    fn stopped_data_address(
        &mut self,
        _ptid: Ptid,
        _trap: &TrapInfo,
    ) -> DregResult<Option<RemotePtr<Void>>> {
        Ok(None)
    }

    /// A thread other than the initial one was added.
    fn low_new_thread(&mut self, ptid: Ptid);

    fn low_delete_thread(&mut self, ptid: Ptid);

    fn low_new_fork(&mut self, parent: Ptid, child_pid: pid_t);

    fn low_new_clone(&mut self, _parent: Ptid, _child_lwp: pid_t) {}

    /// The debugger is no longer interested in process `pid`.
    fn low_forget_process(&mut self, pid: pid_t);

    /// Make the hardware of `lwp` match the requests of its process. Must be
    /// called before every resume of `lwp`.
    fn low_prepare_to_resume(&mut self, lwp: &LwpInfo) -> DregResult<()>;
}
