//! Hardware breakpoints and watchpoints for PowerPC Linux threads.
//!
//! Requests from the breakpoint layer are kept per process and copied
//! into each thread's debug registers lazily, right before the thread is
//! resumed. Any change to the requests of a process marks all of its
//! threads stale and stops the running ones so they go through that path.

pub mod dreg_interface;
pub mod hit;
pub mod hw_point;
pub mod lifecycle;
pub mod request_store;
pub mod resync;
pub mod thread_state;

use crate::{
    bindings::ppc_hwdebug::PPC_FEATURE_BOOKE,
    error::DregResult,
    kernel::PpcDebugKernel,
    log::LogLevel::LogWarn,
    lwp::{LwpControl, LwpInfo, TrapInfo},
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
    target::{BpType, CanUseHw, HwBpType, HwDebugTarget, MaskedWatchRegisters, WatchCondition},
};
use dreg_interface::{DregInterfaceDetector, HwDebugFeatures};
use hw_point::{calculate_dvc, get_trigger_type, AddrMode, HwDebugPoint};
use libc::pid_t;
use request_store::RequestStore;
use thread_state::ThreadStateTracker;

pub struct PpcLinuxNatTarget<K: PpcDebugKernel> {
    kernel: K,
    dreg_interface: DregInterfaceDetector,
    process_info: RequestStore,
    threads: ThreadStateTracker,
}

/// Do the `len` bytes at `addr` lie within the `size` byte window that
/// starts at `addr` rounded down to a multiple of `align`?
fn fits_window(addr: u64, len: u64, align: u64, size: u64) -> bool {
    match addr.checked_add(len - 1) {
        Some(last) => last <= (addr & !(align - 1)).saturating_add(size - 1),
        None => false,
    }
}

impl<K: PpcDebugKernel> PpcLinuxNatTarget<K> {
    pub fn new(kernel: K) -> PpcLinuxNatTarget<K> {
        PpcLinuxNatTarget {
            kernel,
            dreg_interface: DregInterfaceDetector::new(),
            process_info: RequestStore::new(),
            threads: ThreadStateTracker::new(),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn dreg_interface(&self) -> &DregInterfaceDetector {
        &self.dreg_interface
    }

    pub fn requests(&self) -> &RequestStore {
        &self.process_info
    }

    pub fn threads(&self) -> &ThreadStateTracker {
        &self.threads
    }

    /// Find out which debug register interface to use, through thread
    /// `ptid` if this is the first time.
    pub fn detect(&mut self, ptid: Ptid) {
        self.dreg_interface.detect(&mut self.kernel, ptid);
    }

    fn is_booke(&self) -> bool {
        self.kernel.hwcap() & PPC_FEATURE_BOOKE != 0
    }

    /// Is there a condition register left for another request of the
    /// process of `inferior`?
    fn can_use_watchpoint_cond_accel(&mut self, inferior: Ptid) -> bool {
        self.detect(inferior);

        if !self.dreg_interface.hwdebug_p() {
            return false;
        }

        let cnt = self.dreg_interface.hwdebug_info().num_condition_regs as usize;
        cnt > 0 && cnt > self.process_info.condition_points(inferior.pid())
    }

    /// The request for watching `len` bytes at `addr`. `insert` is false
    /// when building the request to remove, which must come out identical
    /// to the one inserted.
    fn create_watchpoint_request(
        &mut self,
        inferior: Ptid,
        addr: u64,
        len: usize,
        type_: HwBpType,
        cond: Option<&WatchCondition>,
        insert: bool,
    ) -> HwDebugPoint {
        let info = *self.dreg_interface.hwdebug_info();
        let trigger = get_trigger_type(type_);

        if len == 1 || !info.features.contains(HwDebugFeatures::DATA_BP_RANGE) {
            let use_condition = if insert {
                self.can_use_watchpoint_cond_accel(inferior)
            } else {
                info.num_condition_regs > 0
            };
            let condition = match cond {
                Some(c) if use_condition => {
                    calculate_dvc(info.sizeof_condition, addr, c.len, c.data_value)
                }
                _ => None,
            };
            HwDebugPoint {
                trigger,
                addr_mode: AddrMode::Exact,
                condition,
                addr,
                addr2: 0,
            }
        } else {
            // The kernel treats addr2 as exclusive, so this watches
            // [addr, addr + len - 1].
            HwDebugPoint {
                trigger,
                addr_mode: AddrMode::RangeInclusive,
                condition: None,
                addr,
                addr2: addr.saturating_add(len as u64),
            }
        }
    }

    /// The PTRACE_SET_DEBUGREG value for a watchpoint at `addr`.
    fn debugreg_watch_value(&self, addr: u64, type_: HwBpType) -> u64 {
        let (read_mode, write_mode) = if self.is_booke() {
            // 440 style DAC: just the read/write flags.
            (1, 2)
        } else {
            // DABR: read/write flags plus the breakpoint translation bit.
            (5, 6)
        };

        let wp_value = addr & !(read_mode | write_mode);
        match type_ {
            HwBpType::Read => wp_value | read_mode,
            HwBpType::Write => wp_value | write_mode,
            HwBpType::Access => wp_value | read_mode | write_mode,
            HwBpType::Execute => wp_value,
        }
    }

    // The helpers below put the requests back when a thread couldn't be
    // stopped, so the caller's failure leaves nothing behind. Threads that
    // were marked stale just resync to the old requests.

    fn register_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        pid: pid_t,
        point: HwDebugPoint,
    ) -> DregResult<()> {
        self.process_info
            .register_hw_point(self.dreg_interface.interface(), pid, point);
        self.mark_debug_registers_changed(lwps, pid).map_err(|e| {
            self.process_info.clear_hw_point(pid, &point);
            e
        })
    }

    fn clear_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        pid: pid_t,
        point: &HwDebugPoint,
    ) -> DregResult<()> {
        self.process_info.clear_hw_point(pid, point);
        self.mark_debug_registers_changed(lwps, pid).map_err(|e| {
            self.process_info
                .register_hw_point(self.dreg_interface.interface(), pid, *point);
            e
        })
    }

    fn register_wp(&mut self, lwps: &mut dyn LwpControl, pid: pid_t, wp_value: u64) -> DregResult<()> {
        self.process_info
            .register_wp(self.dreg_interface.interface(), pid, wp_value);
        self.mark_debug_registers_changed(lwps, pid).map_err(|e| {
            self.process_info.clear_wp(pid);
            e
        })
    }

    fn clear_wp(&mut self, lwps: &mut dyn LwpControl, pid: pid_t) -> DregResult<()> {
        let old = self.process_info.clear_wp(pid);
        self.mark_debug_registers_changed(lwps, pid).map_err(|e| {
            self.process_info
                .register_wp(self.dreg_interface.interface(), pid, old);
            e
        })
    }
}

impl<K: PpcDebugKernel> HwDebugTarget for PpcLinuxNatTarget<K> {
    fn can_use_hw_breakpoint(
        &mut self,
        inferior: Ptid,
        bp_type: BpType,
        cnt: usize,
        othertype: usize,
    ) -> CanUseHw {
        self.detect(inferior);
        request_store::can_use(self.dreg_interface.interface(), bp_type, cnt, othertype)
    }

    fn region_ok_for_hw_watchpoint(
        &mut self,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> usize {
        if len == 0 {
            return 0;
        }

        self.detect(inferior);

        if self.dreg_interface.unavailable_p() {
            return 0;
        }

        let addr = addr.as_u64();
        let len = len as u64;

        if self.dreg_interface.hwdebug_p() {
            let info = *self.dreg_interface.hwdebug_info();
            let mut region_size = info.data_bp_alignment as u64;
            let mut region_align = region_size;

            // DAC based embedded processors can watch an arbitrary range
            // with two slots.
            if len > 1 && info.features.contains(HwDebugFeatures::DATA_BP_RANGE) && self.is_booke() {
                return 2;
            }
            // A DAWR watches up to 512 bytes. Without a second DAWR the
            // range can't cross a 512 byte boundary.
            if info.features.contains(HwDebugFeatures::DATA_BP_DAWR) {
                region_size = 512;
                if !info.features.contains(HwDebugFeatures::DATA_BP_ARCH_31) {
                    region_align = 512;
                }
            }
            if region_align != 0 && !fits_window(addr, len, region_align, region_size) {
                return 0;
            }
        } else {
            // The low bits of the DEBUGREG value are mode flags, so the
            // watched region is a 4 byte (BookE) or 8 byte (DABR) window.
            ptid_assert!(inferior, self.dreg_interface.debugreg_p());

            if (self.is_booke() && !fits_window(addr, len, 4, 4)) || !fits_window(addr, len, 8, 8) {
                return 0;
            }
        }

        1
    }

    fn insert_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        type_: HwBpType,
        cond: Option<&WatchCondition>,
    ) -> DregResult<bool> {
        self.detect(inferior);

        if self.dreg_interface.unavailable_p() {
            return Ok(false);
        }

        if self.dreg_interface.hwdebug_p() {
            let point =
                self.create_watchpoint_request(inferior, addr.as_u64(), len, type_, cond, true);
            self.register_hw_breakpoint(lwps, inferior.pid(), point)?;
        } else {
            ptid_assert!(inferior, self.dreg_interface.debugreg_p());
            let wp_value = self.debugreg_watch_value(addr.as_u64(), type_);
            self.register_wp(lwps, inferior.pid(), wp_value)?;
        }

        Ok(true)
    }

    fn remove_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
        type_: HwBpType,
        cond: Option<&WatchCondition>,
    ) -> DregResult<bool> {
        ptid_assert!(inferior, !self.dreg_interface.unavailable_p());

        if self.dreg_interface.hwdebug_p() {
            let point =
                self.create_watchpoint_request(inferior, addr.as_u64(), len, type_, cond, false);
            self.clear_hw_breakpoint(lwps, inferior.pid(), &point)?;
        } else {
            ptid_assert!(inferior, self.dreg_interface.debugreg_p());
            self.clear_wp(lwps, inferior.pid())?;
        }

        Ok(true)
    }

    fn insert_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> DregResult<bool> {
        self.detect(inferior);

        if !self.dreg_interface.hwdebug_p() {
            return Ok(false);
        }

        let point = HwDebugPoint::breakpoint(addr.as_u64(), len as u64);
        self.register_hw_breakpoint(lwps, inferior.pid(), point)?;
        Ok(true)
    }

    fn remove_hw_breakpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        len: usize,
    ) -> DregResult<bool> {
        self.detect(inferior);

        if !self.dreg_interface.hwdebug_p() {
            return Ok(false);
        }

        let point = HwDebugPoint::breakpoint(addr.as_u64(), len as u64);
        self.clear_hw_breakpoint(lwps, inferior.pid(), &point)?;
        Ok(true)
    }

    fn insert_mask_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        mask: u64,
        type_: HwBpType,
    ) -> DregResult<bool> {
        ptid_assert!(inferior, self.dreg_interface.hwdebug_p());

        let point = HwDebugPoint::masked_watchpoint(addr.as_u64(), mask, type_);
        self.register_hw_breakpoint(lwps, inferior.pid(), point)?;
        Ok(true)
    }

    fn remove_mask_watchpoint(
        &mut self,
        lwps: &mut dyn LwpControl,
        inferior: Ptid,
        addr: RemotePtr<Void>,
        mask: u64,
        type_: HwBpType,
    ) -> DregResult<bool> {
        ptid_assert!(inferior, self.dreg_interface.hwdebug_p());

        let point = HwDebugPoint::masked_watchpoint(addr.as_u64(), mask, type_);
        self.clear_hw_breakpoint(lwps, inferior.pid(), &point)?;
        Ok(true)
    }

    fn masked_watch_num_registers(
        &mut self,
        inferior: Ptid,
        _addr: RemotePtr<Void>,
        mask: u64,
    ) -> MaskedWatchRegisters {
        self.detect(inferior);

        if !self.dreg_interface.hwdebug_p()
            || !self
                .dreg_interface
                .hwdebug_info()
                .features
                .contains(HwDebugFeatures::DATA_BP_MASK)
        {
            MaskedWatchRegisters::Unsupported
        } else if mask & 0xC000_0000 != 0xC000_0000 {
            log!(
                LogWarn,
                "The given mask covers kernel address space and cannot be used."
            );
            MaskedWatchRegisters::KernelSpace
        } else {
            MaskedWatchRegisters::Registers(2)
        }
    }

    fn ranged_break_num_registers(&mut self, inferior: Ptid) -> Option<usize> {
        self.detect(inferior);

        if self.dreg_interface.hwdebug_p()
            && self
                .dreg_interface
                .hwdebug_info()
                .features
                .contains(HwDebugFeatures::INSN_BP_RANGE)
        {
            Some(2)
        } else {
            None
        }
    }

    fn can_accel_watchpoint_condition(
        &mut self,
        inferior: Ptid,
        _addr: RemotePtr<Void>,
        _len: usize,
        _type_: HwBpType,
        cond: Option<&WatchCondition>,
    ) -> bool {
        self.detect(inferior);

        self.dreg_interface.hwdebug_p()
            && self.dreg_interface.hwdebug_info().num_condition_regs > 0
            && cond.is_some()
    }

    fn watchpoint_addr_within_range(
        &self,
        addr: RemotePtr<Void>,
        start: RemotePtr<Void>,
        length: usize,
    ) -> bool {
        if self.dreg_interface.unavailable_p() {
            fatal!("Watchpoint range check with no debug register interface");
        }

        let addr = addr.as_u64();
        let start = start.as_u64();
        let length = length as u64;

        if self.dreg_interface.hwdebug_p() && self.is_booke() {
            return start <= addr && addr - start <= length;
        }

        let mask = if self.is_booke() { 3 } else { 7 };
        let addr = addr & !mask;

        // Does [start, start + length - 1] intersect [addr, addr + mask]?
        length > 0 && start <= addr + mask && start.saturating_add(length - 1) >= addr
    }

    fn stopped_by_watchpoint(&mut self, ptid: Ptid, trap: &TrapInfo) -> DregResult<bool> {
        Ok(self.low_stopped_data_address(ptid, trap).is_some())
    }

    fn stopped_data_address(
        &mut self,
        ptid: Ptid,
        trap: &TrapInfo,
    ) -> DregResult<Option<RemotePtr<Void>>> {
        Ok(self.low_stopped_data_address(ptid, trap))
    }

    fn low_new_thread(&mut self, ptid: Ptid) {
        self.new_thread(ptid);
    }

    fn low_delete_thread(&mut self, ptid: Ptid) {
        self.delete_thread(ptid);
    }

    fn low_new_fork(&mut self, parent: Ptid, child_pid: pid_t) {
        self.new_fork(parent, child_pid);
    }

    fn low_new_clone(&mut self, parent: Ptid, child_lwp: pid_t) {
        self.new_clone(parent, child_lwp);
    }

    fn low_forget_process(&mut self, pid: pid_t) {
        self.forget_process(pid);
    }

    fn low_prepare_to_resume(&mut self, lwp: &LwpInfo) -> DregResult<()> {
        self.resync_debug_regs(lwp)
    }
}
