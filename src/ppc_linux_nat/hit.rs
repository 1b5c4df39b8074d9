use super::{dreg_interface::DregInterface, PpcLinuxNatTarget};
use crate::{
    kernel::PpcDebugKernel,
    lwp::TrapInfo,
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
};

impl<K: PpcDebugKernel> PpcLinuxNatTarget<K> {
    /// If `ptid` stopped because of one of our watchpoints, the data
    /// address the kernel reported.
    pub(super) fn low_stopped_data_address(&self, ptid: Ptid, trap: &TrapInfo) -> Option<RemotePtr<Void>> {
        if !trap.is_hw_breakpoint_trap() {
            return None;
        }

        ptid_assert!(ptid, !self.dreg_interface.unavailable_p());

        // DEBUGREG only has a watchpoint, so any hardware trap is one.
        if let DregInterface::HwDebug(_) = self.dreg_interface.interface() {
            // Kernels with CONFIG_PPC_ADV_DEBUG_REGS put the slot in
            // si_errno. Others put something that matches no slot.
            let slot = trap.errno as i64;

            ptid_assert!(
                ptid,
                self.threads.has_installed(ptid),
                "TRAP_HWBKPT with nothing installed"
            );

            if self
                .threads
                .installed(ptid)
                .iter()
                .any(|s| s.slot == slot && s.point.is_breakpoint())
            {
                return None;
            }
        }

        Some(trap.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{info, legacy_target, rich_target};
    use crate::{
        bindings::{
            ppc_hwdebug::PPC_DEBUG_FEATURE_DATA_BP_RANGE,
            signal::{TRAP_BRKPT, TRAP_HWBKPT},
        },
        fake_kernel::FakeLwps,
        lwp::{LwpInfo, TrapInfo},
        ptid::Ptid,
        remote_ptr::RemotePtr,
        target::{HwBpType, HwDebugTarget},
    };

    const MAIN: Ptid = Ptid::new(100, 100);

    fn trap(code: i32, slot: i32, addr: usize) -> TrapInfo {
        TrapInfo {
            signo: libc::SIGTRAP,
            code,
            errno: slot,
            addr: RemotePtr::new_from_val(addr),
        }
    }

    #[test]
    fn execute_slot_is_not_a_watchpoint_hit() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(MAIN, true);
        t.insert_hw_breakpoint(&mut lwps, MAIN, RemotePtr::new_from_val(0x4000), 0)
            .unwrap();
        t.insert_watchpoint(
            &mut lwps,
            MAIN,
            RemotePtr::new_from_val(0x1000),
            1,
            HwBpType::Write,
            None,
        )
        .unwrap();
        t.low_prepare_to_resume(&LwpInfo::new(MAIN)).unwrap();

        let bp_slot = t
            .threads()
            .installed(MAIN)
            .iter()
            .find(|s| s.point.is_breakpoint())
            .unwrap()
            .slot;
        let wp_slot = t
            .threads()
            .installed(MAIN)
            .iter()
            .find(|s| !s.point.is_breakpoint())
            .unwrap()
            .slot;

        let bp_trap = trap(TRAP_HWBKPT, bp_slot as i32, 0x4000);
        assert!(!t.stopped_by_watchpoint(MAIN, &bp_trap).unwrap());
        assert_eq!(t.stopped_data_address(MAIN, &bp_trap).unwrap(), None);

        let wp_trap = trap(TRAP_HWBKPT, wp_slot as i32, 0x1000);
        assert!(t.stopped_by_watchpoint(MAIN, &wp_trap).unwrap());
        assert_eq!(
            t.stopped_data_address(MAIN, &wp_trap).unwrap(),
            Some(RemotePtr::new_from_val(0x1000))
        );
    }

    #[test]
    fn unknown_slot_reports_address() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(MAIN, true);
        t.insert_hw_breakpoint(&mut lwps, MAIN, RemotePtr::new_from_val(0x4000), 0)
            .unwrap();
        t.low_prepare_to_resume(&LwpInfo::new(MAIN)).unwrap();

        let tr = trap(TRAP_HWBKPT, 0, 0x2008);
        assert_eq!(
            t.stopped_data_address(MAIN, &tr).unwrap(),
            Some(RemotePtr::new_from_val(0x2008))
        );
    }

    #[test]
    fn other_traps_are_not_hits() {
        let t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        assert_eq!(t.low_stopped_data_address(MAIN, &trap(TRAP_BRKPT, 1, 0x1000)), None);
        let mut tr = trap(TRAP_HWBKPT, 1, 0x1000);
        tr.signo = libc::SIGSEGV;
        assert_eq!(t.low_stopped_data_address(MAIN, &tr), None);
    }

    #[test]
    fn legacy_hit_is_always_the_watchpoint() {
        let t = legacy_target(0);
        assert_eq!(
            t.low_stopped_data_address(MAIN, &trap(TRAP_HWBKPT, 0, 0x1004)),
            Some(RemotePtr::new_from_val(0x1004))
        );
    }
}
