use super::PpcLinuxNatTarget;
use crate::{
    error::DregResult,
    kernel::PpcDebugKernel,
    log::LogLevel::LogDebug,
    lwp::LwpControl,
    ptid::Ptid,
};
use libc::pid_t;
use nix::errno::Errno;

impl<K: PpcDebugKernel> PpcLinuxNatTarget<K> {
    pub(super) fn mark_thread_stale(&mut self, ptid: Ptid) {
        self.threads.get_or_create(ptid).stale = true;
    }

    /// The requests of `pid` changed. Every thread of `pid` must resync
    /// before it runs again, so stop the ones that are running.
    ///
    /// Every running thread gets a stop request even if an earlier one
    /// failed. A thread that is already gone is skipped. The first other
    /// failure is returned.
    pub(super) fn mark_debug_registers_changed(
        &mut self,
        lwps: &mut dyn LwpControl,
        pid: pid_t,
    ) -> DregResult<()> {
        let threads = lwps.lwps_of(pid);

        // All threads are marked before any is stopped, so a stop that
        // gets reported early still finds its thread stale.
        for &ptid in &threads {
            self.mark_thread_stale(ptid);
        }

        let mut result = Ok(());
        for &ptid in &threads {
            if lwps.is_stopped(ptid) {
                continue;
            }
            log!(LogDebug, "{}: stopping to update debug registers", ptid);
            match lwps.stop_lwp(ptid) {
                Ok(()) => (),
                // Exiting. Its exit is reported later.
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

    /// Assume the kernel copied the debug registers of `parent` into
    /// `child`. Resync copes with it not having done so.
    fn copy_thread_dreg_state(&mut self, parent: Ptid, child: Ptid) {
        ptid_assert!(parent, self.dreg_interface.hwdebug_p());
        self.threads.copy_installed(parent, child);
    }

    fn dregs_in_use(&self) -> bool {
        self.dreg_interface.detected_p() && !self.dreg_interface.unavailable_p()
    }

    /// Not called for the initial thread of a process.
    pub(super) fn new_thread(&mut self, ptid: Ptid) {
        self.mark_thread_stale(ptid);
    }

    pub(super) fn delete_thread(&mut self, ptid: Ptid) {
        if self.dreg_interface.detected_p() && self.dreg_interface.hwdebug_p() {
            self.threads.erase_installed(ptid);
        }
        self.threads.erase(ptid);
    }

    /// A forked child has its parent's breakpoints and watchpoints.
    pub(super) fn new_fork(&mut self, parent: Ptid, child_pid: pid_t) {
        if !self.dregs_in_use() {
            return;
        }

        self.process_info.copy_process(parent.pid(), child_pid);

        if self.dreg_interface.hwdebug_p() {
            self.copy_thread_dreg_state(parent, Ptid::new(child_pid, child_pid));
        }
    }

    pub(super) fn new_clone(&mut self, parent: Ptid, child_lwp: pid_t) {
        if !self.dregs_in_use() {
            return;
        }

        if self.dreg_interface.hwdebug_p() {
            self.copy_thread_dreg_state(parent, Ptid::new(parent.pid(), child_lwp));
        }
    }

    /// Also drops the state of the initial thread, which never gets a
    /// `delete_thread()`.
    pub(super) fn forget_process(&mut self, pid: pid_t) {
        if !self.dregs_in_use() {
            return;
        }

        self.process_info.forget(pid);
        self.threads.erase_process(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{info, legacy_target, rich_target};
    use crate::{
        bindings::ppc_hwdebug::PPC_DEBUG_FEATURE_DATA_BP_RANGE,
        fake_kernel::{FakeKernel, FakeLwps},
        lwp::LwpInfo,
        ppc_linux_nat::{request_store::ProcessRequests, PpcLinuxNatTarget},
        ptid::Ptid,
        remote_ptr::RemotePtr,
        target::{HwBpType, HwDebugTarget},
    };
    use nix::errno::Errno;

    #[test]
    fn insert_marks_all_threads_and_stops_running_ones() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(Ptid::new(100, 100), true)
            .add(Ptid::new(100, 101), true)
            .add(Ptid::new(100, 102), false)
            .add(Ptid::new(200, 200), false);

        t.insert_watchpoint(
            &mut lwps,
            Ptid::new(100, 100),
            RemotePtr::new_from_val(0x1000),
            4,
            HwBpType::Write,
            None,
        )
        .unwrap();

        assert_eq!(lwps.stop_requests, vec![Ptid::new(100, 102)]);
        for lwp in 100..103 {
            assert!(t.threads().get(Ptid::new(100, lwp)).unwrap().stale);
        }
        assert!(t.threads().get(Ptid::new(200, 200)).is_none());
    }

    #[test]
    fn stop_failure_still_stops_the_rest_and_undoes_the_insert() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(Ptid::new(100, 100), true)
            .add(Ptid::new(100, 101), false)
            .add(Ptid::new(100, 102), false);
        lwps.fail_stop.insert(Ptid::new(100, 101), Errno::EPERM);

        let r = t.insert_hw_breakpoint(
            &mut lwps,
            Ptid::new(100, 100),
            RemotePtr::new_from_val(0x4000),
            0,
        );
        assert_eq!(r.unwrap_err().errno(), Errno::EPERM);
        assert_eq!(lwps.stop_requests, vec![Ptid::new(100, 102)]);
        assert_eq!(t.requests().get(100), Some(&ProcessRequests::HwDebug(vec![])));
        for lwp in 100..103 {
            assert!(t.threads().get(Ptid::new(100, lwp)).unwrap().stale);
        }
    }

    #[test]
    fn stop_failure_undoes_the_remove() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(Ptid::new(100, 100), true)
            .add(Ptid::new(100, 101), false);
        let addr = RemotePtr::new_from_val(0x4000);
        t.insert_hw_breakpoint(&mut lwps, Ptid::new(100, 100), addr, 0)
            .unwrap();
        let before = t.requests().get(100).cloned();

        lwps.fail_stop.insert(Ptid::new(100, 101), Errno::EPERM);
        assert!(t
            .remove_hw_breakpoint(&mut lwps, Ptid::new(100, 100), addr, 0)
            .is_err());
        assert_eq!(t.requests().get(100).cloned(), before);
    }

    #[test]
    fn thread_gone_before_stop_is_skipped() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        lwps.add(Ptid::new(100, 100), true)
            .add(Ptid::new(100, 101), false)
            .add(Ptid::new(100, 102), false);
        lwps.fail_stop.insert(Ptid::new(100, 101), Errno::ESRCH);

        t.insert_hw_breakpoint(
            &mut lwps,
            Ptid::new(100, 100),
            RemotePtr::new_from_val(0x4000),
            0,
        )
        .unwrap();
        assert_eq!(lwps.stop_requests, vec![Ptid::new(100, 102)]);
        assert!(t.requests().get(100).is_some());
    }

    #[test]
    fn legacy_stop_failure_restores_the_watch_value() {
        let mut t = legacy_target(0);
        let mut lwps = FakeLwps::new();
        lwps.add(Ptid::new(100, 100), true)
            .add(Ptid::new(100, 101), false);
        lwps.fail_stop.insert(Ptid::new(100, 101), Errno::EPERM);

        let r = t.insert_watchpoint(
            &mut lwps,
            Ptid::new(100, 100),
            RemotePtr::new_from_val(0x1000),
            8,
            HwBpType::Write,
            None,
        );
        assert!(r.is_err());
        assert_eq!(t.requests().get(100), Some(&ProcessRequests::DebugReg(None)));

        // A later insert isn't refused as a duplicate.
        t.insert_watchpoint(
            &mut lwps,
            Ptid::new(100, 100),
            RemotePtr::new_from_val(0x1000),
            8,
            HwBpType::Write,
            None,
        )
        .unwrap();
    }

    #[test]
    fn fork_copies_requests_and_installed_slots() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        let parent = Ptid::new(100, 100);
        lwps.add(parent, true);
        t.insert_hw_breakpoint(&mut lwps, parent, RemotePtr::new_from_val(0x4000), 0)
            .unwrap();
        t.low_prepare_to_resume(&LwpInfo::new(parent)).unwrap();

        t.low_new_fork(parent, 300);
        assert_eq!(t.requests().get(300), t.requests().get(100));
        let child = Ptid::new(300, 300);
        assert_eq!(t.threads().installed(child), t.threads().installed(parent));

        // The child resyncs like any new thread, whether or not the
        // kernel kept the slot.
        t.kernel_mut().slots.remove(&300);
        t.low_prepare_to_resume(&LwpInfo::new(child)).unwrap();
        assert_eq!(t.kernel().programmed(300).len(), 1);
        assert_eq!(t.threads().installed(child).len(), 1);
    }

    #[test]
    fn clone_copies_installed_slots() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        let parent = Ptid::new(100, 100);
        lwps.add(parent, true);
        t.insert_hw_breakpoint(&mut lwps, parent, RemotePtr::new_from_val(0x4000), 0)
            .unwrap();
        t.low_prepare_to_resume(&LwpInfo::new(parent)).unwrap();

        t.low_new_clone(parent, 101);
        t.low_new_thread(Ptid::new(100, 101));
        assert_eq!(t.threads().installed(Ptid::new(100, 101)).len(), 1);
        assert!(t.threads().get(Ptid::new(100, 101)).unwrap().stale);

        t.low_delete_thread(Ptid::new(100, 101));
        assert!(t.threads().installed(Ptid::new(100, 101)).is_empty());
        assert!(t.threads().get(Ptid::new(100, 101)).is_none());
    }

    #[test]
    fn forget_process_drops_everything_of_that_process() {
        let mut t = rich_target(info(2, 2, 0, PPC_DEBUG_FEATURE_DATA_BP_RANGE));
        let mut lwps = FakeLwps::new();
        let parent = Ptid::new(100, 100);
        lwps.add(parent, true);
        t.insert_hw_breakpoint(&mut lwps, parent, RemotePtr::new_from_val(0x4000), 0)
            .unwrap();
        t.low_prepare_to_resume(&LwpInfo::new(parent)).unwrap();
        t.low_new_fork(parent, 300);

        t.low_forget_process(100);
        assert!(t.requests().get(100).is_none());
        assert!(!t.threads().has_installed(parent));
        assert!(t.threads().has_installed(Ptid::new(300, 300)));
    }

    #[test]
    fn hooks_do_nothing_before_detection() {
        let mut t = PpcLinuxNatTarget::new(FakeKernel::default());
        t.low_new_fork(Ptid::new(100, 100), 300);
        t.low_new_clone(Ptid::new(100, 100), 101);
        t.low_forget_process(100);
        assert!(!t.dreg_interface().detected_p());
        assert!(t.requests().get(300).is_none());
    }

    #[test]
    fn legacy_fork_copies_watch_value() {
        let mut t = legacy_target(0);
        let mut lwps = FakeLwps::new();
        let parent = Ptid::new(100, 100);
        t.insert_watchpoint(
            &mut lwps,
            parent,
            RemotePtr::new_from_val(0x1000),
            8,
            HwBpType::Write,
            None,
        )
        .unwrap();
        t.low_new_fork(parent, 300);
        assert_eq!(t.requests().get(300), t.requests().get(100));
        assert!(!t.threads().has_installed(Ptid::new(300, 300)));
    }
}
