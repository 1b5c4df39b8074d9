use super::{
    dreg_interface::DregInterface,
    request_store::ProcessRequests,
    thread_state::InstalledSlot,
    PpcLinuxNatTarget,
};
use crate::{
    error::{DregError, DregResult},
    flags::Flags,
    kernel::PpcDebugKernel,
    log::LogLevel::{LogDebug, LogInfo},
    lwp::{LwpInfo, StopReason},
    ptid::Ptid,
};
use nix::errno::Errno;

impl<K: PpcDebugKernel> PpcLinuxNatTarget<K> {
    /// Make the debug registers of `lwp` match the requests of its process.
    ///
    /// Some kernels disable a watchpoint once it is hit, so a thread that
    /// stopped for a hardware breakpoint or watchpoint is refreshed even if
    /// nothing changed.
    pub(super) fn resync_debug_regs(&mut self, lwp: &LwpInfo) -> DregResult<()> {
        if !self.dreg_interface.detected_p() || self.dreg_interface.unavailable_p() {
            return Ok(());
        }

        let ptid = lwp.ptid;
        let stale_dregs = match lwp.stop_reason {
            StopReason::Watchpoint | StopReason::HwBreakpoint => true,
            _ => self.threads.get_or_create(ptid).stale,
        };
        if !stale_dregs {
            return Ok(());
        }

        ptid_assert!(ptid, ptid.lwp_p());

        match (self.dreg_interface.interface(), self.process_info.get(ptid.pid())) {
            (DregInterface::HwDebug(_), requests) => {
                let requested = match requests {
                    Some(ProcessRequests::HwDebug(points)) => points.as_slice(),
                    Some(ProcessRequests::DebugReg(_)) => {
                        fatal!("DEBUGREG requests for {} using HWDEBUG", ptid)
                    }
                    None => &[],
                };
                remove_installed(&mut self.kernel, self.threads.installed_mut(ptid), ptid)?;
                if requests.is_some() {
                    let installed = self.threads.installed_mut(ptid);
                    for point in requested {
                        let slot = self
                            .kernel
                            .set_hwdebug(ptid.lwp(), &point.to_kernel())
                            .map_err(|e| {
                                DregError::ptrace(
                                    "Error setting hardware breakpoint or watchpoint",
                                    ptid,
                                    e,
                                )
                            })?;
                        log!(LogDebug, "{}: installed {} in slot {}", ptid, point, slot);
                        installed.insert(0, InstalledSlot { slot, point: *point });
                    }
                }
            }
            (DregInterface::DebugReg, requests) => {
                let wp = match requests {
                    Some(ProcessRequests::DebugReg(wp)) => *wp,
                    Some(ProcessRequests::HwDebug(_)) => {
                        fatal!("HWDEBUG requests for {} using DEBUGREG", ptid)
                    }
                    None => None,
                };
                // Some kernels don't re-enable a watchpoint that was hit
                // when it is simply overwritten, so always clear first.
                self.kernel
                    .set_debugreg(ptid.lwp(), 0)
                    .map_err(|e| DregError::ptrace("Error clearing hardware watchpoint", ptid, e))?;
                if let Some(wp) = wp {
                    self.kernel
                        .set_debugreg(ptid.lwp(), wp)
                        .map_err(|e| DregError::ptrace("Error setting hardware watchpoint", ptid, e))?;
                    log!(LogDebug, "{}: debug register set to {:#x}", ptid, wp);
                }
            }
            (DregInterface::Unavailable, _) => return Ok(()),
        }

        self.threads.get_or_create(ptid).stale = false;

        if Flags::get().show_debug_regs {
            self.show_debug_regs(ptid);
        }

        Ok(())
    }

    /// Dump what we believe `ptid`'s debug registers hold.
    pub fn show_debug_regs(&self, ptid: Ptid) {
        match self.dreg_interface.interface() {
            DregInterface::HwDebug(_) => {
                let installed = self.threads.installed(ptid);
                log!(LogInfo, "{}: {} slot(s) installed", ptid, installed.len());
                for s in installed {
                    log!(LogInfo, "{}:   slot {}: {}", ptid, s.slot, s.point);
                }
            }
            DregInterface::DebugReg => match self.process_info.get(ptid.pid()) {
                Some(ProcessRequests::DebugReg(Some(wp))) => {
                    log!(LogInfo, "{}: debug register {:#x}", ptid, wp)
                }
                _ => log!(LogInfo, "{}: debug register clear", ptid),
            },
            DregInterface::Unavailable => (),
        }
    }
}

/// Remove every slot in `installed` from the thread. Each record goes as
/// soon as its slot is gone, so on error the records still describe what
/// the thread holds.
///
/// ENOENT is fine: the kernel may or may not have copied the slots of the
/// parent on fork and clone, and we always assume it did.
fn remove_installed<K: PpcDebugKernel>(
    kernel: &mut K,
    installed: &mut Vec<InstalledSlot>,
    ptid: Ptid,
) -> DregResult<()> {
    while let Some(s) = installed.first().copied() {
        match kernel.del_hwdebug(ptid.lwp(), s.slot) {
            Ok(()) => log!(LogDebug, "{}: removed slot {}", ptid, s.slot),
            Err(Errno::ENOENT) => log!(LogDebug, "{}: slot {} already empty", ptid, s.slot),
            Err(e) => {
                return Err(DregError::ptrace(
                    "Error deleting hardware breakpoint or watchpoint",
                    ptid,
                    e,
                ))
            }
        }
        installed.remove(0);
    }
    Ok(())
}
