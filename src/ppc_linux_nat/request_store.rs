use super::{
    dreg_interface::DregInterface,
    hw_point::HwDebugPoint,
};
use crate::target::{BpType, CanUseHw};
use libc::pid_t;
use std::collections::HashMap;

/// Everything the breakpoint layer asked for in one process, in the shape
/// the detected interface can express.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ProcessRequests {
    HwDebug(Vec<HwDebugPoint>),
    /// The raw value for PTRACE_SET_DEBUGREG, if a watchpoint is wanted.
    DebugReg(Option<u64>),
}

impl ProcessRequests {
    fn empty_for(interface: &DregInterface) -> ProcessRequests {
        match interface {
            DregInterface::HwDebug(_) => ProcessRequests::HwDebug(Vec::new()),
            DregInterface::DebugReg => ProcessRequests::DebugReg(None),
            DregInterface::Unavailable => {
                fatal!("Requests stored with no debug register interface")
            }
        }
    }
}

/// Can `cnt` points of `bp_type` be set when `othertype` other watchpoints
/// already are?
pub fn can_use(interface: &DregInterface, bp_type: BpType, cnt: usize, othertype: usize) -> CanUseHw {
    let (total_hw_wp, total_hw_bp) = match interface {
        DregInterface::HwDebug(info) => {
            (info.num_data_bps as usize, info.num_instruction_bps as usize)
        }
        DregInterface::DebugReg => (1, 0),
        DregInterface::Unavailable => return CanUseHw::Unsupported,
    };

    if bp_type.is_watchpoint() {
        if total_hw_wp == 0 {
            CanUseHw::Unsupported
        } else if cnt + othertype > total_hw_wp {
            CanUseHw::Insufficient
        } else {
            CanUseHw::Available
        }
    } else if bp_type == BpType::HardwareBreakpoint {
        if total_hw_bp == 0 {
            CanUseHw::Unsupported
        } else if cnt > total_hw_bp {
            CanUseHw::Insufficient
        } else {
            CanUseHw::Available
        }
    } else {
        CanUseHw::Unsupported
    }
}

/// Requested points per process. Requests are only recorded here; the
/// caller marks the threads of the process stale.
#[derive(Default, Debug)]
pub struct RequestStore {
    processes: HashMap<pid_t, ProcessRequests>,
}

impl RequestStore {
    pub fn new() -> RequestStore {
        Default::default()
    }

    pub fn get(&self, pid: pid_t) -> Option<&ProcessRequests> {
        self.processes.get(&pid)
    }

    fn entry(&mut self, pid: pid_t, interface: &DregInterface) -> &mut ProcessRequests {
        self.processes
            .entry(pid)
            .or_insert_with(|| ProcessRequests::empty_for(interface))
    }

    pub fn register_hw_point(&mut self, interface: &DregInterface, pid: pid_t, point: HwDebugPoint) {
        match self.entry(pid, interface) {
            ProcessRequests::HwDebug(points) => points.push(point),
            ProcessRequests::DebugReg(_) => {
                fatal!("HWDEBUG request for process {} using DEBUGREG", pid)
            }
        }
    }

    /// Remove one request equal to `point`. It must be there.
    pub fn clear_hw_point(&mut self, pid: pid_t, point: &HwDebugPoint) {
        let points = match self.processes.get_mut(&pid) {
            Some(ProcessRequests::HwDebug(points)) => points,
            _ => fatal!("No HWDEBUG requests for process {}", pid),
        };
        match points.iter().position(|p| p == point) {
            Some(i) => {
                points.remove(i);
            }
            None => fatal!("Process {} never requested {}", pid, point),
        }
    }

    pub fn register_wp(&mut self, interface: &DregInterface, pid: pid_t, wp_value: u64) {
        match self.entry(pid, interface) {
            ProcessRequests::DebugReg(wp) => match wp {
                Some(old) => fatal!("Process {} already watches {:#x}", pid, old),
                None => *wp = Some(wp_value),
            },
            ProcessRequests::HwDebug(_) => {
                fatal!("DEBUGREG request for process {} using HWDEBUG", pid)
            }
        }
    }

    /// Returns the value that was cleared.
    pub fn clear_wp(&mut self, pid: pid_t) -> u64 {
        match self.processes.get_mut(&pid) {
            Some(ProcessRequests::DebugReg(wp)) => match wp.take() {
                Some(old) => old,
                None => fatal!("Process {} has no DEBUGREG watchpoint to clear", pid),
            },
            _ => fatal!("Process {} has no DEBUGREG watchpoint to clear", pid),
        }
    }

    /// How many of `pid`'s requests use a condition register.
    pub fn condition_points(&self, pid: pid_t) -> usize {
        match self.processes.get(&pid) {
            Some(ProcessRequests::HwDebug(points)) => {
                points.iter().filter(|p| p.has_condition()).count()
            }
            _ => 0,
        }
    }

    /// A forked child starts with the same requests as its parent.
    pub fn copy_process(&mut self, parent: pid_t, child: pid_t) {
        if let Some(requests) = self.processes.get(&parent).cloned() {
            self.processes.insert(child, requests);
        }
    }

    pub fn forget(&mut self, pid: pid_t) {
        self.processes.remove(&pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppc_linux_nat::dreg_interface::{HwDebugFeatures, HwDebugInfo};

    fn hwdebug(num_insn: u32, num_data: u32) -> DregInterface {
        DregInterface::HwDebug(HwDebugInfo {
            num_instruction_bps: num_insn,
            num_data_bps: num_data,
            num_condition_regs: 0,
            data_bp_alignment: 8,
            sizeof_condition: 0,
            features: HwDebugFeatures::DATA_BP_RANGE,
        })
    }

    #[test]
    fn watchpoint_capacity_boundary() {
        let i = hwdebug(0, 2);
        assert_eq!(can_use(&i, BpType::HardwareWatchpoint, 2, 0), CanUseHw::Available);
        assert_eq!(can_use(&i, BpType::HardwareWatchpoint, 1, 1), CanUseHw::Available);
        assert_eq!(can_use(&i, BpType::ReadWatchpoint, 2, 1), CanUseHw::Insufficient);
        assert_eq!(can_use(&i, BpType::HardwareBreakpoint, 1, 0), CanUseHw::Unsupported);
        assert_eq!(can_use(&i, BpType::Other, 1, 0), CanUseHw::Unsupported);
    }

    #[test]
    fn breakpoint_capacity_boundary() {
        let i = hwdebug(4, 0);
        assert_eq!(can_use(&i, BpType::HardwareBreakpoint, 4, 3), CanUseHw::Available);
        assert_eq!(can_use(&i, BpType::HardwareBreakpoint, 5, 0), CanUseHw::Insufficient);
        assert_eq!(can_use(&i, BpType::AccessWatchpoint, 1, 0), CanUseHw::Unsupported);
    }

    #[test]
    fn legacy_capacity() {
        let i = DregInterface::DebugReg;
        assert_eq!(can_use(&i, BpType::HardwareWatchpoint, 1, 0), CanUseHw::Available);
        assert_eq!(can_use(&i, BpType::HardwareWatchpoint, 1, 1), CanUseHw::Insufficient);
        assert_eq!(can_use(&i, BpType::HardwareBreakpoint, 1, 0), CanUseHw::Unsupported);
        assert_eq!(
            can_use(&DregInterface::Unavailable, BpType::HardwareWatchpoint, 1, 0),
            CanUseHw::Unsupported
        );
    }

    #[test]
    fn register_then_clear_restores_previous_requests() {
        let i = hwdebug(2, 2);
        let mut store = RequestStore::new();
        let a = HwDebugPoint::breakpoint(0x1000, 0);
        let b = HwDebugPoint::breakpoint(0x2000, 0);
        store.register_hw_point(&i, 7, a);
        let before = store.get(7).cloned();
        store.register_hw_point(&i, 7, b);
        store.clear_hw_point(7, &b);
        assert_eq!(store.get(7).cloned(), before);
    }

    #[test]
    fn clear_removes_only_one_duplicate() {
        let i = hwdebug(2, 2);
        let mut store = RequestStore::new();
        let a = HwDebugPoint::breakpoint(0x1000, 0);
        store.register_hw_point(&i, 7, a);
        store.register_hw_point(&i, 7, a);
        store.clear_hw_point(7, &a);
        assert_eq!(store.get(7), Some(&ProcessRequests::HwDebug(vec![a])));
    }

    #[test]
    fn legacy_watch_value() {
        let mut store = RequestStore::new();
        store.register_wp(&DregInterface::DebugReg, 7, 0x1006);
        assert_eq!(store.get(7), Some(&ProcessRequests::DebugReg(Some(0x1006))));
        assert_eq!(store.clear_wp(7), 0x1006);
        assert_eq!(store.get(7), Some(&ProcessRequests::DebugReg(None)));
    }

    #[test]
    fn fork_copies_and_forget_drops() {
        let i = hwdebug(2, 2);
        let mut store = RequestStore::new();
        let a = HwDebugPoint::breakpoint(0x1000, 0);
        store.register_hw_point(&i, 7, a);
        store.copy_process(7, 8);
        store.copy_process(9, 10);
        assert_eq!(store.get(8), store.get(7));
        assert_eq!(store.get(10), None);
        store.forget(7);
        assert_eq!(store.get(7), None);
        assert!(store.get(8).is_some());
    }
}
