use crate::{
    bindings::signal::TRAP_HWBKPT,
    error::DregResult,
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
};
use libc::pid_t;

/// Why did a thread last stop? Only the hardware-related reasons matter
/// to the debug-register code.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum StopReason {
    NoReason,
    SwBreakpoint,
    HwBreakpoint,
    Watchpoint,
    SingleStep,
}

impl Default for StopReason {
    fn default() -> Self {
        StopReason::NoReason
    }
}

/// What the thread-control layer knows about a thread that is about to be
/// resumed.
#[derive(Copy, Clone, Debug)]
pub struct LwpInfo {
    pub ptid: Ptid,
    pub stop_reason: StopReason,
    /// The thread will be resumed with a single step.
    pub stepping: bool,
}

impl LwpInfo {
    pub fn new(ptid: Ptid) -> LwpInfo {
        LwpInfo {
            ptid,
            stop_reason: StopReason::NoReason,
            stepping: false,
        }
    }
}

/// The parts of a SIGTRAP's siginfo that hit attribution looks at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrapInfo {
    pub signo: i32,
    pub code: i32,
    /// PowerPC kernels with CONFIG_PPC_ADV_DEBUG_REGS report the slot that
    /// fired here.
    pub errno: i32,
    pub addr: RemotePtr<Void>,
}

impl TrapInfo {
    pub fn from_siginfo(si: &libc::siginfo_t) -> TrapInfo {
        TrapInfo {
            signo: si.si_signo,
            code: si.si_code,
            errno: si.si_errno,
            addr: RemotePtr::new_from_val(unsafe { si.si_addr() } as usize),
        }
    }

    /// A SIGTRAP raised by a hardware breakpoint or watchpoint.
    pub fn is_hw_breakpoint_trap(&self) -> bool {
        self.signo == libc::SIGTRAP && (self.code & 0xffff) == TRAP_HWBKPT
    }
}

/// Thread control provided by the native target that owns the debuggee's
/// threads.
pub trait LwpControl {
    /// All the threads of process `pid` currently known.
    fn lwps_of(&self, pid: pid_t) -> Vec<Ptid>;

    fn is_stopped(&self, ptid: Ptid) -> bool;

    /// Ask `ptid` to stop. Doesn't wait for the stop to be reported.
    fn stop_lwp(&mut self, ptid: Ptid) -> DregResult<()>;
}
