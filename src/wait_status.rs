use crate::kernel_metadata::{ptrace_event_name, signal_name};
use libc::{
    PTRACE_EVENT_STOP, SIGSTOP, SIGTRAP, WEXITSTATUS, WIFEXITED, WIFSIGNALED, WIFSTOPPED, WSTOPSIG,
    WTERMSIG,
};
use std::{
    fmt,
    fmt::{Display, Formatter, Result},
    num::NonZeroU8,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WaitType {
    /// Thread exited normally.
    Exit,
    /// Thread exited due to fatal signal.
    FatalSignal,
    /// Thread is in a signal-delivery-stop. Hardware breakpoint and
    /// watchpoint hits show up here as SIGTRAP.
    SignalStop,
    /// Thread is in a group-stop or was stopped by PTRACE_INTERRUPT.
    /// Only reported like this for threads attached with PTRACE_SEIZE.
    GroupStop,
    /// Thread is in a PTRACE_EVENT stop, except for PTRACE_EVENT_STOP
    /// which is treated as GroupStop.
    PtraceEvent,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct WaitStatus {
    status: i32,
}

impl Default for WaitStatus {
    fn default() -> Self {
        Self::new(0)
    }
}

impl WaitStatus {
    pub fn new(status: i32) -> WaitStatus {
        WaitStatus { status }
    }

    pub fn wait_type(&self) -> WaitType {
        if self.exit_code().is_some() {
            return WaitType::Exit;
        }

        if self.fatal_sig().is_some() {
            return WaitType::FatalSignal;
        }

        if self.maybe_stop_sig().is_sig() {
            return WaitType::SignalStop;
        }

        if self.maybe_group_stop_sig().is_sig() {
            return WaitType::GroupStop;
        }

        if self.maybe_ptrace_event().is_ptrace_event() {
            return WaitType::PtraceEvent;
        }

        fatal!("Status {:#x} not understood", self.status);
    }

    /// Exit code if wait_type() == Exit, otherwise None.
    pub fn exit_code(&self) -> Option<i32> {
        if WIFEXITED(self.status) {
            Some(WEXITSTATUS(self.status))
        } else {
            None
        }
    }

    /// Fatal signal if wait_type() == FatalSignal, otherwise None.
    pub fn fatal_sig(&self) -> Option<i32> {
        let termsig = WTERMSIG(self.status);
        if WIFSIGNALED(self.status) && termsig > 0 {
            Some(termsig)
        } else {
            None
        }
    }

    /// Stop signal if wait_type() == SignalStop, otherwise None. A zero
    /// signal (rare but observed via PTRACE_INTERRUPT) is converted to
    /// SIGSTOP.
    pub fn maybe_stop_sig(&self) -> MaybeStopSignal {
        // A non-zero event byte means a ptrace event or a group stop.
        if !WIFSTOPPED(self.status) || ((self.status >> 16) & 0xff != 0) {
            return MaybeStopSignal::new_none();
        }

        let sig = WSTOPSIG(self.status) & !0x80;
        if sig != 0 {
            MaybeStopSignal::new_sig(sig)
        } else {
            MaybeStopSignal::new_sig(SIGSTOP)
        }
    }

    /// Group stop signal if wait_type() == GroupStop, otherwise None.
    pub fn maybe_group_stop_sig(&self) -> MaybeStopSignal {
        if !WIFSTOPPED(self.status) || ((self.status >> 16) & 0xff != PTRACE_EVENT_STOP) {
            return MaybeStopSignal::new_none();
        }

        let sig = WSTOPSIG(self.status) & !0x80;
        if sig != 0 {
            MaybeStopSignal::new_sig(sig)
        } else {
            MaybeStopSignal::new_sig(SIGSTOP)
        }
    }

    /// ptrace event if wait_type() == PtraceEvent, None otherwise.
    pub fn maybe_ptrace_event(&self) -> MaybePtraceEvent {
        let event = (self.status >> 16) & 0xff;
        if event == PTRACE_EVENT_STOP || event == 0 || !WIFSTOPPED(self.status) {
            MaybePtraceEvent::new_none()
        } else {
            MaybePtraceEvent::new_event(event)
        }
    }

    /// For exit_code() and fatal_sig(), returns None. For all other types
    /// returns the signal involved.
    pub fn ptrace_signal(&self) -> Option<i32> {
        if WIFSTOPPED(self.status) {
            Some(WSTOPSIG(self.status) & 0x7f)
        } else {
            None
        }
    }

    /// The thread is gone and won't report again.
    pub fn is_exit(&self) -> bool {
        self.exit_code().is_some() || self.fatal_sig().is_some()
    }

    pub fn for_exit_code(code: i32) -> WaitStatus {
        debug_assert!(code >= 0 && code < 0x100);
        WaitStatus { status: code << 8 }
    }

    pub fn for_fatal_sig(sig: i32) -> WaitStatus {
        debug_assert!(sig >= 1 && sig < 0x80);
        WaitStatus { status: sig }
    }

    pub fn for_stop_sig(sig: i32) -> WaitStatus {
        debug_assert!(sig >= 1 && sig < 0x80);
        WaitStatus {
            status: (sig << 8) | 0x7f,
        }
    }

    /// What a seized thread reports for a group stop or PTRACE_INTERRUPT.
    pub fn for_group_sig(sig: i32) -> WaitStatus {
        debug_assert!(sig >= 1 && sig < 0x80);
        WaitStatus {
            status: (PTRACE_EVENT_STOP << 16) | (sig << 8) | 0x7f,
        }
    }

    pub fn for_ptrace_event(ptrace_event: i32) -> WaitStatus {
        debug_assert!(ptrace_event >= 1 && ptrace_event < 0x100);
        WaitStatus {
            status: (ptrace_event << 16) | (SIGTRAP << 8) | 0x7f,
        }
    }

    pub fn get(&self) -> i32 {
        self.status
    }
}

impl Display for WaitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}", self.status)?;
        match self.wait_type() {
            WaitType::Exit => write!(f, " (EXIT-{})", self.exit_code().unwrap_or(0)),
            WaitType::FatalSignal => write!(
                f,
                " (FATAL-{})",
                signal_name(self.fatal_sig().unwrap_or(0))
            ),
            WaitType::SignalStop => write!(f, " (STOP-{})", self.maybe_stop_sig()),
            WaitType::GroupStop => write!(f, " (GROUP-STOP-{})", self.maybe_group_stop_sig()),
            WaitType::PtraceEvent => write!(f, " ({})", self.maybe_ptrace_event()),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MaybePtraceEvent(Option<NonZeroU8>);

impl MaybePtraceEvent {
    pub fn get_raw_repr(&self) -> i32 {
        match self.0 {
            None => 0,
            Some(non_zero) => non_zero.get() as i32,
        }
    }

    pub fn is_ptrace_event(&self) -> bool {
        self.0.is_some()
    }

    pub fn new_none() -> MaybePtraceEvent {
        MaybePtraceEvent(None)
    }

    /// Anything outside 1..=0xff gives `MaybePtraceEvent(None)`.
    pub fn new_event(val: i32) -> MaybePtraceEvent {
        if val <= 0 || val > 0xff {
            MaybePtraceEvent(None)
        } else {
            MaybePtraceEvent(NonZeroU8::new(val as u8))
        }
    }
}

impl PartialEq<i32> for MaybePtraceEvent {
    fn eq(&self, other: &i32) -> bool {
        self.0.map_or(false, |op| op.get() as i32 == *other)
    }
}

impl Display for MaybePtraceEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.is_ptrace_event() {
            f.write_str("- Not a ptrace event -")
        } else {
            f.write_str(&ptrace_event_name(self.get_raw_repr()))
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MaybeStopSignal(Option<NonZeroU8>);

impl MaybeStopSignal {
    pub fn get_raw_repr(&self) -> i32 {
        match self.0 {
            None => 0,
            Some(non_zero) => non_zero.get() as i32,
        }
    }

    pub fn is_sig(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_not_sig(&self) -> bool {
        self.0.is_none()
    }

    pub fn new_none() -> MaybeStopSignal {
        MaybeStopSignal(None)
    }

    /// Anything outside 1..0x80 gives `MaybeStopSignal(None)`.
    pub fn new_sig(sig: i32) -> MaybeStopSignal {
        if sig < 1 || sig >= 0x80 {
            MaybeStopSignal(None)
        } else {
            MaybeStopSignal(NonZeroU8::new(sig as u8))
        }
    }
}

impl PartialEq<i32> for MaybeStopSignal {
    fn eq(&self, other: &i32) -> bool {
        self.0.map_or(false, |op| op.get() as i32 == *other)
    }
}

impl Display for MaybeStopSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.is_sig() {
            f.write_str("- Not a signal -")
        } else {
            f.write_str(&signal_name(self.get_raw_repr()))
        }
    }
}
