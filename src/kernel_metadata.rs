use crate::bindings::{
    ppc_hwdebug::{
        PPC_PTRACE_DELHWDEBUG,
        PPC_PTRACE_GETHWDBGINFO,
        PPC_PTRACE_SETHWDEBUG,
        PTRACE_GET_DEBUGREG,
        PTRACE_SET_DEBUGREG,
    },
    s390_per::{PTRACE_PEEKUSR_AREA, PTRACE_POKEUSR_AREA},
    signal::{SI_KERNEL, SI_USER, TRAP_BRANCH, TRAP_BRKPT, TRAP_HWBKPT, TRAP_TRACE},
};

pub fn signal_name(sig: i32) -> String {
    match sig {
        libc::SIGHUP => "SIGHUP".into(),
        libc::SIGINT => "SIGINT".into(),
        libc::SIGQUIT => "SIGQUIT".into(),
        libc::SIGILL => "SIGILL".into(),
        libc::SIGTRAP => "SIGTRAP".into(),
        libc::SIGABRT => "SIGABRT".into(),
        libc::SIGBUS => "SIGBUS".into(),
        libc::SIGFPE => "SIGFPE".into(),
        libc::SIGKILL => "SIGKILL".into(),
        libc::SIGUSR1 => "SIGUSR1".into(),
        libc::SIGSEGV => "SIGSEGV".into(),
        libc::SIGUSR2 => "SIGUSR2".into(),
        libc::SIGPIPE => "SIGPIPE".into(),
        libc::SIGALRM => "SIGALRM".into(),
        libc::SIGTERM => "SIGTERM".into(),
        libc::SIGCHLD => "SIGCHLD".into(),
        libc::SIGCONT => "SIGCONT".into(),
        libc::SIGSTOP => "SIGSTOP".into(),
        libc::SIGTSTP => "SIGTSTP".into(),
        libc::SIGTTIN => "SIGTTIN".into(),
        libc::SIGTTOU => "SIGTTOU".into(),
        libc::SIGURG => "SIGURG".into(),
        libc::SIGXCPU => "SIGXCPU".into(),
        libc::SIGXFSZ => "SIGXFSZ".into(),
        libc::SIGVTALRM => "SIGVTALRM".into(),
        libc::SIGPROF => "SIGPROF".into(),
        libc::SIGWINCH => "SIGWINCH".into(),
        libc::SIGIO => "SIGIO".into(),
        libc::SIGPWR => "SIGPWR".into(),
        libc::SIGSYS => "SIGSYS".into(),
        _ => format!("signal({})", sig),
    }
}

pub fn ptrace_event_name(event: i32) -> String {
    match event {
        libc::PTRACE_EVENT_FORK => "PTRACE_EVENT_FORK".into(),
        libc::PTRACE_EVENT_VFORK => "PTRACE_EVENT_VFORK".into(),
        libc::PTRACE_EVENT_CLONE => "PTRACE_EVENT_CLONE".into(),
        libc::PTRACE_EVENT_EXEC => "PTRACE_EVENT_EXEC".into(),
        libc::PTRACE_EVENT_VFORK_DONE => "PTRACE_EVENT_VFORK_DONE".into(),
        libc::PTRACE_EVENT_EXIT => "PTRACE_EVENT_EXIT".into(),
        libc::PTRACE_EVENT_SECCOMP => "PTRACE_EVENT_SECCOMP".into(),
        libc::PTRACE_EVENT_STOP => "PTRACE_EVENT_STOP".into(),
        // Special-case this so we don't need to sprintf in this common case.
        // This case is common because we often pass ptrace_event_name(event) to
        // assertions when event is 0.
        0 => "PTRACE_EVENT(0)".into(),
        _ => format!("PTRACE_EVENT({})", event),
    }
}

pub fn ptrace_req_name(request: u32) -> String {
    match request {
        PPC_PTRACE_GETHWDBGINFO => "PPC_PTRACE_GETHWDBGINFO".into(),
        PPC_PTRACE_SETHWDEBUG => "PPC_PTRACE_SETHWDEBUG".into(),
        PPC_PTRACE_DELHWDEBUG => "PPC_PTRACE_DELHWDEBUG".into(),
        PTRACE_GET_DEBUGREG => "PTRACE_GET_DEBUGREG".into(),
        PTRACE_SET_DEBUGREG => "PTRACE_SET_DEBUGREG".into(),
        PTRACE_PEEKUSR_AREA => "PTRACE_PEEKUSR_AREA".into(),
        PTRACE_POKEUSR_AREA => "PTRACE_POKEUSR_AREA".into(),
        r if r == libc::PTRACE_CONT as u32 => "PTRACE_CONT".into(),
        r if r == libc::PTRACE_DETACH as u32 => "PTRACE_DETACH".into(),
        r if r == libc::PTRACE_GETSIGINFO as u32 => "PTRACE_GETSIGINFO".into(),
        r if r == libc::PTRACE_SEIZE as u32 => "PTRACE_SEIZE".into(),
        r if r == libc::PTRACE_INTERRUPT as u32 => "PTRACE_INTERRUPT".into(),
        r if r == libc::PTRACE_GETEVENTMSG as u32 => "PTRACE_GETEVENTMSG".into(),
        _ => format!("PTRACE_REQUEST({})", request),
    }
}

/// Name of a SIGTRAP `si_code` (after masking with 0xffff).
pub fn trap_code_name(code: i32) -> String {
    match code {
        TRAP_BRKPT => "TRAP_BRKPT".into(),
        TRAP_TRACE => "TRAP_TRACE".into(),
        TRAP_BRANCH => "TRAP_BRANCH".into(),
        TRAP_HWBKPT => "TRAP_HWBKPT".into(),
        SI_KERNEL => "SI_KERNEL".into(),
        SI_USER => "SI_USER".into(),
        _ => format!("si_code({:#x})", code),
    }
}

pub fn errno_name(err: i32) -> String {
    match err {
        0 => "SUCCESS".into(),
        libc::EPERM => "EPERM".into(),
        libc::ENOENT => "ENOENT".into(),
        libc::ESRCH => "ESRCH".into(),
        libc::EINTR => "EINTR".into(),
        libc::EIO => "EIO".into(),
        libc::ENXIO => "ENXIO".into(),
        libc::E2BIG => "E2BIG".into(),
        libc::EBADF => "EBADF".into(),
        libc::ECHILD => "ECHILD".into(),
        libc::EAGAIN => "EAGAIN".into(),
        libc::ENOMEM => "ENOMEM".into(),
        libc::EACCES => "EACCES".into(),
        libc::EFAULT => "EFAULT".into(),
        libc::EBUSY => "EBUSY".into(),
        libc::EEXIST => "EEXIST".into(),
        libc::ENODEV => "ENODEV".into(),
        libc::EINVAL => "EINVAL".into(),
        libc::ENOSPC => "ENOSPC".into(),
        libc::ENOSYS => "ENOSYS".into(),
        libc::EOPNOTSUPP => "EOPNOTSUPP".into(),
        _ => format!("errno({})", err),
    }
}
