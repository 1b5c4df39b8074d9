//! The kernel debug-control facilities the targets program hardware
//! through. Everything goes through a trait so the bookkeeping can be
//! exercised without a real PowerPC or s390 kernel.

use crate::{
    bindings::{
        ppc_hwdebug::{
            ppc_debug_info,
            ppc_hw_breakpoint,
            PPC_PTRACE_DELHWDEBUG,
            PPC_PTRACE_GETHWDBGINFO,
            PPC_PTRACE_SETHWDEBUG,
            PTRACE_GET_DEBUGREG,
            PTRACE_SET_DEBUGREG,
        },
        s390_per::{
            per_lowcore_words,
            per_struct,
            ptrace_area,
            PTRACE_PEEKUSR_AREA,
            PTRACE_POKEUSR_AREA,
            USER_REGS_PER_INFO_OFFSET,
        },
    },
    kernel_metadata::ptrace_req_name,
    log::LogLevel::LogDebug,
};
use libc::{c_long, c_void, pid_t};
use nix::errno::Errno;
use std::{mem::size_of, ptr};

/// PowerPC debug-register requests.
pub trait PpcDebugKernel {
    /// PPC_PTRACE_GETHWDBGINFO. `EIO` means the request isn't supported.
    fn get_hwdebug_info(&mut self, tid: pid_t) -> nix::Result<ppc_debug_info>;

    /// PPC_PTRACE_SETHWDEBUG. Returns the slot the kernel picked.
    fn set_hwdebug(&mut self, tid: pid_t, bp: &ppc_hw_breakpoint) -> nix::Result<i64>;

    /// PPC_PTRACE_DELHWDEBUG. `ENOENT` if the slot is already empty.
    fn del_hwdebug(&mut self, tid: pid_t, slot: i64) -> nix::Result<()>;

    fn get_debugreg(&mut self, tid: pid_t) -> nix::Result<u64>;

    /// PTRACE_SET_DEBUGREG. 0 clears the watchpoint.
    fn set_debugreg(&mut self, tid: pid_t, value: u64) -> nix::Result<()>;

    /// The AT_HWCAP word of the debuggee.
    fn hwcap(&self) -> u64;
}

/// s390 Program Event Recording requests.
pub trait PerKernel {
    fn poke_per_info(&mut self, tid: pid_t, per_info: &per_struct) -> nix::Result<()>;

    fn peek_per_info(&mut self, tid: pid_t) -> nix::Result<per_struct>;

    fn peek_per_lowcore(&mut self, tid: pid_t) -> nix::Result<per_lowcore_words>;
}

/// The real thing.
#[derive(Default)]
pub struct PtraceKernel;

impl PtraceKernel {
    pub fn new() -> PtraceKernel {
        PtraceKernel
    }
}

/// Make the ptrace `request` and turn a negative return into the errno.
pub(crate) fn fallible_ptrace(
    request: u32,
    tid: pid_t,
    addr: *mut c_void,
    data: *mut c_void,
) -> nix::Result<c_long> {
    Errno::clear();
    let res = unsafe { libc::ptrace(request as _, tid, addr, data) };
    if res < 0 {
        let err = Errno::last();
        log!(
            LogDebug,
            "{}({}) failed: {}",
            ptrace_req_name(request),
            tid,
            err
        );
        Err(err)
    } else {
        Ok(res)
    }
}

impl PpcDebugKernel for PtraceKernel {
    fn get_hwdebug_info(&mut self, tid: pid_t) -> nix::Result<ppc_debug_info> {
        let mut info = ppc_debug_info::default();
        fallible_ptrace(
            PPC_PTRACE_GETHWDBGINFO,
            tid,
            ptr::null_mut(),
            &mut info as *mut ppc_debug_info as *mut c_void,
        )?;
        Ok(info)
    }

    fn set_hwdebug(&mut self, tid: pid_t, bp: &ppc_hw_breakpoint) -> nix::Result<i64> {
        let mut bp = *bp;
        let slot = fallible_ptrace(
            PPC_PTRACE_SETHWDEBUG,
            tid,
            ptr::null_mut(),
            &mut bp as *mut ppc_hw_breakpoint as *mut c_void,
        )?;
        Ok(slot as i64)
    }

    fn del_hwdebug(&mut self, tid: pid_t, slot: i64) -> nix::Result<()> {
        fallible_ptrace(
            PPC_PTRACE_DELHWDEBUG,
            tid,
            ptr::null_mut(),
            slot as usize as *mut c_void,
        )?;
        Ok(())
    }

    fn get_debugreg(&mut self, tid: pid_t) -> nix::Result<u64> {
        let mut wp: libc::c_ulong = 0;
        fallible_ptrace(
            PTRACE_GET_DEBUGREG,
            tid,
            ptr::null_mut(),
            &mut wp as *mut libc::c_ulong as *mut c_void,
        )?;
        Ok(wp as u64)
    }

    fn set_debugreg(&mut self, tid: pid_t, value: u64) -> nix::Result<()> {
        fallible_ptrace(
            PTRACE_SET_DEBUGREG,
            tid,
            ptr::null_mut(),
            value as usize as *mut c_void,
        )?;
        Ok(())
    }

    fn hwcap(&self) -> u64 {
        unsafe { libc::getauxval(libc::AT_HWCAP) as u64 }
    }
}

impl PtraceKernel {
    fn peek_usr_area(
        &mut self,
        tid: pid_t,
        kernel_addr: u64,
        buf: *mut c_void,
        len: usize,
    ) -> nix::Result<()> {
        let mut parea = ptrace_area {
            len: len as u32,
            kernel_addr,
            process_addr: buf as u64,
        };
        fallible_ptrace(
            PTRACE_PEEKUSR_AREA,
            tid,
            &mut parea as *mut ptrace_area as *mut c_void,
            ptr::null_mut(),
        )?;
        Ok(())
    }
}

impl PerKernel for PtraceKernel {
    fn poke_per_info(&mut self, tid: pid_t, per_info: &per_struct) -> nix::Result<()> {
        let mut per_info = *per_info;
        let mut parea = ptrace_area {
            len: size_of::<per_struct>() as u32,
            kernel_addr: USER_REGS_PER_INFO_OFFSET,
            process_addr: &mut per_info as *mut per_struct as u64,
        };
        fallible_ptrace(
            PTRACE_POKEUSR_AREA,
            tid,
            &mut parea as *mut ptrace_area as *mut c_void,
            ptr::null_mut(),
        )?;
        Ok(())
    }

    fn peek_per_info(&mut self, tid: pid_t) -> nix::Result<per_struct> {
        let mut per_info = per_struct::default();
        self.peek_usr_area(
            tid,
            USER_REGS_PER_INFO_OFFSET,
            &mut per_info as *mut per_struct as *mut c_void,
            size_of::<per_struct>(),
        )?;
        Ok(per_info)
    }

    fn peek_per_lowcore(&mut self, tid: pid_t) -> nix::Result<per_lowcore_words> {
        let mut lowcore = per_lowcore_words::default();
        self.peek_usr_area(
            tid,
            USER_REGS_PER_INFO_OFFSET + offset_of!(per_struct, lowcore) as u64,
            &mut lowcore as *mut per_lowcore_words as *mut c_void,
            size_of::<per_lowcore_words>(),
        )?;
        Ok(lowcore)
    }
}
