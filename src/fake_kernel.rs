//! In-memory stand-ins for the kernel and for the thread list so the
//! debug-register bookkeeping can be tested on any host.

use crate::{
    bindings::{
        ppc_hwdebug::{ppc_debug_info, ppc_hw_breakpoint},
        s390_per::{per_lowcore_words, per_struct},
    },
    error::{DregError, DregResult},
    kernel::{PerKernel, PpcDebugKernel},
    lwp::LwpControl,
    ptid::Ptid,
};
use libc::pid_t;
use nix::errno::Errno;
use std::collections::{BTreeMap, HashMap};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernelCall {
    SetHwDebug(pid_t, ppc_hw_breakpoint),
    DelHwDebug(pid_t, i64),
    SetDebugReg(pid_t, u64),
    PokePerInfo(pid_t, per_struct),
    PeekPerLowcore(pid_t),
}

pub struct FakeKernel {
    /// `None` makes PPC_PTRACE_GETHWDBGINFO fail with `hwdebug_info_err`.
    pub hwdebug_info: Option<ppc_debug_info>,
    pub hwdebug_info_err: Errno,
    pub debugreg_supported: bool,
    pub hwcap: u64,
    /// Fail the next SETHWDEBUG / DELHWDEBUG with this.
    pub fail_set: Option<Errno>,
    pub fail_del: Option<Errno>,
    /// Fail the next PTRACE_POKEUSR_AREA of the PER info with this.
    pub fail_poke: Option<Errno>,
    pub get_hwdebug_info_calls: usize,
    pub get_debugreg_calls: usize,
    /// What each thread has programmed, by slot.
    pub slots: HashMap<pid_t, BTreeMap<i64, ppc_hw_breakpoint>>,
    pub debugregs: HashMap<pid_t, u64>,
    pub per_info: HashMap<pid_t, per_struct>,
    pub lowcore: per_lowcore_words,
    pub calls: Vec<KernelCall>,
}

impl Default for FakeKernel {
    fn default() -> Self {
        FakeKernel {
            hwdebug_info: None,
            hwdebug_info_err: Errno::EIO,
            debugreg_supported: false,
            hwcap: 0,
            fail_set: None,
            fail_del: None,
            fail_poke: None,
            get_hwdebug_info_calls: 0,
            get_debugreg_calls: 0,
            slots: HashMap::new(),
            debugregs: HashMap::new(),
            per_info: HashMap::new(),
            lowcore: per_lowcore_words::default(),
            calls: Vec::new(),
        }
    }
}

impl FakeKernel {
    pub fn with_hwdebug(info: ppc_debug_info) -> FakeKernel {
        FakeKernel {
            hwdebug_info: Some(info),
            ..Default::default()
        }
    }

    pub fn legacy_only() -> FakeKernel {
        FakeKernel {
            debugreg_supported: true,
            ..Default::default()
        }
    }

    /// The requests programmed into thread `tid`, ignoring slot numbers.
    pub fn programmed(&self, tid: pid_t) -> Vec<ppc_hw_breakpoint> {
        self.slots
            .get(&tid)
            .map(|s| s.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn count_calls(&self, pred: impl Fn(&KernelCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl PpcDebugKernel for FakeKernel {
    fn get_hwdebug_info(&mut self, _tid: pid_t) -> nix::Result<ppc_debug_info> {
        self.get_hwdebug_info_calls += 1;
        self.hwdebug_info.ok_or(self.hwdebug_info_err)
    }

    fn set_hwdebug(&mut self, tid: pid_t, bp: &ppc_hw_breakpoint) -> nix::Result<i64> {
        self.calls.push(KernelCall::SetHwDebug(tid, *bp));
        if let Some(err) = self.fail_set.take() {
            return Err(err);
        }
        let slots = self.slots.entry(tid).or_default();
        let slot = (1..).find(|s| !slots.contains_key(s)).unwrap();
        slots.insert(slot, *bp);
        Ok(slot)
    }

    fn del_hwdebug(&mut self, tid: pid_t, slot: i64) -> nix::Result<()> {
        self.calls.push(KernelCall::DelHwDebug(tid, slot));
        if let Some(err) = self.fail_del.take() {
            return Err(err);
        }
        match self.slots.get_mut(&tid).and_then(|s| s.remove(&slot)) {
            Some(_) => Ok(()),
            None => Err(Errno::ENOENT),
        }
    }

    fn get_debugreg(&mut self, tid: pid_t) -> nix::Result<u64> {
        self.get_debugreg_calls += 1;
        if self.debugreg_supported {
            Ok(self.debugregs.get(&tid).copied().unwrap_or(0))
        } else {
            Err(Errno::EIO)
        }
    }

    fn set_debugreg(&mut self, tid: pid_t, value: u64) -> nix::Result<()> {
        self.calls.push(KernelCall::SetDebugReg(tid, value));
        self.debugregs.insert(tid, value);
        Ok(())
    }

    fn hwcap(&self) -> u64 {
        self.hwcap
    }
}

impl PerKernel for FakeKernel {
    fn poke_per_info(&mut self, tid: pid_t, per_info: &per_struct) -> nix::Result<()> {
        self.calls.push(KernelCall::PokePerInfo(tid, *per_info));
        if let Some(err) = self.fail_poke.take() {
            return Err(err);
        }
        self.per_info.insert(tid, *per_info);
        Ok(())
    }

    fn peek_per_info(&mut self, tid: pid_t) -> nix::Result<per_struct> {
        Ok(self.per_info.get(&tid).copied().unwrap_or_default())
    }

    fn peek_per_lowcore(&mut self, tid: pid_t) -> nix::Result<per_lowcore_words> {
        self.calls.push(KernelCall::PeekPerLowcore(tid));
        Ok(self.lowcore)
    }
}

/// A thread list where each thread is either stopped or running.
#[derive(Default)]
pub struct FakeLwps {
    pub threads: BTreeMap<Ptid, bool>,
    pub stop_requests: Vec<Ptid>,
    /// Threads whose next stop request fails, and how.
    pub fail_stop: BTreeMap<Ptid, Errno>,
}

impl FakeLwps {
    pub fn new() -> FakeLwps {
        Default::default()
    }

    pub fn add(&mut self, ptid: Ptid, stopped: bool) -> &mut FakeLwps {
        self.threads.insert(ptid, stopped);
        self
    }
}

impl LwpControl for FakeLwps {
    fn lwps_of(&self, pid: pid_t) -> Vec<Ptid> {
        self.threads
            .keys()
            .filter(|p| p.pid() == pid)
            .copied()
            .collect()
    }

    fn is_stopped(&self, ptid: Ptid) -> bool {
        self.threads.get(&ptid).copied().unwrap_or(false)
    }

    fn stop_lwp(&mut self, ptid: Ptid) -> DregResult<()> {
        if let Some(errno) = self.fail_stop.remove(&ptid) {
            return Err(DregError::StopLwp { ptid, errno });
        }
        self.stop_requests.push(ptid);
        Ok(())
    }
}
