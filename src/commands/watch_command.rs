use crate::{
    commands::{
        dregs_options::{DregsOptions, DregsSubCommand},
        DregsCommand,
    },
    error::DregResult,
    kernel::PtraceKernel,
    log::LogLevel::{LogDebug, LogInfo},
    lwp::{LwpControl, LwpInfo, StopReason},
    ptid::Ptid,
    remote_ptr::{RemotePtr, Void},
    seized_process::{LwpStop, SeizedProcess},
    target::{BpType, CanUseHw, HwBpType, HwDebugTarget},
    wait_status::WaitType,
};
use libc::{pid_t, PTRACE_EVENT_CLONE, PTRACE_EVENT_FORK, PTRACE_EVENT_VFORK, SIGTRAP};
use std::{
    collections::{BTreeSet, HashMap},
    io::{self, stdout, Write},
};

pub struct WatchCommand {
    pid: pid_t,
    addr: RemotePtr<Void>,
    len: usize,
    access: HwBpType,
    max_hits: Option<usize>,
}

impl WatchCommand {
    pub fn new(options: &DregsOptions) -> WatchCommand {
        match options.cmd.clone() {
            DregsSubCommand::Watch {
                access,
                hits,
                pid,
                addr,
                len,
            } => WatchCommand {
                pid,
                addr: RemotePtr::new_from_val(addr),
                len,
                access,
                max_hits: hits,
            },
            _ => panic!("Unexpected DregsSubCommand variant. Not a `Watch` variant!"),
        }
    }
}

#[cfg(target_arch = "s390x")]
fn native_target() -> crate::s390_linux_nat::S390LinuxNatTarget<PtraceKernel> {
    crate::s390_linux_nat::S390LinuxNatTarget::new(PtraceKernel::new())
}

#[cfg(not(target_arch = "s390x"))]
fn native_target() -> crate::ppc_linux_nat::PpcLinuxNatTarget<PtraceKernel> {
    crate::ppc_linux_nat::PpcLinuxNatTarget::new(PtraceKernel::new())
}

impl DregsCommand for WatchCommand {
    fn run(&mut self) -> io::Result<()> {
        let mut target = native_target();
        self.watch(&mut target, &mut stdout())
    }
}

fn bp_type_of(access: HwBpType) -> BpType {
    match access {
        HwBpType::Write => BpType::HardwareWatchpoint,
        HwBpType::Read => BpType::ReadWatchpoint,
        HwBpType::Access => BpType::AccessWatchpoint,
        HwBpType::Execute => BpType::HardwareBreakpoint,
    }
}

fn access_name(access: HwBpType) -> &'static str {
    match access {
        HwBpType::Write => "write",
        HwBpType::Read => "read",
        HwBpType::Access => "access",
        HwBpType::Execute => "execute",
    }
}

fn unsupported(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, msg)
}

/// A new thread or process is reported twice: a clone or fork event on the
/// parent and a first stop of the child. Either can come first.
#[derive(Default, Debug)]
struct Births {
    /// Children named by an event whose first stop hasn't been seen.
    announced: BTreeSet<pid_t>,
    /// Children that stopped before the event naming them. They stay
    /// stopped until the event shows up.
    parked: BTreeSet<Ptid>,
}

impl Births {
    /// First stop of `ptid`. True if the event creating it was seen already.
    fn first_stop(&mut self, ptid: Ptid) -> bool {
        if self.announced.remove(&ptid.lwp()) {
            true
        } else {
            self.parked.insert(ptid);
            false
        }
    }

    /// The event creating `tid` was seen. Returns the child if it has
    /// already stopped and was waiting for this.
    fn announce(&mut self, tid: pid_t) -> Option<Ptid> {
        match self.parked.iter().find(|p| p.lwp() == tid).copied() {
            Some(ptid) => {
                self.parked.remove(&ptid);
                Some(ptid)
            }
            None => {
                self.announced.insert(tid);
                None
            }
        }
    }
}

/// State of one `watch` run.
struct Session<'a, T: HwDebugTarget> {
    target: &'a mut T,
    process: SeizedProcess,
    /// Processes holding our watchpoint.
    watched: BTreeSet<pid_t>,
    births: Births,
    stop_reasons: HashMap<Ptid, StopReason>,
    hits: usize,
}

impl<'a, T: HwDebugTarget> Session<'a, T> {
    fn resume(&mut self, ptid: Ptid, sig: Option<i32>) -> DregResult<()> {
        let lwp = LwpInfo {
            ptid,
            stop_reason: self.stop_reasons.remove(&ptid).unwrap_or_default(),
            stepping: false,
        };
        self.target.low_prepare_to_resume(&lwp)?;
        self.process.resume(ptid, sig)
    }

    fn child_ptid(parent: Ptid, event: i32, child: pid_t) -> Ptid {
        if event == PTRACE_EVENT_CLONE {
            Ptid::new(parent.pid(), child)
        } else {
            Ptid::new(child, child)
        }
    }

    /// Tell the target about a clone or fork reported by `parent`. Returns
    /// the child if it was parked waiting for this.
    fn note_creation(&mut self, parent: Ptid, event: i32) -> DregResult<Option<Ptid>> {
        let child = self.process.event_msg(parent)?;
        let child_ptid = Self::child_ptid(parent, event, child);
        log!(LogDebug, "{}: created {}", parent, child_ptid);

        if event == PTRACE_EVENT_CLONE {
            self.target.low_new_clone(parent, child);
        } else {
            self.target.low_new_fork(parent, child);
            if self.watched.contains(&parent.pid()) {
                self.watched.insert(child);
            }
        }

        let parked = self.births.announce(child);
        if parked.is_some() && event == PTRACE_EVENT_CLONE {
            self.target.low_new_thread(child_ptid);
        }
        Ok(parked)
    }

    /// First stop of a thread we hadn't seen. Returns whether it is ready to
    /// be handled like any other thread.
    fn note_first_stop(&mut self, ptid: Ptid) -> bool {
        if !self.births.first_stop(ptid) {
            log!(LogDebug, "{}: parked until its creation is reported", ptid);
            return false;
        }
        // The initial thread of a forked child is covered by the fork.
        if ptid.lwp() != ptid.pid() {
            self.target.low_new_thread(ptid);
        }
        true
    }

    fn note_exit(&mut self, ptid: Ptid) {
        log!(LogDebug, "{}: exited", ptid);
        self.stop_reasons.remove(&ptid);
        if ptid.lwp() != ptid.pid() {
            self.target.low_delete_thread(ptid);
        }
        if self.process.lwps_of(ptid.pid()).is_empty() {
            self.target.low_forget_process(ptid.pid());
            self.watched.remove(&ptid.pid());
        }
    }

    /// A SIGTRAP that is one of our watchpoints firing, with the data
    /// address if the kernel reported it.
    fn watchpoint_hit(&mut self, ptid: Ptid) -> DregResult<Option<Option<RemotePtr<Void>>>> {
        let trap = self.process.trap_info(ptid)?;
        if !self.target.stopped_by_watchpoint(ptid, &trap)? {
            return Ok(None);
        }
        Ok(Some(self.target.stopped_data_address(ptid, &trap)?))
    }
}

impl WatchCommand {
    fn report_hit<T: HwDebugTarget>(
        &self,
        target: &T,
        hits: usize,
        ptid: Ptid,
        data_addr: Option<RemotePtr<Void>>,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        write!(
            out,
            "{}: {} watchpoint hit #{}",
            ptid,
            access_name(self.access),
            hits
        )?;
        match data_addr {
            Some(a) if target.watchpoint_addr_within_range(a, self.addr, self.len) => {
                writeln!(out, " at {}", a)
            }
            Some(a) => writeln!(out, " at {} (outside {}+{})", a, self.addr, self.len),
            None => writeln!(out),
        }
    }

    fn watch<T: HwDebugTarget>(&mut self, target: &mut T, out: &mut dyn Write) -> io::Result<()> {
        let process = SeizedProcess::seize(self.pid)?;
        let leader = process
            .lwps_of(self.pid)
            .first()
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Process has no threads left"))?;

        let mut session = Session {
            target,
            process,
            watched: BTreeSet::new(),
            births: Births::default(),
            stop_reasons: HashMap::new(),
            hits: 0,
        };

        match session
            .target
            .can_use_hw_breakpoint(leader, bp_type_of(self.access), 1, 0)
        {
            CanUseHw::Available => (),
            CanUseHw::Insufficient => {
                return Err(unsupported("Not enough hardware watchpoints".into()))
            }
            CanUseHw::Unsupported => {
                return Err(unsupported(format!(
                    "Hardware {} watchpoints are not supported",
                    access_name(self.access)
                )))
            }
        }

        if session
            .target
            .region_ok_for_hw_watchpoint(leader, self.addr, self.len)
            == 0
        {
            return Err(unsupported(format!(
                "Can't watch {} bytes at {} with the debug registers",
                self.len, self.addr
            )));
        }

        if !session.target.insert_watchpoint(
            &mut session.process,
            leader,
            self.addr,
            self.len,
            self.access,
            None,
        )? {
            return Err(unsupported("The watchpoint could not be inserted".into()));
        }
        session.watched.insert(self.pid);
        log!(LogInfo, "Watching {} bytes at {} in {}", self.len, self.addr, self.pid);

        for ptid in session.process.stopped() {
            session.resume(ptid, None)?;
        }

        while self.max_hits.map_or(true, |max| session.hits < max) {
            let stop = match session.process.wait_any()? {
                Some(stop) => stop,
                None => return Ok(()),
            };
            self.handle_stop(&mut session, stop, out)?;
        }

        self.finish(&mut session)
    }

    fn handle_stop<T: HwDebugTarget>(
        &self,
        s: &mut Session<T>,
        stop: LwpStop,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let ptid = stop.ptid;
        let status = stop.status;

        if status.is_exit() {
            s.note_exit(ptid);
            return Ok(());
        }

        if stop.new_lwp && !s.note_first_stop(ptid) {
            return Ok(());
        }

        match status.wait_type() {
            WaitType::PtraceEvent => {
                let event = status.maybe_ptrace_event().get_raw_repr();
                if event == PTRACE_EVENT_CLONE || event == PTRACE_EVENT_FORK || event == PTRACE_EVENT_VFORK {
                    if let Some(child) = s.note_creation(ptid, event)? {
                        s.resume(child, None)?;
                    }
                }
                s.resume(ptid, None)?;
            }
            WaitType::SignalStop => {
                let sig = status.maybe_stop_sig().get_raw_repr();
                if sig == SIGTRAP {
                    if let Some(data_addr) = s.watchpoint_hit(ptid)? {
                        s.hits += 1;
                        self.report_hit(&*s.target, s.hits, ptid, data_addr, out)?;
                        s.stop_reasons.insert(ptid, StopReason::Watchpoint);
                        s.resume(ptid, None)?;
                        return Ok(());
                    }
                }
                s.resume(ptid, Some(sig))?;
            }
            // Our own PTRACE_INTERRUPTs, or the first stop of a new thread.
            WaitType::GroupStop => s.resume(ptid, None)?,
            WaitType::Exit | WaitType::FatalSignal => (),
        }
        Ok(())
    }

    /// Take the watchpoint out of every process, then detach once all
    /// threads are stopped with clean debug registers.
    fn finish<T: HwDebugTarget>(&self, s: &mut Session<T>) -> io::Result<()> {
        let watched: Vec<pid_t> = s.watched.iter().copied().collect();
        for pid in watched {
            let inferior = match s.process.lwps_of(pid).first() {
                Some(&ptid) => ptid,
                None => continue,
            };
            s.target.remove_watchpoint(
                &mut s.process,
                inferior,
                self.addr,
                self.len,
                self.access,
                None,
            )?;
        }

        let mut pending_sigs: HashMap<Ptid, i32> = HashMap::new();
        while !s.process.all_stopped() {
            let stop = match s.process.wait_any()? {
                Some(stop) => stop,
                None => return Ok(()),
            };
            let ptid = stop.ptid;
            if stop.status.is_exit() {
                s.note_exit(ptid);
                continue;
            }
            if stop.new_lwp {
                s.note_first_stop(ptid);
                continue;
            }
            match stop.status.wait_type() {
                WaitType::PtraceEvent => {
                    let event = stop.status.maybe_ptrace_event().get_raw_repr();
                    if event == PTRACE_EVENT_CLONE || event == PTRACE_EVENT_FORK || event == PTRACE_EVENT_VFORK {
                        s.note_creation(ptid, event)?;
                    }
                }
                WaitType::SignalStop => {
                    let sig = stop.status.maybe_stop_sig().get_raw_repr();
                    if sig != SIGTRAP || s.watchpoint_hit(ptid)?.is_none() {
                        pending_sigs.insert(ptid, sig);
                    }
                }
                _ => (),
            }
        }

        for ptid in s.process.stopped() {
            s.target.low_prepare_to_resume(&LwpInfo::new(ptid))?;
            s.process.detach(ptid, pending_sigs.get(&ptid).copied())?;
        }
        for pid in s.watched.iter().copied().collect::<Vec<_>>() {
            s.target.low_forget_process(pid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bindings::ppc_hwdebug::{ppc_debug_info, PPC_DEBUG_FEATURE_DATA_BP_RANGE},
        fake_kernel::FakeKernel,
        ppc_linux_nat::PpcLinuxNatTarget,
    };

    fn command(addr: usize, len: usize) -> WatchCommand {
        WatchCommand {
            pid: 100,
            addr: RemotePtr::new_from_val(addr),
            len,
            access: HwBpType::Write,
            max_hits: None,
        }
    }

    #[test]
    fn child_stops_before_its_creation_event() {
        let mut births = Births::default();
        let child = Ptid::new(100, 101);
        assert!(!births.first_stop(child));
        assert_eq!(births.announce(101), Some(child));
        assert!(births.parked.is_empty());
        assert!(births.announced.is_empty());
    }

    #[test]
    fn creation_event_before_child_stops() {
        let mut births = Births::default();
        assert_eq!(births.announce(300), None);
        assert!(births.first_stop(Ptid::new(300, 300)));
        assert!(births.announced.is_empty());
        assert!(births.parked.is_empty());
    }

    #[test]
    fn child_ptids() {
        let parent = Ptid::new(100, 100);
        type S<'a> = Session<'a, PpcLinuxNatTarget<FakeKernel>>;
        assert_eq!(S::child_ptid(parent, PTRACE_EVENT_CLONE, 101), Ptid::new(100, 101));
        assert_eq!(S::child_ptid(parent, PTRACE_EVENT_FORK, 300), Ptid::new(300, 300));
        assert_eq!(S::child_ptid(parent, PTRACE_EVENT_VFORK, 301), Ptid::new(301, 301));
    }

    #[test]
    fn access_kinds_map_to_watchpoint_types() {
        assert_eq!(bp_type_of(HwBpType::Write), BpType::HardwareWatchpoint);
        assert_eq!(bp_type_of(HwBpType::Read), BpType::ReadWatchpoint);
        assert_eq!(bp_type_of(HwBpType::Access), BpType::AccessWatchpoint);
    }

    #[test]
    fn hits_inside_the_dabr_window_count_as_in_range() {
        let info = ppc_debug_info {
            version: 1,
            num_instruction_bps: 0,
            num_data_bps: 1,
            num_condition_regs: 0,
            data_bp_alignment: 8,
            sizeof_condition: 0,
            features: PPC_DEBUG_FEATURE_DATA_BP_RANGE,
        };
        let mut target = PpcLinuxNatTarget::new(FakeKernel::with_hwdebug(info));
        target.detect(Ptid::new(100, 100));
        let cmd = command(0x1004, 2);

        let mut out = Vec::new();
        cmd.report_hit(
            &target,
            1,
            Ptid::new(100, 101),
            Some(RemotePtr::new_from_val(0x1000)),
            &mut out,
        )
        .unwrap();
        cmd.report_hit(
            &target,
            2,
            Ptid::new(100, 101),
            Some(RemotePtr::new_from_val(0x2000)),
            &mut out,
        )
        .unwrap();
        cmd.report_hit(&target, 3, Ptid::new(100, 100), None, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "100.101: write watchpoint hit #1 at 0x1000");
        assert_eq!(
            lines[1],
            "100.101: write watchpoint hit #2 at 0x2000 (outside 0x1004+2)"
        );
        assert_eq!(lines[2], "100.100: write watchpoint hit #3");
    }
}
