//! Thread control for an already running process, attached with
//! PTRACE_SEIZE so that stops we ask for show up as group stops and
//! never as signals the debuggee would see.

use crate::{
    error::{DregError, DregResult},
    kernel::fallible_ptrace,
    log::LogLevel::{LogDebug, LogWarn},
    lwp::{LwpControl, TrapInfo},
    ptid::Ptid,
    wait_status::WaitStatus,
};
use libc::pid_t;
use nix::{
    errno::Errno,
    sys::{
        ptrace::{self, Options},
        signal::Signal,
    },
    unistd::Pid,
};
use std::{collections::BTreeMap, convert::TryFrom, fs, ptr};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum LwpState {
    Running,
    /// Interrupted but the stop hasn't been reported yet.
    Stopping,
    Stopped,
}

/// A wait status reported for one of our threads.
#[derive(Copy, Clone, Debug)]
pub struct LwpStop {
    pub ptid: Ptid,
    pub status: WaitStatus,
    /// First report for a thread we didn't know about: the initial stop
    /// of a cloned thread or forked child.
    pub new_lwp: bool,
}

pub struct SeizedProcess {
    lwps: BTreeMap<Ptid, LwpState>,
}

fn seize_options() -> Options {
    Options::PTRACE_O_TRACECLONE | Options::PTRACE_O_TRACEFORK | Options::PTRACE_O_TRACEVFORK
}

fn to_signal(sig: Option<i32>) -> Option<Signal> {
    sig.and_then(|s| Signal::try_from(s).ok())
}

/// Thread ids listed in /proc/`pid`/task.
pub fn list_tids(pid: pid_t) -> DregResult<Vec<pid_t>> {
    let dir = fs::read_dir(format!("/proc/{}/task", pid))
        .map_err(|source| DregError::ListThreads { pid, source })?;

    let mut tids = Vec::new();
    for entry in dir {
        let entry = entry.map_err(|source| DregError::ListThreads { pid, source })?;
        if let Some(tid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            tids.push(tid);
        }
    }
    tids.sort_unstable();
    Ok(tids)
}

fn parse_tgid(status: &str) -> Option<pid_t> {
    status
        .lines()
        .find(|l| l.starts_with("Tgid:"))
        .and_then(|l| l["Tgid:".len()..].trim().parse().ok())
}

/// The process `tid` belongs to. A thread that is already gone is taken
/// to be the leader of its own process.
fn tgid_of(tid: pid_t) -> pid_t {
    fs::read_to_string(format!("/proc/{}/status", tid))
        .ok()
        .and_then(|s| parse_tgid(&s))
        .unwrap_or(tid)
}

impl SeizedProcess {
    /// Seize every thread of `pid` and wait until all of them are stopped.
    pub fn seize(pid: pid_t) -> DregResult<SeizedProcess> {
        let mut lwps = BTreeMap::new();
        for tid in list_tids(pid)? {
            let ptid = Ptid::new(pid, tid);
            ptrace::seize(Pid::from_raw(tid), seize_options())
                .map_err(|e| DregError::ptrace("Couldn't seize thread", ptid, e))?;
            lwps.insert(ptid, LwpState::Running);
        }

        let mut process = SeizedProcess { lwps };
        let threads: Vec<Ptid> = process.lwps.keys().copied().collect();
        for ptid in threads {
            process.stop_lwp(ptid)?;
            process.wait_stopped(ptid)?;
        }

        log!(LogDebug, "Seized {} thread(s) of {}", process.lwps.len(), pid);
        Ok(process)
    }

    fn wait_stopped(&mut self, ptid: Ptid) -> DregResult<()> {
        loop {
            let mut raw = 0;
            let ret = unsafe { libc::waitpid(ptid.lwp(), &mut raw, libc::__WALL) };
            if ret < 0 {
                match Errno::last() {
                    Errno::EINTR => continue,
                    errno => return Err(DregError::ptrace("waitpid failed", ptid, errno)),
                }
            }

            let status = WaitStatus::new(raw);
            if status.is_exit() {
                self.lwps.remove(&ptid);
            } else {
                self.lwps.insert(ptid, LwpState::Stopped);
            }
            return Ok(());
        }
    }

    /// Wait for the next stop of any of our threads. None once there are
    /// no threads left to wait for.
    pub fn wait_any(&mut self) -> DregResult<Option<LwpStop>> {
        loop {
            if self.lwps.is_empty() {
                return Ok(None);
            }

            let mut raw = 0;
            let tid = unsafe { libc::waitpid(-1, &mut raw, libc::__WALL) };
            if tid < 0 {
                match Errno::last() {
                    Errno::EINTR => continue,
                    Errno::ECHILD => return Ok(None),
                    errno => {
                        return Err(DregError::ptrace(
                            "waitpid failed",
                            Ptid::from_pid(-1),
                            errno,
                        ))
                    }
                }
            }

            let status = WaitStatus::new(raw);
            let known = self.lwps.keys().find(|p| p.lwp() == tid).copied();
            let (ptid, new_lwp) = match known {
                Some(ptid) => (ptid, false),
                None => (Ptid::new(tgid_of(tid), tid), true),
            };

            log!(LogDebug, "{}: status {}", ptid, status);

            if status.is_exit() {
                self.lwps.remove(&ptid);
            } else {
                self.lwps.insert(ptid, LwpState::Stopped);
            }

            return Ok(Some(LwpStop {
                ptid,
                status,
                new_lwp,
            }));
        }
    }

    /// Continue `ptid`, delivering `sig` if there is one.
    pub fn resume(&mut self, ptid: Ptid, sig: Option<i32>) -> DregResult<()> {
        match ptrace::cont(Pid::from_raw(ptid.lwp()), to_signal(sig)) {
            Ok(()) => (),
            // Killed behind our back. Its exit gets reported later.
            Err(Errno::ESRCH) => log!(LogWarn, "{}: gone before it could be resumed", ptid),
            Err(e) => return Err(DregError::ptrace("Couldn't resume thread", ptid, e)),
        }
        self.lwps.insert(ptid, LwpState::Running);
        Ok(())
    }

    pub fn detach(&mut self, ptid: Ptid, sig: Option<i32>) -> DregResult<()> {
        match ptrace::detach(Pid::from_raw(ptid.lwp()), to_signal(sig)) {
            Ok(()) | Err(Errno::ESRCH) => (),
            Err(e) => return Err(DregError::ptrace("Couldn't detach thread", ptid, e)),
        }
        self.lwps.remove(&ptid);
        Ok(())
    }

    /// The siginfo of a thread in a signal-delivery-stop.
    pub fn trap_info(&self, ptid: Ptid) -> DregResult<TrapInfo> {
        ptrace::getsiginfo(Pid::from_raw(ptid.lwp()))
            .map(|si| TrapInfo::from_siginfo(&si))
            .map_err(|e| DregError::ptrace("Couldn't read siginfo", ptid, e))
    }

    /// PTRACE_GETEVENTMSG: the new thread or process id of a clone or fork
    /// event.
    pub fn event_msg(&self, ptid: Ptid) -> DregResult<pid_t> {
        ptrace::getevent(Pid::from_raw(ptid.lwp()))
            .map(|msg| msg as pid_t)
            .map_err(|e| DregError::ptrace("Couldn't read ptrace event message", ptid, e))
    }

    pub fn pids(&self) -> Vec<pid_t> {
        let mut pids: Vec<pid_t> = self.lwps.keys().map(|p| p.pid()).collect();
        pids.dedup();
        pids
    }

    pub fn stopped(&self) -> Vec<Ptid> {
        self.lwps
            .iter()
            .filter(|(_, s)| **s == LwpState::Stopped)
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn all_stopped(&self) -> bool {
        self.lwps.values().all(|s| *s == LwpState::Stopped)
    }

    pub fn is_empty(&self) -> bool {
        self.lwps.is_empty()
    }
}

impl LwpControl for SeizedProcess {
    fn lwps_of(&self, pid: pid_t) -> Vec<Ptid> {
        self.lwps.keys().filter(|p| p.pid() == pid).copied().collect()
    }

    fn is_stopped(&self, ptid: Ptid) -> bool {
        self.lwps.get(&ptid) == Some(&LwpState::Stopped)
    }

    fn stop_lwp(&mut self, ptid: Ptid) -> DregResult<()> {
        if self.lwps.get(&ptid) != Some(&LwpState::Running) {
            return Ok(());
        }

        match fallible_ptrace(
            libc::PTRACE_INTERRUPT as u32,
            ptid.lwp(),
            ptr::null_mut(),
            ptr::null_mut(),
        ) {
            Ok(_) => {
                self.lwps.insert(ptid, LwpState::Stopping);
                Ok(())
            }
            // Exiting. wait_any() reports it.
            Err(Errno::ESRCH) => {
                log!(LogDebug, "{}: gone before it could be interrupted", ptid);
                Ok(())
            }
            Err(errno) => Err(DregError::StopLwp { ptid, errno }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tgid_from_proc_status() {
        let status = "Name:\tcat\nUmask:\t0022\nState:\tR (running)\nTgid:\t4242\nNgid:\t0\nPid:\t4243\n";
        assert_eq!(parse_tgid(status), Some(4242));
        assert_eq!(parse_tgid("Name:\tcat\n"), None);
    }

    #[test]
    fn own_threads_are_listed() {
        let pid = std::process::id() as pid_t;
        let tids = list_tids(pid).unwrap();
        assert!(tids.contains(&pid));
        assert_eq!(tgid_of(pid), pid);
    }

    #[test]
    fn missing_process_is_an_error() {
        let e = list_tids(-5).unwrap_err();
        assert_eq!(e.errno(), Errno::ENOENT);
    }

    #[test]
    fn stop_requests_only_go_to_running_threads() {
        let mut p = SeizedProcess {
            lwps: BTreeMap::new(),
        };
        p.lwps.insert(Ptid::new(1, 1), LwpState::Stopped);
        p.lwps.insert(Ptid::new(1, 2), LwpState::Stopping);
        p.lwps.insert(Ptid::new(7, 7), LwpState::Stopped);

        // Neither needs a PTRACE_INTERRUPT, so no ptrace call is made.
        p.stop_lwp(Ptid::new(1, 1)).unwrap();
        p.stop_lwp(Ptid::new(1, 2)).unwrap();

        assert_eq!(p.lwps_of(1), vec![Ptid::new(1, 1), Ptid::new(1, 2)]);
        assert!(p.is_stopped(Ptid::new(1, 1)));
        assert!(!p.is_stopped(Ptid::new(1, 2)));
        assert!(!p.all_stopped());
        assert_eq!(p.pids(), vec![1, 7]);
        assert_eq!(p.stopped(), vec![Ptid::new(1, 1), Ptid::new(7, 7)]);
    }

    #[test]
    fn interrupting_an_untraced_thread_is_not_an_error() {
        // We don't trace ourselves, so the kernel answers ESRCH just like
        // it does for a thread that already exited.
        let me = Ptid::new(std::process::id() as pid_t, std::process::id() as pid_t);
        let mut p = SeizedProcess {
            lwps: BTreeMap::new(),
        };
        p.lwps.insert(me, LwpState::Running);

        p.stop_lwp(me).unwrap();
        assert_eq!(p.lwps.get(&me), Some(&LwpState::Running));
        assert!(!p.is_stopped(me));
    }
}
