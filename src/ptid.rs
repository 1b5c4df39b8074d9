use libc::pid_t;
use std::fmt::{self, Display, Formatter};

/// Identity of a thread (light-weight process) of a debuggee.
///
/// `lwp == 0` denotes the whole process `pid` and is only used as a
/// filter in `matches()`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct Ptid {
    pid: pid_t,
    lwp: pid_t,
}

impl Ptid {
    pub const fn new(pid: pid_t, lwp: pid_t) -> Ptid {
        Ptid { pid, lwp }
    }

    /// The filter that matches every thread of process `pid`.
    pub fn from_pid(pid: pid_t) -> Ptid {
        Ptid { pid, lwp: 0 }
    }

    pub fn pid(&self) -> pid_t {
        self.pid
    }

    pub fn lwp(&self) -> pid_t {
        self.lwp
    }

    pub fn lwp_p(&self) -> bool {
        self.lwp != 0
    }

    /// Does this thread belong to `filter`? A process-wide filter matches
    /// all its threads, a thread filter matches only itself.
    pub fn matches(&self, filter: Ptid) -> bool {
        if filter.lwp_p() {
            *self == filter
        } else {
            self.pid == filter.pid
        }
    }
}

impl Display for Ptid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pid, self.lwp)
    }
}
