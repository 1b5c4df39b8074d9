use crate::ptid::Ptid;
use libc::pid_t;
use nix::errno::Errno;
use std::io;
use thiserror::Error;

/// A kernel refused to do what the bookkeeping says it must do.
///
/// These abort the operation in progress (usually a resume). Expected
/// conditions like running out of slots are reported through status values
/// instead and never show up here.
#[derive(Debug, Error)]
pub enum DregError {
    #[error("{what} (thread {ptid}): {errno}")]
    Ptrace {
        what: &'static str,
        ptid: Ptid,
        errno: Errno,
    },
    #[error("Couldn't stop thread {ptid}: {errno}")]
    StopLwp { ptid: Ptid, errno: Errno },
    #[error("Couldn't list the threads of process {pid}: {source}")]
    ListThreads {
        pid: pid_t,
        #[source]
        source: io::Error,
    },
}

impl DregError {
    pub fn ptrace(what: &'static str, ptid: Ptid, errno: Errno) -> DregError {
        DregError::Ptrace { what, ptid, errno }
    }

    pub fn errno(&self) -> Errno {
        match self {
            DregError::Ptrace { errno, .. } => *errno,
            DregError::StopLwp { errno, .. } => *errno,
            DregError::ListThreads { source, .. } => {
                Errno::from_i32(source.raw_os_error().unwrap_or(0))
            }
        }
    }
}

impl From<DregError> for io::Error {
    fn from(e: DregError) -> io::Error {
        match e {
            DregError::ListThreads { source, .. } => source,
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}

pub type DregResult<T> = Result<T, DregError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_system_error_text() {
        let e = DregError::ptrace(
            "Error setting hardware breakpoint or watchpoint",
            Ptid::new(10, 11),
            Errno::ENOSPC,
        );
        let msg = format!("{}", e);
        assert!(msg.starts_with("Error setting hardware breakpoint or watchpoint (thread 10.11): "));
        assert!(msg.contains("ENOSPC"));
        assert_eq!(e.errno(), Errno::ENOSPC);
    }

    #[test]
    fn converts_to_io_error() {
        let e: io::Error = DregError::StopLwp {
            ptid: Ptid::new(10, 12),
            errno: Errno::ESRCH,
        }
        .into();
        assert_eq!(e.kind(), io::ErrorKind::Other);
        assert!(e.to_string().contains("10.12"));

        let e: io::Error = DregError::ListThreads {
            pid: 10,
            source: io::Error::from_raw_os_error(libc::ENOENT),
        }
        .into();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }
}
