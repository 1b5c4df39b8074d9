use crate::target::HwBpType;
use libc::pid_t;
use std::{error::Error, num::ParseIntError};
use structopt::{clap, clap::AppSettings, StructOpt};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dregs",
    about = "Hardware watchpoints for running processes via the PowerPC and s390 debug registers",
    after_help = "Use DREGS_LOG to control logging; e.g. DREGS_LOG=all:warn,resync:debug"
)]
#[structopt(global_settings = &[AppSettings::UnifiedHelpMessage])]
pub struct DregsOptions {
    #[structopt(
        long,
        help = "Log the debug register bookkeeping of a thread every time it is resynchronized."
    )]
    pub show_debug_regs: bool,

    /// Don't use PPC_PTRACE_GETHWDBGINFO and friends even if the kernel has them. Only the
    /// single watchpoint of PTRACE_SET_DEBUGREG will be available.
    #[structopt(long)]
    pub force_legacy_interface: bool,

    #[structopt(
        short = "E",
        long,
        help = "Any warning or error that is printed is treated as fatal."
    )]
    pub fatal_errors: bool,

    #[structopt(subcommand)]
    pub cmd: DregsSubCommand,
}

#[derive(StructOpt, Debug, Clone)]
pub enum DregsSubCommand {
    /// Attach to <pid> and report which debug register interface the kernel offers and what
    /// it can do.
    #[structopt(name = "probe")]
    Probe {
        /// Print the report as JSON
        #[structopt(long)]
        json: bool,

        pid: pid_t,
    },

    /// Attach to <pid>, watch <len> bytes at <addr> and print every hit. Threads and forked
    /// children created while watching are watched too.
    #[structopt(name = "watch")]
    Watch {
        /// One of `write`, `read` or `access`
        #[structopt(short = "a", long, default_value = "write", parse(try_from_str = parse_access))]
        access: HwBpType,

        /// Detach after this many hits. By default watch until the process exits
        #[structopt(short = "n", long)]
        hits: Option<usize>,

        pid: pid_t,

        /// Address to watch, in hex with or without a leading `0x`
        #[structopt(parse(try_from_str = parse_addr))]
        addr: usize,

        /// Number of bytes to watch
        #[structopt(default_value = "1")]
        len: usize,
    },
}

fn parse_addr(addr_s: &str) -> Result<usize, ParseIntError> {
    let digits = addr_s
        .strip_prefix("0x")
        .or_else(|| addr_s.strip_prefix("0X"))
        .unwrap_or(addr_s);
    usize::from_str_radix(digits, 16)
}

fn parse_access(access_s: &str) -> Result<HwBpType, Box<dyn Error>> {
    match access_s {
        "write" | "w" => Ok(HwBpType::Write),
        "read" | "r" => Ok(HwBpType::Read),
        "access" | "rw" => Ok(HwBpType::Access),
        _ => Err(Box::new(clap::Error::with_description(
            "Only `write`, `read` or `access` is valid here",
            clap::ErrorKind::InvalidValue,
        ))),
    }
}
