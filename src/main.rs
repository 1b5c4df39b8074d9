// Not every query the breakpoint layer can make is used by the commands.
#![allow(dead_code)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;
#[macro_use]
extern crate memoffset;

#[macro_use]
mod log;
mod bindings;
mod commands;
mod error;
#[cfg(test)]
mod fake_kernel;
mod flags;
mod kernel;
mod kernel_metadata;
mod lwp;
mod ppc_linux_nat;
mod ptid;
mod remote_ptr;
mod s390_linux_nat;
mod seized_process;
mod target;
mod wait_status;

use crate::{
    commands::{
        dregs_options::{DregsOptions, DregsSubCommand},
        exit_result::ExitResult,
        probe_command::ProbeCommand,
        watch_command::WatchCommand,
        DregsCommand,
    },
    flags::init_flags,
};
use structopt::StructOpt;

fn main() -> ExitResult<()> {
    let options = DregsOptions::from_args();
    init_flags(&options);

    let result = match &options.cmd {
        DregsSubCommand::Probe { .. } => ProbeCommand::new(&options).run(),
        DregsSubCommand::Watch { .. } => WatchCommand::new(&options).run(),
    };

    match result {
        Ok(()) => ExitResult::Ok(()),
        Err(e) => ExitResult::err_from(e, 1),
    }
}
