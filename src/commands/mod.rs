use std::io;

pub mod dregs_options;
pub mod exit_result;
pub mod probe_command;
pub mod watch_command;

pub trait DregsCommand {
    fn run(&mut self) -> io::Result<()>;
}
