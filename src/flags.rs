use crate::commands::dregs_options::DregsOptions;
use std::sync::Mutex;

lazy_static! {
    static ref FLAGS: Mutex<Flags> = Mutex::new(Flags::default());
}

#[derive(Clone, Default, Debug)]
pub struct Flags {
    /// Dump the per-thread debug register bookkeeping every time a thread
    /// is resynchronized.
    pub show_debug_regs: bool,
    /// Pretend the PowerPC HWDEBUG ptrace interface doesn't exist and go
    /// straight to the single-watchpoint DEBUGREG interface.
    pub force_legacy_interface: bool,
    /// Any warning or error that would be printed is treated as fatal
    pub fatal_errors_and_warnings: bool,
}

impl Flags {
    /// A copy of the current flags. Defaults until `init_flags()` is called.
    pub fn get() -> Flags {
        FLAGS.lock().unwrap().clone()
    }
}

pub fn init_flags(options: &DregsOptions) {
    let mut flags = FLAGS.lock().unwrap();
    *flags = Flags {
        show_debug_regs: options.show_debug_regs,
        force_legacy_interface: options.force_legacy_interface,
        fatal_errors_and_warnings: options.fatal_errors,
    };
}
