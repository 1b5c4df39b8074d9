//! SIGTRAP si_codes.

pub const TRAP_BRKPT: i32 = 1;
pub const TRAP_TRACE: i32 = 2;
pub const TRAP_BRANCH: i32 = 3;
pub const TRAP_HWBKPT: i32 = 4;

pub const SI_USER: i32 = 0;
pub const SI_KERNEL: i32 = 0x80;
