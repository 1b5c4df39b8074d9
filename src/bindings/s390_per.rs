//! S390 Program Event Recording (PER) layout as exposed through
//! PTRACE_{PEEK,POKE}USR_AREA. s390 is big endian and the kernel's
//! bitfields are allocated from the most significant bit.
#![allow(non_camel_case_types)]

pub const PTRACE_PEEKUSR_AREA: u32 = 0x5000;
pub const PTRACE_POKEUSR_AREA: u32 = 0x5001;

#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct ptrace_area {
    pub len: u32,
    pub kernel_addr: u64,
    pub process_addr: u64,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct per_lowcore_words {
    pub perc_atmid: u16,
    pub address: u64,
    pub access_id: u8,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct per_struct {
    /// cr9, cr10, cr11
    pub control_regs: [u64; 3],
    /// single_step:1, instruction_fetch:1, :30
    pub flags: u32,
    pub starting_addr: u64,
    pub ending_addr: u64,
    pub lowcore: per_lowcore_words,
}

assert_eq_size!(per_lowcore_words, [u8; 24]);
assert_eq_size!(per_struct, [u8; 72]);

pub const PER_FLAG_SINGLE_STEP: u32 = 1 << 31;

/// `offsetof(struct user_regs_struct, per_info)` on s390x: psw (16),
/// gprs (128), acrs (64), orig_gpr2 (8), fp_regs (136).
pub const USER_REGS_PER_INFO_OFFSET: u64 = 352;

const fn per_bit(n: u32) -> u64 {
    1u64 << (63 - n)
}

/// PER-event mask bits and PER control bits (CR9).
pub const PER_EVENT_BRANCH: u64 = per_bit(32);
pub const PER_EVENT_IFETCH: u64 = per_bit(33);
pub const PER_EVENT_STORE: u64 = per_bit(34);
pub const PER_EVENT_NULLIFICATION: u64 = per_bit(39);
pub const PER_CONTROL_BRANCH_ADDRESS: u64 = per_bit(40);
pub const PER_CONTROL_SUSPENSION: u64 = per_bit(41);
pub const PER_CONTROL_ALTERATION: u64 = per_bit(42);

/// Bits of `per_lowcore_words::perc_atmid`.
pub const PERC_BRANCHING: u16 = 0x8000;
pub const PERC_INSTRUCTION_FETCH: u16 = 0x4000;
pub const PERC_STORAGE_ALTERATION: u16 = 0x2000;
pub const PERC_STORE_REAL_ADDRESS: u16 = 0x0800;
