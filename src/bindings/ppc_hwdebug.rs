//! Kernel ABI of the two PowerPC ptrace debug-register interfaces.
//!
//! Older libc headers don't carry these, so they are spelled out here.
#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

/// The single-watchpoint interface (DABR/DAC). One machine word per thread.
pub const PTRACE_GET_DEBUGREG: u32 = 25;
pub const PTRACE_SET_DEBUGREG: u32 = 26;

/// The HWDEBUG interface: multiple slots, ranges, masks and conditions.
pub const PPC_PTRACE_GETHWDBGINFO: u32 = 0x89;
pub const PPC_PTRACE_SETHWDEBUG: u32 = 0x88;
pub const PPC_PTRACE_DELHWDEBUG: u32 = 0x87;

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct ppc_debug_info {
    /// Only version 1 exists to date.
    pub version: u32,
    pub num_instruction_bps: u32,
    pub num_data_bps: u32,
    pub num_condition_regs: u32,
    pub data_bp_alignment: u32,
    /// size of the DVC register.
    pub sizeof_condition: u32,
    pub features: u64,
}

assert_eq_size!(ppc_debug_info, [u8; 32]);

pub const PPC_DEBUG_FEATURE_INSN_BP_RANGE: u64 = 0x1;
pub const PPC_DEBUG_FEATURE_INSN_BP_MASK: u64 = 0x2;
pub const PPC_DEBUG_FEATURE_DATA_BP_RANGE: u64 = 0x4;
pub const PPC_DEBUG_FEATURE_DATA_BP_MASK: u64 = 0x8;
/// Linux v3.9: DAWR, watch up to 512 bytes.
pub const PPC_DEBUG_FEATURE_DATA_BP_DAWR: u64 = 0x10;
/// Linux v5.1: second DAWR.
pub const PPC_DEBUG_FEATURE_DATA_BP_ARCH_31: u64 = 0x20;

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct ppc_hw_breakpoint {
    /// currently, version must be 1
    pub version: u32,
    pub trigger_type: u32,
    pub addr_mode: u32,
    pub condition_mode: u32,
    pub addr: u64,
    /// range end or mask
    pub addr2: u64,
    /// contents of the DVC register
    pub condition_value: u64,
}

assert_eq_size!(ppc_hw_breakpoint, [u8; 40]);

pub const PPC_BREAKPOINT_TRIGGER_EXECUTE: u32 = 0x1;
pub const PPC_BREAKPOINT_TRIGGER_READ: u32 = 0x2;
pub const PPC_BREAKPOINT_TRIGGER_WRITE: u32 = 0x4;
pub const PPC_BREAKPOINT_TRIGGER_RW: u32 = 0x6;

pub const PPC_BREAKPOINT_MODE_EXACT: u32 = 0x0;
pub const PPC_BREAKPOINT_MODE_RANGE_INCLUSIVE: u32 = 0x1;
pub const PPC_BREAKPOINT_MODE_RANGE_EXCLUSIVE: u32 = 0x2;
pub const PPC_BREAKPOINT_MODE_MASK: u32 = 0x3;

pub const PPC_BREAKPOINT_CONDITION_NONE: u32 = 0x0;
pub const PPC_BREAKPOINT_CONDITION_AND: u32 = 0x1;
pub const PPC_BREAKPOINT_CONDITION_BE_ALL: u32 = 0x00ff0000;
pub const PPC_BREAKPOINT_CONDITION_BE_SHIFT: usize = 16;

pub const PPC_DEBUG_CURRENT_VERSION: u32 = 1;

/// AT_HWCAP bit for BookE (embedded) processors.
pub const PPC_FEATURE_BOOKE: u64 = 0x00008000;
