use crate::{
    bindings::ppc_hwdebug::{
        ppc_hw_breakpoint,
        PPC_BREAKPOINT_CONDITION_AND,
        PPC_BREAKPOINT_CONDITION_BE_SHIFT,
        PPC_BREAKPOINT_CONDITION_NONE,
        PPC_BREAKPOINT_MODE_EXACT,
        PPC_BREAKPOINT_MODE_MASK,
        PPC_BREAKPOINT_MODE_RANGE_EXCLUSIVE,
        PPC_BREAKPOINT_MODE_RANGE_INCLUSIVE,
        PPC_BREAKPOINT_TRIGGER_EXECUTE,
        PPC_BREAKPOINT_TRIGGER_READ,
        PPC_BREAKPOINT_TRIGGER_WRITE,
        PPC_DEBUG_CURRENT_VERSION,
    },
    target::HwBpType,
};
use bit_field::BitField;
use std::fmt::{self, Display, Formatter};

bitflags! {
    pub struct Trigger: u32 {
        const EXECUTE = PPC_BREAKPOINT_TRIGGER_EXECUTE;
        const READ = PPC_BREAKPOINT_TRIGGER_READ;
        const WRITE = PPC_BREAKPOINT_TRIGGER_WRITE;
        const RW = Self::READ.bits | Self::WRITE.bits;
    }
}

/// How `addr2` of a `HwDebugPoint` is to be interpreted.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AddrMode {
    Exact,
    /// `addr <= access < addr2`
    RangeInclusive,
    RangeExclusive,
    /// `addr2` is a mask of the address bits to compare.
    Mask,
}

impl AddrMode {
    pub fn as_raw(self) -> u32 {
        match self {
            AddrMode::Exact => PPC_BREAKPOINT_MODE_EXACT,
            AddrMode::RangeInclusive => PPC_BREAKPOINT_MODE_RANGE_INCLUSIVE,
            AddrMode::RangeExclusive => PPC_BREAKPOINT_MODE_RANGE_EXCLUSIVE,
            AddrMode::Mask => PPC_BREAKPOINT_MODE_MASK,
        }
    }
}

/// A data value compare (DVC) condition: trigger only if the enabled
/// bytes of the DVC window equal the matching bytes of `value`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct HwCondition {
    /// PPC_BREAKPOINT_CONDITION_AND plus byte-enable bits.
    pub mode: u32,
    pub value: u64,
}

/// One breakpoint or watchpoint request in the form the HWDEBUG
/// interface takes it. Two requests are the same request iff all their
/// fields are equal.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct HwDebugPoint {
    pub trigger: Trigger,
    pub addr_mode: AddrMode,
    pub condition: Option<HwCondition>,
    pub addr: u64,
    /// End of range, mask, or 0 for exact.
    pub addr2: u64,
}

impl HwDebugPoint {
    /// An instruction breakpoint. Non-zero `len` covers `[addr, addr + len)`.
    pub fn breakpoint(addr: u64, len: u64) -> HwDebugPoint {
        let (addr_mode, addr2) = if len != 0 {
            (AddrMode::RangeInclusive, addr.saturating_add(len))
        } else {
            (AddrMode::Exact, 0)
        };
        HwDebugPoint {
            trigger: Trigger::EXECUTE,
            addr_mode,
            condition: None,
            addr,
            addr2,
        }
    }

    pub fn masked_watchpoint(addr: u64, mask: u64, type_: HwBpType) -> HwDebugPoint {
        HwDebugPoint {
            trigger: get_trigger_type(type_),
            addr_mode: AddrMode::Mask,
            condition: None,
            addr,
            addr2: mask,
        }
    }

    pub fn is_breakpoint(&self) -> bool {
        self.trigger == Trigger::EXECUTE
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn to_kernel(&self) -> ppc_hw_breakpoint {
        let (condition_mode, condition_value) = match self.condition {
            Some(c) => (c.mode, c.value),
            None => (PPC_BREAKPOINT_CONDITION_NONE, 0),
        };
        ppc_hw_breakpoint {
            version: PPC_DEBUG_CURRENT_VERSION,
            trigger_type: self.trigger.bits(),
            addr_mode: self.addr_mode.as_raw(),
            condition_mode,
            addr: self.addr,
            addr2: self.addr2,
            condition_value,
        }
    }
}

impl Display for HwDebugPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{trigger: {:?}, mode: {:?}, addr: {:#x}, addr2: {:#x}",
            self.trigger, self.addr_mode, self.addr, self.addr2
        )?;
        if let Some(c) = self.condition {
            write!(f, ", cond: {:#x}/{:#x}", c.mode, c.value)?;
        }
        write!(f, "}}")
    }
}

/// Watchpoints only: anything that isn't a plain read or write watches both.
pub fn get_trigger_type(type_: HwBpType) -> Trigger {
    match type_ {
        HwBpType::Read => Trigger::READ,
        HwBpType::Write => Trigger::WRITE,
        HwBpType::Access | HwBpType::Execute => Trigger::RW,
    }
}

/// Work out the byte enables and the compare value for watching `len`
/// bytes at `addr` against `data_value`.
///
/// The DVC register compares bytes in a window aligned to
/// `sizeof_condition`, so only the part of the watched region inside that
/// window can be compared. Bytes are numbered from the right.
pub fn calculate_dvc(
    sizeof_condition: u32,
    addr: u64,
    len: usize,
    data_value: u64,
) -> Option<HwCondition> {
    if sizeof_condition == 0 {
        return None;
    }
    let sizeof_condition = sizeof_condition as u64;
    let len = len as u64;

    let align_offset = addr % sizeof_condition;
    let addr_end_data = addr.saturating_add(len);
    let addr_end_dvc = (addr - align_offset).saturating_add(sizeof_condition);
    let num_bytes_off_dvc = addr_end_data.saturating_sub(addr_end_dvc);
    let num_byte_enable = len - num_bytes_off_dvc;
    let rightmost_enabled_byte = addr_end_dvc.saturating_sub(addr_end_data);

    let mut mode = PPC_BREAKPOINT_CONDITION_AND;
    for i in 0..num_byte_enable {
        mode.set_bit(
            (i + rightmost_enabled_byte) as usize + PPC_BREAKPOINT_CONDITION_BE_SHIFT,
            true,
        );
    }

    let value = data_value
        .checked_shr((num_bytes_off_dvc * 8) as u32)
        .unwrap_or(0)
        .checked_shl((rightmost_enabled_byte * 8) as u32)
        .unwrap_or(0);

    Some(HwCondition { mode, value })
}
