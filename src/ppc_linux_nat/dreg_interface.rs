use crate::{
    bindings::ppc_hwdebug::{
        ppc_debug_info,
        PPC_DEBUG_FEATURE_DATA_BP_ARCH_31,
        PPC_DEBUG_FEATURE_DATA_BP_DAWR,
        PPC_DEBUG_FEATURE_DATA_BP_MASK,
        PPC_DEBUG_FEATURE_DATA_BP_RANGE,
        PPC_DEBUG_FEATURE_INSN_BP_MASK,
        PPC_DEBUG_FEATURE_INSN_BP_RANGE,
    },
    flags::Flags,
    kernel::PpcDebugKernel,
    log::LogLevel::{LogDebug, LogWarn},
    ptid::Ptid,
};
use nix::errno::Errno;
use std::fmt::{self, Display, Formatter};

bitflags! {
    pub struct HwDebugFeatures: u64 {
        const INSN_BP_RANGE = PPC_DEBUG_FEATURE_INSN_BP_RANGE;
        const INSN_BP_MASK = PPC_DEBUG_FEATURE_INSN_BP_MASK;
        const DATA_BP_RANGE = PPC_DEBUG_FEATURE_DATA_BP_RANGE;
        const DATA_BP_MASK = PPC_DEBUG_FEATURE_DATA_BP_MASK;
        const DATA_BP_DAWR = PPC_DEBUG_FEATURE_DATA_BP_DAWR;
        const DATA_BP_ARCH_31 = PPC_DEBUG_FEATURE_DATA_BP_ARCH_31;
    }
}

impl HwDebugFeatures {
    pub fn names(self) -> Vec<&'static str> {
        let all = [
            (HwDebugFeatures::INSN_BP_RANGE, "insn_bp_range"),
            (HwDebugFeatures::INSN_BP_MASK, "insn_bp_mask"),
            (HwDebugFeatures::DATA_BP_RANGE, "data_bp_range"),
            (HwDebugFeatures::DATA_BP_MASK, "data_bp_mask"),
            (HwDebugFeatures::DATA_BP_DAWR, "data_bp_dawr"),
            (HwDebugFeatures::DATA_BP_ARCH_31, "data_bp_arch_31"),
        ];
        all.iter()
            .filter(|(f, _)| self.contains(*f))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// What PPC_PTRACE_GETHWDBGINFO told us about the debug hardware.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct HwDebugInfo {
    pub num_instruction_bps: u32,
    pub num_data_bps: u32,
    pub num_condition_regs: u32,
    pub data_bp_alignment: u32,
    pub sizeof_condition: u32,
    /// Feature bits this code doesn't know about are dropped.
    pub features: HwDebugFeatures,
}

impl From<ppc_debug_info> for HwDebugInfo {
    fn from(info: ppc_debug_info) -> Self {
        HwDebugInfo {
            num_instruction_bps: info.num_instruction_bps,
            num_data_bps: info.num_data_bps,
            num_condition_regs: info.num_condition_regs,
            data_bp_alignment: info.data_bp_alignment,
            sizeof_condition: info.sizeof_condition,
            features: HwDebugFeatures::from_bits_truncate(info.features),
        }
    }
}

impl Display for HwDebugInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} insn bps, {} data bps, {} condition regs (size {}), alignment {}, features [{}]",
            self.num_instruction_bps,
            self.num_data_bps,
            self.num_condition_regs,
            self.sizeof_condition,
            self.data_bp_alignment,
            self.features.names().join(", ")
        )
    }
}

/// Which set of ptrace requests programs the debug registers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DregInterface {
    /// PPC_PTRACE_{GETHWDBGINFO,SETHWDEBUG,DELHWDEBUG}.
    HwDebug(HwDebugInfo),
    /// PTRACE_{GET,SET}_DEBUGREG: a single watchpoint.
    DebugReg,
    Unavailable,
}

impl DregInterface {
    pub fn name(&self) -> &'static str {
        match self {
            DregInterface::HwDebug(_) => "hwdebug",
            DregInterface::DebugReg => "debugreg",
            DregInterface::Unavailable => "unavailable",
        }
    }
}

/// Finds out, the first time it's asked, which interface the kernel
/// supports. The answer holds for the rest of the session.
#[derive(Default, Debug)]
pub struct DregInterfaceDetector {
    interface: Option<DregInterface>,
}

impl DregInterfaceDetector {
    pub fn new() -> DregInterfaceDetector {
        Default::default()
    }

    pub fn detected_p(&self) -> bool {
        self.interface.is_some()
    }

    pub fn interface(&self) -> &DregInterface {
        match &self.interface {
            Some(interface) => interface,
            None => fatal!("Debug register interface used before detection"),
        }
    }

    pub fn hwdebug_p(&self) -> bool {
        match self.interface() {
            DregInterface::HwDebug(_) => true,
            _ => false,
        }
    }

    pub fn debugreg_p(&self) -> bool {
        *self.interface() == DregInterface::DebugReg
    }

    pub fn unavailable_p(&self) -> bool {
        *self.interface() == DregInterface::Unavailable
    }

    pub fn hwdebug_info(&self) -> &HwDebugInfo {
        match self.interface() {
            DregInterface::HwDebug(info) => info,
            other => fatal!("No HWDEBUG info with the {} interface", other.name()),
        }
    }

    /// Query the kernel through thread `ptid` unless that was already done.
    pub fn detect<K: PpcDebugKernel + ?Sized>(&mut self, kernel: &mut K, ptid: Ptid) {
        if self.interface.is_some() {
            return;
        }

        ptid_assert!(ptid, ptid.lwp_p());

        let mut no_features = false;
        // Pretend the rich request doesn't exist when asked to.
        let mut last_err = Errno::EIO;

        if !Flags::get().force_legacy_interface {
            match kernel.get_hwdebug_info(ptid.lwp()) {
                Ok(info) if info.features != 0 => {
                    let info = HwDebugInfo::from(info);
                    log!(LogDebug, "{}: using HWDEBUG interface: {}", ptid, info);
                    self.interface = Some(DregInterface::HwDebug(info));
                    return;
                }
                // Kernels without CONFIG_HW_BREAKPOINTS advertise no
                // features and their HWDEBUG watchpoints never trigger.
                Ok(_) => no_features = true,
                Err(e) => last_err = e,
            }
        }

        // Only EIO means "no such request". Any other error is unlikely to
        // go away with the legacy request on the same thread.
        if no_features || last_err == Errno::EIO {
            match kernel.get_debugreg(ptid.lwp()) {
                Ok(_) => {
                    log!(LogDebug, "{}: using DEBUGREG interface", ptid);
                    self.interface = Some(DregInterface::DebugReg);
                    return;
                }
                Err(e) => last_err = e,
            }
        }

        if last_err != Errno::EIO {
            log!(
                LogWarn,
                "Error when detecting the debug register interface. \
                 Debug registers will be unavailable."
            );
        }

        self.interface = Some(DregInterface::Unavailable);
    }
}
