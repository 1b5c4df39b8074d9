use crate::{
    commands::{
        dregs_options::{DregsOptions, DregsSubCommand},
        DregsCommand,
    },
    kernel::{PpcDebugKernel, PtraceKernel},
    lwp::LwpControl,
    ppc_linux_nat::{dreg_interface::DregInterface, PpcLinuxNatTarget},
    ptid::Ptid,
    remote_ptr::RemotePtr,
    seized_process::SeizedProcess,
    target::{BpType, CanUseHw, HwBpType, HwDebugTarget, MaskedWatchRegisters, WatchCondition},
};
use libc::pid_t;
use serde::Serialize;
use std::io::{self, stdout, Write};

/// Address used to ask about watchpoints in general. Aligned to anything
/// the hardware cares about.
const PROBE_ADDR: usize = 0x10000;

pub struct ProbeCommand {
    pid: pid_t,
    json: bool,
}

impl ProbeCommand {
    pub fn new(options: &DregsOptions) -> ProbeCommand {
        match options.cmd.clone() {
            DregsSubCommand::Probe { json, pid } => ProbeCommand { pid, json },
            _ => panic!("Unexpected DregsSubCommand variant. Not a `Probe` variant!"),
        }
    }
}

impl DregsCommand for ProbeCommand {
    fn run(&mut self) -> io::Result<()> {
        self.probe(&mut stdout())
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HwDebugReport {
    pub num_instruction_bps: u32,
    pub num_data_bps: u32,
    pub num_condition_regs: u32,
    pub data_bp_alignment: u32,
    pub sizeof_condition: u32,
    pub features: Vec<&'static str>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub watchpoint: &'static str,
    pub read_watchpoint: &'static str,
    pub access_watchpoint: &'static str,
    pub hw_breakpoint: &'static str,
    /// Slots an aligned 8 byte watchpoint takes. 0 if it can't be watched.
    pub slots_for_8_bytes: usize,
    pub masked_watch_registers: Option<usize>,
    pub ranged_break_registers: Option<usize>,
    pub condition_accel: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProbeReport {
    pub pid: pid_t,
    pub arch: &'static str,
    pub interface: &'static str,
    pub hwcap: u64,
    pub hwdebug: Option<HwDebugReport>,
    pub capabilities: Capabilities,
}

fn can_use_name(can_use: CanUseHw) -> &'static str {
    match can_use {
        CanUseHw::Available => "available",
        CanUseHw::Insufficient => "insufficient",
        CanUseHw::Unsupported => "unsupported",
    }
}

/// What `target` will do for the process of `ptid`.
pub fn capabilities<T: HwDebugTarget>(target: &mut T, ptid: Ptid) -> Capabilities {
    let addr = RemotePtr::new_from_val(PROBE_ADDR);
    let cond = WatchCondition {
        data_value: 0,
        len: 8,
    };

    Capabilities {
        watchpoint: can_use_name(target.can_use_hw_breakpoint(ptid, BpType::HardwareWatchpoint, 1, 0)),
        read_watchpoint: can_use_name(target.can_use_hw_breakpoint(ptid, BpType::ReadWatchpoint, 1, 0)),
        access_watchpoint: can_use_name(target.can_use_hw_breakpoint(
            ptid,
            BpType::AccessWatchpoint,
            1,
            0,
        )),
        hw_breakpoint: can_use_name(target.can_use_hw_breakpoint(ptid, BpType::HardwareBreakpoint, 1, 0)),
        slots_for_8_bytes: target.region_ok_for_hw_watchpoint(ptid, addr, 8),
        masked_watch_registers: match target.masked_watch_num_registers(ptid, addr, !0xff) {
            MaskedWatchRegisters::Registers(n) => Some(n),
            _ => None,
        },
        ranged_break_registers: target.ranged_break_num_registers(ptid),
        condition_accel: target.can_accel_watchpoint_condition(ptid, addr, 8, HwBpType::Write, Some(&cond)),
    }
}

/// Detect the PowerPC debug register interface through `ptid` and report
/// it together with what it allows.
pub fn ppc_report<K: PpcDebugKernel>(target: &mut PpcLinuxNatTarget<K>, ptid: Ptid) -> ProbeReport {
    target.detect(ptid);
    let interface = *target.dreg_interface().interface();
    let hwdebug = match interface {
        DregInterface::HwDebug(info) => Some(HwDebugReport {
            num_instruction_bps: info.num_instruction_bps,
            num_data_bps: info.num_data_bps,
            num_condition_regs: info.num_condition_regs,
            data_bp_alignment: info.data_bp_alignment,
            sizeof_condition: info.sizeof_condition,
            features: info.features.names(),
        }),
        _ => None,
    };

    ProbeReport {
        pid: ptid.pid(),
        arch: std::env::consts::ARCH,
        interface: interface.name(),
        hwcap: target.kernel().hwcap(),
        hwdebug,
        capabilities: capabilities(target, ptid),
    }
}

fn write_report(report: &ProbeReport, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "pid:\t\t\t{}", report.pid)?;
    writeln!(out, "arch:\t\t\t{}", report.arch)?;
    writeln!(out, "interface:\t\t{}", report.interface)?;
    writeln!(out, "hwcap:\t\t\t{:#x}", report.hwcap)?;
    if let Some(info) = &report.hwdebug {
        writeln!(out, "instruction bps:\t{}", info.num_instruction_bps)?;
        writeln!(out, "data bps:\t\t{}", info.num_data_bps)?;
        writeln!(
            out,
            "condition regs:\t\t{} (size {})",
            info.num_condition_regs, info.sizeof_condition
        )?;
        writeln!(out, "data bp alignment:\t{}", info.data_bp_alignment)?;
        writeln!(out, "features:\t\t{}", info.features.join(" "))?;
    }

    let caps = &report.capabilities;
    writeln!(out, "watchpoint:\t\t{}", caps.watchpoint)?;
    writeln!(out, "read watchpoint:\t{}", caps.read_watchpoint)?;
    writeln!(out, "access watchpoint:\t{}", caps.access_watchpoint)?;
    writeln!(out, "hw breakpoint:\t\t{}", caps.hw_breakpoint)?;
    writeln!(out, "slots for 8 bytes:\t{}", caps.slots_for_8_bytes)?;
    match caps.masked_watch_registers {
        Some(n) => writeln!(out, "masked watchpoint:\t{} slots", n)?,
        None => writeln!(out, "masked watchpoint:\tunsupported")?,
    }
    match caps.ranged_break_registers {
        Some(n) => writeln!(out, "ranged breakpoint:\t{} slots", n)?,
        None => writeln!(out, "ranged breakpoint:\tunsupported")?,
    }
    writeln!(out, "condition accel:\t{}", caps.condition_accel)?;
    Ok(())
}

impl ProbeCommand {
    fn probe(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let mut process = SeizedProcess::seize(self.pid)?;
        let leader = process
            .lwps_of(self.pid)
            .first()
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Process has no threads left"))?;

        let mut target = PpcLinuxNatTarget::new(PtraceKernel::new());
        let report = ppc_report(&mut target, leader);

        // Nothing was programmed, so the threads can go as they are.
        for ptid in process.stopped() {
            process.detach(ptid, None)?;
        }

        if self.json {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        } else {
            write_report(&report, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bindings::ppc_hwdebug::{
            ppc_debug_info,
            PPC_DEBUG_FEATURE_DATA_BP_DAWR,
            PPC_DEBUG_FEATURE_DATA_BP_MASK,
            PPC_DEBUG_FEATURE_INSN_BP_RANGE,
        },
        fake_kernel::FakeKernel,
    };

    const MAIN: Ptid = Ptid::new(100, 100);

    fn rich_report() -> ProbeReport {
        let info = ppc_debug_info {
            version: 1,
            num_instruction_bps: 4,
            num_data_bps: 2,
            num_condition_regs: 2,
            data_bp_alignment: 8,
            sizeof_condition: 8,
            features: PPC_DEBUG_FEATURE_DATA_BP_MASK | PPC_DEBUG_FEATURE_INSN_BP_RANGE,
        };
        let mut target = PpcLinuxNatTarget::new(FakeKernel::with_hwdebug(info));
        ppc_report(&mut target, MAIN)
    }

    #[test]
    fn rich_interface_report() {
        let report = rich_report();
        assert_eq!(report.interface, "hwdebug");
        let info = report.hwdebug.as_ref().unwrap();
        assert_eq!(info.num_data_bps, 2);
        assert_eq!(info.features, vec!["insn_bp_range", "data_bp_mask"]);

        let caps = &report.capabilities;
        assert_eq!(caps.watchpoint, "available");
        assert_eq!(caps.hw_breakpoint, "available");
        assert_eq!(caps.slots_for_8_bytes, 1);
        assert_eq!(caps.masked_watch_registers, Some(2));
        assert_eq!(caps.ranged_break_registers, Some(2));
        assert!(caps.condition_accel);
    }

    #[test]
    fn legacy_interface_report() {
        let mut target = PpcLinuxNatTarget::new(FakeKernel::legacy_only());
        let report = ppc_report(&mut target, MAIN);
        assert_eq!(report.interface, "debugreg");
        assert_eq!(report.hwdebug, None);

        let caps = &report.capabilities;
        assert_eq!(caps.watchpoint, "available");
        assert_eq!(caps.hw_breakpoint, "unsupported");
        assert_eq!(caps.masked_watch_registers, None);
        assert_eq!(caps.ranged_break_registers, None);
        assert!(!caps.condition_accel);
    }

    #[test]
    fn unavailable_interface_report() {
        let mut kernel = FakeKernel::legacy_only();
        kernel.debugreg_supported = false;
        let mut target = PpcLinuxNatTarget::new(kernel);
        let report = ppc_report(&mut target, MAIN);
        assert_eq!(report.interface, "unavailable");
        assert_eq!(report.capabilities.watchpoint, "unsupported");
        assert_eq!(report.capabilities.slots_for_8_bytes, 0);
    }

    #[test]
    fn dawr_without_arch_31_watches_within_512_bytes() {
        let info = ppc_debug_info {
            version: 1,
            num_instruction_bps: 0,
            num_data_bps: 1,
            num_condition_regs: 0,
            data_bp_alignment: 0,
            sizeof_condition: 0,
            features: PPC_DEBUG_FEATURE_DATA_BP_DAWR,
        };
        let mut target = PpcLinuxNatTarget::new(FakeKernel::with_hwdebug(info));
        let report = ppc_report(&mut target, MAIN);
        assert_eq!(report.capabilities.slots_for_8_bytes, 1);
        assert_eq!(report.capabilities.hw_breakpoint, "unsupported");
    }

    #[test]
    fn text_and_json_output() {
        let report = rich_report();

        let mut text = Vec::new();
        write_report(&report, &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("interface:\t\thwdebug\n"));
        assert!(text.contains("masked watchpoint:\t2 slots\n"));

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["interface"], "hwdebug");
        assert_eq!(json["hwdebug"]["num_condition_regs"], 2);
        assert_eq!(json["capabilities"]["ranged_break_registers"], 2);
    }
}
