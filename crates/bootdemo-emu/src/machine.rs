use bitflags::bitflags;
use bootdemo_bios::{VIDEO_INTERRUPT, VideoService};
use mbr::{BootSector, LOAD_ADDRESS, SectorError};

use crate::{
    EmuError,
    cpu::{self, Cpu, Flags},
    firmware::Firmware,
    memory::{BDA_TICKS, Memory, linear},
};

/// Where firmware leaves its own stack before jumping to the sector
const FIRMWARE_STACK: u16 = 0x6F00;

/// The `CS:IP` the firmware enters the sector with
///
/// Both point at physical `0x7C00`, real firmware uses either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryConvention {
    /// `0000:7C00`
    #[default]
    Flat,
    /// `07C0:0000`
    Segmented,
}

impl EntryConvention {
    pub const fn cs_ip(self) -> (u16, u16) {
        match self {
            Self::Flat => (0x0000, LOAD_ADDRESS),
            Self::Segmented => (LOAD_ADDRESS >> 4, 0x0000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    entry: EntryConvention,
    /// Instructions between timer interrupts, each of which wakes a halted CPU. Never zero.
    timer_period: u64,
    /// Passed to the sector in `DL`
    boot_drive: u8,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            entry: EntryConvention::Flat,
            timer_period: 64,
            boot_drive: 0x80,
        }
    }
}

impl MachineConfig {
    pub fn with_entry(mut self, entry: EntryConvention) -> Self {
        self.entry = entry;
        self
    }

    /// Sets the timer period, a period of zero is treated as one
    pub fn with_timer_period(mut self, period: u64) -> Self {
        self.timer_period = period.max(1);
        self
    }

    pub fn with_boot_drive(mut self, drive: u8) -> Self {
        self.boot_drive = drive;
        self
    }

    pub fn entry(&self) -> EntryConvention {
        self.entry
    }

    pub fn timer_period(&self) -> u64 {
        self.timer_period
    }

    pub fn boot_drive(&self) -> u8 {
        self.boot_drive
    }
}

bitflags! {
    /// Registers the entry sequence must write before `sti` counts as the end of setup
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct Setup: u8 {
        const SS = 1 << 0;
        const SP = 1 << 1;
        const DS = 1 << 2;
        const ES = 1 << 3;
        const FS = 1 << 4;
        const GS = 1 << 5;
    }
}

impl Setup {
    fn segment(seg: usize) -> Self {
        match seg {
            cpu::SS => Self::SS,
            cpu::DS => Self::DS,
            cpu::ES => Self::ES,
            cpu::FS => Self::FS,
            cpu::GS => Self::GS,
            _ => Self::empty(),
        }
    }
}

/// Progress of the boot entry sequence, which only ever moves forward
///
/// A sector that enters its terminal loop without finishing the setup goes from `Entry`
/// straight to `Halted`, it is never reported as `Initialized`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootState {
    /// Control was just handed over by the firmware
    #[default]
    Entry,
    /// `SS:SP` and all four data segments were written, then `sti` ran
    Initialized,
    /// The terminal loop was entered
    Halted,
}

/// Totals since the machine was booted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub steps: u64,
    /// `hlt` instructions executed
    pub halts: u64,
    /// Times a timer interrupt woke the CPU out of `hlt`
    pub wakes: u64,
    pub timer_ticks: u64,
    pub state: BootState,
}

#[derive(Debug)]
pub struct Machine {
    cpu: Cpu,
    memory: Memory,
    firmware: Firmware,
    config: MachineConfig,
    state: BootState,
    setup: Setup,
    halted: bool,
    /// `CS:IP` of the terminal loop, once entered
    terminal: Option<(u16, u16)>,
    steps: u64,
    halts: u64,
    wakes: u64,
    timer_ticks: u64,
}

impl Machine {
    /// Loads the sector at `0x7C00` and sets the CPU up the way firmware hands it over
    pub fn boot(sector: &BootSector, config: MachineConfig) -> Result<Self, EmuError> {
        if !sector.is_bootable() {
            return Err(SectorError::MissingSignature {
                found: sector.signature(),
            }
            .into());
        }
        let mut memory = Memory::new();
        memory.load(LOAD_ADDRESS as usize, sector.as_bytes());

        let (cs, ip) = config.entry.cs_ip();
        let mut cpu = Cpu::default();
        cpu.segs[cpu::CS] = cs;
        cpu.ip = ip;
        cpu.regs[cpu::SP] = FIRMWARE_STACK;
        cpu.regs[cpu::DX] = config.boot_drive as u16;
        cpu.flags.insert(Flags::INTERRUPT);
        tracing::debug!("booting sector at {cs:04x}:{ip:04x}");

        Ok(Self {
            cpu,
            memory,
            firmware: Firmware::new(),
            config,
            state: BootState::Entry,
            setup: Setup::empty(),
            halted: false,
            terminal: None,
            steps: 0,
            halts: 0,
            wakes: 0,
            timer_ticks: 0,
        })
    }

    /// Parses and boots a raw image
    pub fn boot_bytes(bytes: &[u8], config: MachineConfig) -> Result<Self, EmuError> {
        Self::boot(&BootSector::from_bytes(bytes)?, config)
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn firmware(&self) -> &Firmware {
        &self.firmware
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// `CS:IP` of the first instruction of the terminal loop
    pub fn terminal_loop(&self) -> Option<(u16, u16)> {
        self.terminal
    }

    /// The BIOS tick counter, incremented by every timer interrupt
    pub fn bios_ticks(&self) -> u32 {
        self.memory.read_u32_at(BDA_TICKS)
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            steps: self.steps,
            halts: self.halts,
            wakes: self.wakes,
            timer_ticks: self.timer_ticks,
            state: self.state,
        }
    }

    /// Runs for exactly `steps` steps
    pub fn run(&mut self, steps: u64) -> Result<RunReport, EmuError> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(self.report())
    }

    /// Runs until the terminal loop is entered, or `limit` steps pass
    pub fn run_until_halted(&mut self, limit: u64) -> Result<RunReport, EmuError> {
        for _ in 0..limit {
            if self.state == BootState::Halted {
                break;
            }
            self.step()?;
        }
        Ok(self.report())
    }

    /// Executes one instruction, or idles one step while halted
    pub fn step(&mut self) -> Result<(), EmuError> {
        if !self.halted {
            self.execute()?;
        }
        self.steps += 1;
        if self.steps % self.config.timer_period.max(1) == 0 {
            self.timer_interrupt();
        }
        Ok(())
    }

    /// The firmware timer handler: bumps the tick counter and wakes the CPU
    ///
    /// The handler leaves registers and flags as they were, so a woken CPU continues right
    /// after its `hlt`.
    fn timer_interrupt(&mut self) {
        if !self.cpu.interrupts_enabled() {
            return;
        }
        self.timer_ticks += 1;
        let ticks = self.bios_ticks().wrapping_add(1);
        self.memory.write_u32_at(BDA_TICKS, ticks);
        if self.halted {
            self.halted = false;
            self.wakes += 1;
        }
    }

    fn enter_state(&mut self, state: BootState) {
        if state > self.state {
            tracing::debug!(
                "{:?} -> {:?} at {:04x}:{:04x}",
                self.state,
                state,
                self.cpu.cs(),
                self.cpu.ip
            );
            self.state = state;
        }
    }

    fn fetch_u8(&mut self) -> u8 {
        let byte = self.memory.read_u8(self.cpu.cs(), self.cpu.ip);
        self.cpu.ip = self.cpu.ip.wrapping_add(1);
        byte
    }

    fn fetch_u16(&mut self) -> u16 {
        u16::from_le_bytes([self.fetch_u8(), self.fetch_u8()])
    }

    fn push(&mut self, value: u16) {
        let sp = self.cpu.sp().wrapping_sub(2);
        self.cpu.regs[cpu::SP] = sp;
        self.memory.write_u16(self.cpu.ss(), sp, value);
    }

    fn jump_relative(&mut self, disp: i16) {
        self.cpu.ip = self.cpu.ip.wrapping_add_signed(disp);
    }

    fn execute(&mut self) -> Result<(), EmuError> {
        let (cs, ip) = (self.cpu.cs(), self.cpu.ip);
        let opcode = self.fetch_u8();
        let unsupported = EmuError::UnsupportedOpcode { cs, ip, opcode };
        match opcode {
            // cli / sti
            0xFA => self.cpu.flags.remove(Flags::INTERRUPT),
            0xFB => {
                self.cpu.flags.insert(Flags::INTERRUPT);
                if self.setup.is_all() {
                    self.enter_state(BootState::Initialized);
                } else if self.state == BootState::Entry {
                    tracing::trace!(missing = ?Setup::all() - self.setup, "sti before setup");
                }
            }
            // hlt
            0xF4 => {
                self.halts += 1;
                self.halted = true;
                self.enter_terminal(cs, ip);
            }
            // xor r/m16, r16
            0x31 => {
                let (reg, rm) = self.fetch_register_modrm().ok_or(unsupported)?;
                let result = self.cpu.regs[rm] ^ self.cpu.regs[reg];
                self.set_reg16(rm, result);
                self.cpu.set_logic_flags(result, 0x8000);
            }
            // test r/m8, r8
            0x84 => {
                let (reg, rm) = self.fetch_register_modrm().ok_or(unsupported)?;
                let result = self.cpu.reg8(rm as u8) & self.cpu.reg8(reg as u8);
                self.cpu.set_logic_flags(result as u16, 0x80);
            }
            // mov sreg, r/m16
            0x8E => {
                let (seg, rm) = self.fetch_register_modrm().ok_or(unsupported)?;
                if seg == cpu::CS || seg >= self.cpu.segs.len() {
                    return Err(unsupported);
                }
                self.cpu.segs[seg] = self.cpu.regs[rm];
                self.setup |= Setup::segment(seg);
            }
            // mov r8, imm8
            0xB0..=0xB7 => {
                let value = self.fetch_u8();
                self.cpu.set_reg8(opcode - 0xB0, value);
            }
            // mov r16, imm16
            0xB8..=0xBF => {
                let value = self.fetch_u16();
                self.set_reg16((opcode - 0xB8) as usize, value);
            }
            // int imm8
            0xCD => {
                let vector = self.fetch_u8();
                self.interrupt(vector)?;
            }
            // call rel16
            0xE8 => {
                let disp = self.fetch_u16() as i16;
                self.push(self.cpu.ip);
                self.jump_relative(disp);
            }
            // jmp rel8
            0xEB => {
                let disp = self.fetch_u8() as i8;
                self.jump_relative(disp as i16);
                if self.cpu.ip == ip {
                    self.enter_terminal(cs, ip);
                }
            }
            // jz rel8
            0x74 => {
                let disp = self.fetch_u8() as i8;
                if self.cpu.flags.contains(Flags::ZERO) {
                    self.jump_relative(disp as i16);
                }
            }
            // lodsb
            0xAC => {
                let si = self.cpu.regs[cpu::SI];
                let value = self.memory.read_u8(self.cpu.ds(), si);
                self.cpu.set_reg8(0, value);
                self.cpu.regs[cpu::SI] = if self.cpu.flags.contains(Flags::DIRECTION) {
                    si.wrapping_sub(1)
                } else {
                    si.wrapping_add(1)
                };
            }
            _ => return Err(unsupported),
        }
        Ok(())
    }

    fn set_reg16(&mut self, reg: usize, value: u16) {
        self.cpu.regs[reg] = value;
        if reg == cpu::SP {
            self.setup |= Setup::SP;
        }
    }

    /// Reads a ModRM byte in register-direct form, `None` for memory operands
    fn fetch_register_modrm(&mut self) -> Option<(usize, usize)> {
        let modrm = self.fetch_u8();
        if modrm & 0xC0 != 0xC0 {
            return None;
        }
        Some((((modrm >> 3) & 7) as usize, (modrm & 7) as usize))
    }

    fn enter_terminal(&mut self, cs: u16, ip: u16) {
        if self.terminal.is_none() {
            self.terminal = Some((cs, ip));
            self.enter_state(BootState::Halted);
        }
    }

    fn interrupt(&mut self, vector: u8) -> Result<(), EmuError> {
        if vector != VIDEO_INTERRUPT {
            return Err(EmuError::UnsupportedInterrupt { vector });
        }
        let regs = self.cpu.video_registers();
        match VideoService::decode(&regs) {
            Some(service) => self.firmware.call(service, &self.memory, self.cpu.es()),
            None => {
                tracing::debug!(
                    "unhandled video call at {:#07x}",
                    linear(self.cpu.cs(), self.cpu.ip.wrapping_sub(2))
                );
                self.firmware.ignored_call(regs.ah());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(code: &[u8]) -> Machine {
        Machine::boot(&BootSector::new(code).unwrap(), MachineConfig::default()).unwrap()
    }

    #[test]
    fn test_boot_rejects_unsigned() {
        let sector = BootSector::read(&[0u8; 512]).unwrap();
        assert_eq!(
            Machine::boot(&sector, MachineConfig::default()).unwrap_err(),
            EmuError::Sector(SectorError::MissingSignature { found: 0 })
        );
    }

    #[test]
    fn test_handover_state() {
        let machine = machine(&[0xF4]);
        assert_eq!(machine.cpu().cs(), 0);
        assert_eq!(machine.cpu().ip, 0x7C00);
        assert_eq!(machine.cpu().reg8(2), 0x80); // DL
        assert!(machine.cpu().interrupts_enabled());
        assert_eq!(machine.state(), BootState::Entry);

        let segmented = Machine::boot(
            &BootSector::new(&[0xF4]).unwrap(),
            MachineConfig::default().with_entry(EntryConvention::Segmented),
        )
        .unwrap();
        assert_eq!((segmented.cpu().cs(), segmented.cpu().ip), (0x07C0, 0));
    }

    #[test]
    fn test_unsupported_opcode() {
        let mut machine = machine(&[0x90]);
        assert_eq!(
            machine.step(),
            Err(EmuError::UnsupportedOpcode {
                cs: 0,
                ip: 0x7C00,
                opcode: 0x90
            })
        );
    }

    #[test]
    fn test_memory_operand_unsupported() {
        // xor [bx+si], ax
        let mut machine = machine(&[0x31, 0x00]);
        assert!(matches!(
            machine.step(),
            Err(EmuError::UnsupportedOpcode { opcode: 0x31, .. })
        ));
    }

    #[test]
    fn test_unsupported_interrupt() {
        let mut machine = machine(&[0xCD, 0x13]);
        assert_eq!(
            machine.step(),
            Err(EmuError::UnsupportedInterrupt { vector: 0x13 })
        );
    }

    #[test]
    fn test_unknown_video_function_ignored() {
        // mov ax, 0x0f00; int 0x10; jmp $
        let mut machine = machine(&[0xB8, 0x00, 0x0F, 0xCD, 0x10, 0xEB, 0xFE]);
        let report = machine.run_until_halted(10).unwrap();
        assert_eq!(report.state, BootState::Halted);
        assert_eq!(machine.firmware().calls(), 1);
    }

    #[test]
    fn test_call_pushes_return() {
        // cli; xor ax, ax; mov ss, ax; mov sp, 0x7c00; call +0; hlt
        let mut machine = machine(&[
            0xFA, 0x31, 0xC0, 0x8E, 0xD0, 0xBC, 0x00, 0x7C, 0xE8, 0x00, 0x00, 0xF4,
        ]);
        machine.run(5).unwrap();
        assert_eq!(machine.cpu().sp(), 0x7BFE);
        assert_eq!(machine.memory().read_u16(0, 0x7BFE), 0x7C0B);
        assert_eq!(machine.cpu().ip, 0x7C0B);
        assert!(machine.cpu().flags.contains(Flags::ZERO));
    }

    #[test]
    fn test_sti_without_setup_stays_entry() {
        // sti; jmp $
        let mut machine = machine(&[0xFB, 0xEB, 0xFE]);
        machine.step().unwrap();
        assert_eq!(machine.state(), BootState::Entry);
        machine.step().unwrap();
        assert_eq!(machine.state(), BootState::Halted);
    }

    #[test]
    fn test_sti_after_partial_setup_stays_entry() {
        // xor ax, ax; mov ss, ax; mov sp, 0x7c00; mov ds, ax; sti
        let mut machine = machine(&[0x31, 0xC0, 0x8E, 0xD0, 0xBC, 0x00, 0x7C, 0x8E, 0xD8, 0xFB]);
        machine.run(5).unwrap();
        assert_eq!(machine.state(), BootState::Entry);
    }

    #[test]
    fn test_sti_after_full_setup_initializes() {
        // xor ax, ax; mov ss, ax; mov sp, 0x7c00; mov ds/es/fs/gs, ax; sti
        let mut machine = machine(&[
            0x31, 0xC0, 0x8E, 0xD0, 0xBC, 0x00, 0x7C, 0x8E, 0xD8, 0x8E, 0xC0, 0x8E, 0xE0, 0x8E,
            0xE8, 0xFB,
        ]);
        machine.run(7).unwrap();
        assert_eq!(machine.state(), BootState::Entry);
        machine.step().unwrap();
        assert_eq!(machine.state(), BootState::Initialized);
    }

    #[test]
    fn test_bare_hlt_skips_initialized() {
        let mut machine = machine(&[0xF4]);
        machine.step().unwrap();
        assert_eq!(machine.state(), BootState::Halted);
    }

    #[test]
    fn test_zero_timer_period() {
        let config = MachineConfig::default().with_timer_period(0);
        assert_eq!(config.timer_period(), 1);
        let mut machine = Machine::boot(&BootSector::new(&[0xF4, 0xEB, 0xFD]).unwrap(), config)
            .unwrap();
        let report = machine.run(20).unwrap();
        assert_eq!(report.timer_ticks, 20);
    }

    #[test]
    fn test_boot_drive_in_dl() {
        let config = MachineConfig::default().with_boot_drive(0x00);
        let machine = Machine::boot(&BootSector::new(&[0xF4]).unwrap(), config).unwrap();
        assert_eq!(machine.cpu().reg8(2), 0x00);
    }

    #[test]
    fn test_hlt_with_interrupts_off_never_wakes() {
        let mut machine = machine(&[0xFA, 0xF4, 0xEB, 0xFD]);
        let report = machine.run(1_000).unwrap();
        assert_eq!(report.halts, 1);
        assert_eq!(report.wakes, 0);
        assert_eq!(report.timer_ticks, 0);
        assert!(machine.is_halted());
    }

    #[test]
    fn test_timer_wakes_halt() {
        // hlt; jmp -3
        let mut machine = Machine::boot(
            &BootSector::new(&[0xF4, 0xEB, 0xFD]).unwrap(),
            MachineConfig::default().with_timer_period(10),
        )
        .unwrap();
        let report = machine.run(100).unwrap();
        assert_eq!(report.timer_ticks, 10);
        assert_eq!(report.wakes, 10);
        assert_eq!(report.halts, 10);
        assert_eq!(machine.bios_ticks(), 10);
        assert_eq!(machine.terminal_loop(), Some((0, 0x7C00)));
    }
}
