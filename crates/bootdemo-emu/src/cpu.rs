use bitflags::bitflags;
use bootdemo_bios::Registers;

bitflags! {
    /// The subset of FLAGS the emulated instructions read or write
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const CARRY = 0x0001;
        /// Always set on x86
        const RESERVED = 0x0002;
        const ZERO = 0x0040;
        const SIGN = 0x0080;
        const INTERRUPT = 0x0200;
        const DIRECTION = 0x0400;
        const OVERFLOW = 0x0800;
    }
}

// General purpose register indices, in encoding order
pub const AX: usize = 0;
pub const CX: usize = 1;
pub const DX: usize = 2;
pub const BX: usize = 3;
pub const SP: usize = 4;
pub const BP: usize = 5;
pub const SI: usize = 6;
pub const DI: usize = 7;

// Segment register indices, in encoding order
pub const ES: usize = 0;
pub const CS: usize = 1;
pub const SS: usize = 2;
pub const DS: usize = 3;
pub const FS: usize = 4;
pub const GS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpu {
    pub regs: [u16; 8],
    pub segs: [u16; 6],
    pub ip: u16,
    pub flags: Flags,
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            regs: [0; 8],
            segs: [0; 6],
            ip: 0,
            flags: Flags::RESERVED,
        }
    }
}

impl Cpu {
    /// Reads an 8-bit register by encoding: `AL, CL, DL, BL, AH, CH, DH, BH`
    pub fn reg8(&self, index: u8) -> u8 {
        let word = self.regs[(index & 3) as usize];
        if index < 4 { word as u8 } else { (word >> 8) as u8 }
    }

    pub fn set_reg8(&mut self, index: u8, value: u8) {
        let word = &mut self.regs[(index & 3) as usize];
        *word = if index < 4 {
            (*word & 0xFF00) | value as u16
        } else {
            (*word & 0x00FF) | (value as u16) << 8
        };
    }

    pub fn cs(&self) -> u16 {
        self.segs[CS]
    }

    pub fn ds(&self) -> u16 {
        self.segs[DS]
    }

    pub fn es(&self) -> u16 {
        self.segs[ES]
    }

    pub fn ss(&self) -> u16 {
        self.segs[SS]
    }

    pub fn sp(&self) -> u16 {
        self.regs[SP]
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.flags.contains(Flags::INTERRUPT)
    }

    /// The registers a video service call is read from
    pub fn video_registers(&self) -> Registers {
        Registers {
            ax: self.regs[AX],
            bx: self.regs[BX],
            cx: self.regs[CX],
            dx: self.regs[DX],
            bp: self.regs[BP],
        }
    }

    /// Updates ZF and SF from a logic result, clearing CF and OF
    pub fn set_logic_flags(&mut self, result: u16, sign_bit: u16) {
        self.flags.remove(Flags::CARRY | Flags::OVERFLOW);
        self.flags.set(Flags::ZERO, result == 0);
        self.flags.set(Flags::SIGN, result & sign_bit != 0);
    }
}
