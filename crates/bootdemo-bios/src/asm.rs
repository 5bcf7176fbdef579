//! A real-mode encoder for the handful of instructions a boot sector demo needs
//!
//! Code is emitted into a buffer addressed from `origin`, the offset the first byte is
//! reached at through `DS`. Forward references go through [`Label`]s, which are patched
//! in [`Assembler::finish`].

use alloc::vec::Vec;

/// 16-bit general purpose registers, in encoding order
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    Ax = 0,
    Cx = 1,
    Dx = 2,
    Bx = 3,
    Sp = 4,
    Bp = 5,
    Si = 6,
    Di = 7,
}

/// 8-bit registers, in encoding order
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    Al = 0,
    Cl = 1,
    Dl = 2,
    Bl = 3,
    Ah = 4,
    Ch = 5,
    Dh = 6,
    Bh = 7,
}

/// Segment registers, in encoding order
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

/// A position in the code, possibly not bound yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Errors that can occur when encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AsmError {
    #[error("label {0} is referenced but never bound")]
    UndefinedLabel(usize),
    #[error("label {0} is bound twice")]
    LabelRedefined(usize),
    #[error("short branch at {from:#x} cannot reach {to:#x}")]
    BranchOutOfRange { from: usize, to: usize },
}

#[derive(Debug, Clone, Copy)]
enum Fixup {
    /// 8-bit displacement relative to the end of the field
    Rel8 { at: usize, label: Label },
    /// 16-bit displacement relative to the end of the field
    Rel16 { at: usize, label: Label },
    /// 16-bit offset of the label, as seen through the data segment
    Abs16 { at: usize, label: Label },
}

const fn modrm_reg(reg: u8, rm: u8) -> u8 {
    0xC0 | (reg << 3) | rm
}

#[derive(Debug)]
pub struct Assembler {
    origin: u16,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl Assembler {
    pub fn new(origin: u16) -> Self {
        Self {
            origin,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// The offset of the next emitted byte, from the start of the code
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Creates a label that can be referenced before it is bound
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds the label to the current position
    ///
    /// A label created by a different assembler is reported as undefined.
    pub fn bind(&mut self, label: Label) -> Result<(), AsmError> {
        let slot = self
            .labels
            .get_mut(label.0)
            .ok_or(AsmError::UndefinedLabel(label.0))?;
        if slot.is_some() {
            return Err(AsmError::LabelRedefined(label.0));
        }
        *slot = Some(self.code.len());
        Ok(())
    }

    /// Creates a label bound to the current position
    pub fn bound_label(&mut self) -> Label {
        self.labels.push(Some(self.code.len()));
        Label(self.labels.len() - 1)
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.code.extend_from_slice(data);
    }

    pub fn cli(&mut self) {
        self.code.push(0xFA);
    }

    pub fn sti(&mut self) {
        self.code.push(0xFB);
    }

    pub fn hlt(&mut self) {
        self.code.push(0xF4);
    }

    pub fn lodsb(&mut self) {
        self.code.push(0xAC);
    }

    /// `xor dst, src`
    pub fn xor_r16(&mut self, dst: Reg16, src: Reg16) {
        self.code
            .extend_from_slice(&[0x31, modrm_reg(src as u8, dst as u8)]);
    }

    /// `test a, b`
    pub fn test_r8(&mut self, a: Reg8, b: Reg8) {
        self.code.extend_from_slice(&[0x84, modrm_reg(b as u8, a as u8)]);
    }

    /// `mov seg, src`
    pub fn mov_sreg(&mut self, seg: SegReg, src: Reg16) {
        self.code
            .extend_from_slice(&[0x8E, modrm_reg(seg as u8, src as u8)]);
    }

    /// `mov reg, imm16`
    pub fn mov_r16_imm(&mut self, reg: Reg16, imm: u16) {
        self.code.push(0xB8 + reg as u8);
        self.code.extend_from_slice(&imm.to_le_bytes());
    }

    /// `mov reg, imm8`
    pub fn mov_r8_imm(&mut self, reg: Reg8, imm: u8) {
        self.code.extend_from_slice(&[0xB0 + reg as u8, imm]);
    }

    /// `mov reg, label`, loading the label's data segment offset
    pub fn mov_r16_label(&mut self, reg: Reg16, label: Label) {
        self.code.push(0xB8 + reg as u8);
        self.fixups.push(Fixup::Abs16 {
            at: self.code.len(),
            label,
        });
        self.code.extend_from_slice(&[0, 0]);
    }

    /// `int vector`
    pub fn int(&mut self, vector: u8) {
        self.code.extend_from_slice(&[0xCD, vector]);
    }

    /// Near `call` with a 16-bit displacement
    pub fn call(&mut self, label: Label) {
        self.code.push(0xE8);
        self.fixups.push(Fixup::Rel16 {
            at: self.code.len(),
            label,
        });
        self.code.extend_from_slice(&[0, 0]);
    }

    /// Short `jmp`
    pub fn jmp_short(&mut self, label: Label) {
        self.short_branch(0xEB, label);
    }

    /// Short `jz`
    pub fn jz_short(&mut self, label: Label) {
        self.short_branch(0x74, label);
    }

    fn short_branch(&mut self, opcode: u8, label: Label) {
        self.code.push(opcode);
        self.fixups.push(Fixup::Rel8 {
            at: self.code.len(),
            label,
        });
        self.code.push(0);
    }

    /// Emits the entry sequence every demo starts with
    ///
    /// Interrupts stay off while `SS:SP` is switched, so no handler runs on a half-updated
    /// stack. `DS`, `ES`, `FS` and `GS` are then all loaded with `data_segment`.
    pub fn entry_stub(&mut self, data_segment: u16, stack_top: u16) {
        self.cli();
        self.xor_r16(Reg16::Ax, Reg16::Ax);
        self.mov_sreg(SegReg::Ss, Reg16::Ax);
        self.mov_r16_imm(Reg16::Sp, stack_top);
        if data_segment != 0 {
            self.mov_r16_imm(Reg16::Ax, data_segment);
        }
        for seg in [SegReg::Ds, SegReg::Es, SegReg::Fs, SegReg::Gs] {
            self.mov_sreg(seg, Reg16::Ax);
        }
        self.sti();
    }

    fn resolve(&self, label: Label) -> Result<usize, AsmError> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or(AsmError::UndefinedLabel(label.0))
    }

    /// Patches all label references and returns the code
    pub fn finish(mut self) -> Result<Vec<u8>, AsmError> {
        for fixup in core::mem::take(&mut self.fixups) {
            match fixup {
                Fixup::Rel8 { at, label } => {
                    let target = self.resolve(label)?;
                    let from = at + 1;
                    let disp = i8::try_from(target as isize - from as isize)
                        .map_err(|_| AsmError::BranchOutOfRange { from: at - 1, to: target })?;
                    self.code[at] = disp as u8;
                }
                Fixup::Rel16 { at, label } => {
                    let target = self.resolve(label)?;
                    let disp = (target as isize - (at + 2) as isize) as i16;
                    self.code[at..at + 2].copy_from_slice(&disp.to_le_bytes());
                }
                Fixup::Abs16 { at, label } => {
                    let offset = self.origin.wrapping_add(self.resolve(label)? as u16);
                    self.code[at..at + 2].copy_from_slice(&offset.to_le_bytes());
                }
            }
        }
        Ok(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_entry_stub_zero_segments() {
        let mut asm = Assembler::new(0x7C00);
        asm.entry_stub(0, 0x7C00);
        assert_eq!(
            asm.finish().unwrap(),
            vec![
                0xFA, // cli
                0x31, 0xC0, // xor ax, ax
                0x8E, 0xD0, // mov ss, ax
                0xBC, 0x00, 0x7C, // mov sp, 0x7c00
                0x8E, 0xD8, // mov ds, ax
                0x8E, 0xC0, // mov es, ax
                0x8E, 0xE0, // mov fs, ax
                0x8E, 0xE8, // mov gs, ax
                0xFB, // sti
            ]
        );
    }

    #[test]
    fn test_entry_stub_loads_data_segment() {
        let mut asm = Assembler::new(0);
        asm.entry_stub(0x07C0, 0x7C00);
        let code = asm.finish().unwrap();
        // SS is still zeroed before AX picks up the data segment
        assert_eq!(&code[3..5], &[0x8E, 0xD0]);
        assert_eq!(&code[8..11], &[0xB8, 0xC0, 0x07]);
        assert_eq!(&code[11..13], &[0x8E, 0xD8]);
    }

    #[test]
    fn test_branches() {
        let mut asm = Assembler::new(0x7C00);
        let target = asm.label();
        let back = asm.bound_label();
        asm.jz_short(target); // 0..2
        asm.call(target); // 2..5
        asm.jmp_short(back); // 5..7
        asm.bind(target).unwrap();
        asm.hlt();
        let code = asm.finish().unwrap();
        assert_eq!(&code[0..2], &[0x74, 0x05]);
        assert_eq!(&code[2..5], &[0xE8, 0x02, 0x00]);
        assert_eq!(&code[5..7], &[0xEB, 0xF9]);
        assert_eq!(code[7], 0xF4);
    }

    #[test]
    fn test_self_jump() {
        let mut asm = Assembler::new(0);
        let here = asm.bound_label();
        asm.jmp_short(here);
        assert_eq!(asm.finish().unwrap(), vec![0xEB, 0xFE]);
    }

    #[test]
    fn test_absolute_label() {
        let mut asm = Assembler::new(0x7C00);
        let msg = asm.label();
        asm.mov_r16_label(Reg16::Si, msg);
        asm.bind(msg).unwrap();
        asm.bytes(b"hi\0");
        assert_eq!(
            asm.finish().unwrap(),
            vec![0xBE, 0x03, 0x7C, b'h', b'i', 0]
        );
    }

    #[test]
    fn test_register_encodings() {
        let mut asm = Assembler::new(0);
        asm.mov_r8_imm(Reg8::Ah, 0x0E);
        asm.test_r8(Reg8::Al, Reg8::Al);
        asm.int(0x10);
        asm.lodsb();
        assert_eq!(
            asm.finish().unwrap(),
            vec![0xB4, 0x0E, 0x84, 0xC0, 0xCD, 0x10, 0xAC]
        );
    }

    #[test]
    fn test_label_errors() {
        let mut asm = Assembler::new(0);
        let missing = asm.label();
        asm.jmp_short(missing);
        assert_eq!(asm.finish(), Err(AsmError::UndefinedLabel(0)));

        let mut asm = Assembler::new(0);
        let label = asm.bound_label();
        assert_eq!(asm.bind(label), Err(AsmError::LabelRedefined(0)));
    }

    #[test]
    fn test_foreign_label() {
        let mut other = Assembler::new(0);
        other.label();
        let foreign = other.label();

        let mut asm = Assembler::new(0);
        assert_eq!(asm.bind(foreign), Err(AsmError::UndefinedLabel(1)));
        asm.jmp_short(foreign);
        assert_eq!(asm.finish(), Err(AsmError::UndefinedLabel(1)));
    }

    #[test]
    fn test_branch_out_of_range() {
        let mut asm = Assembler::new(0);
        let far = asm.label();
        asm.jmp_short(far);
        asm.bytes(&[0x90; 200]);
        asm.bind(far).unwrap();
        assert_eq!(
            asm.finish(),
            Err(AsmError::BranchOutOfRange { from: 0, to: 202 })
        );
    }
}
