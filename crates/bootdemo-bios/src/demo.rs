//! The two boot sector demos
//!
//! Each demo is a [`DemoConfig`] constant. They are independent configurations, sharing
//! only the encoder that lowers them to code.

use crate::service::{VideoMode, VideoService, WriteStringFlags};

/// Top of the stack set up at entry, `SS` is zero. The stack grows down from the load
/// address, so it never overlaps the sector.
pub const STACK_TOP: u16 = mbr::LOAD_ADDRESS;

/// How the message reaches the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// One teletype call per character of a NUL terminated message
    Teletype { page: u8, color: u8 },
    /// A single write-string call over the whole message
    WriteString {
        flags: WriteStringFlags,
        page: u8,
        attribute: u8,
        row: u8,
        column: u8,
    },
}

/// What the sector does once the message is out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalLoop {
    /// `hlt` in a loop, waking on each interrupt only to halt again
    Halt,
    /// A jump to itself
    Spin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoConfig {
    pub name: &'static str,
    /// Never contains NUL, the teletype loop appends its own terminator
    pub message: &'static [u8],
    /// Loaded into `DS`, `ES`, `FS` and `GS` at entry, at most `0x07C0`
    pub data_segment: u16,
    pub video_mode: Option<VideoMode>,
    pub output: Output,
    pub terminal: TerminalLoop,
}

/// Switches to mode 0x13 and prints a line in light red, one character at a time
pub const CIALLO: DemoConfig = DemoConfig {
    name: "ciallo",
    message: b"Ciallo!                         \r\n",
    data_segment: 0x0000,
    video_mode: Some(VideoMode::VGA_320X200X256),
    output: Output::Teletype {
        page: 0,
        color: 0x0C,
    },
    terminal: TerminalLoop::Halt,
};

/// Prints "Hello World!" with one write-string call, addressing data through `0x07C0`
pub const HELLO_WORLD: DemoConfig = DemoConfig {
    name: "hello",
    message: b"Hello World!",
    data_segment: 0x07C0,
    video_mode: None,
    output: Output::WriteString {
        flags: WriteStringFlags::UPDATE_CURSOR,
        page: 0,
        attribute: 0x0C,
        row: 0,
        column: 0,
    },
    terminal: TerminalLoop::Spin,
};

pub const ALL: [&DemoConfig; 2] = [&CIALLO, &HELLO_WORLD];

impl DemoConfig {
    /// Finds a demo by its name
    pub fn by_name(name: &str) -> Option<&'static DemoConfig> {
        ALL.into_iter().find(|demo| demo.name == name)
    }

    /// The offset the first byte of the sector has within the data segment
    pub const fn origin(&self) -> u16 {
        mbr::LOAD_ADDRESS.wrapping_sub(self.data_segment << 4)
    }

    /// The first call the sector makes, if it switches modes
    pub const fn mode_service(&self) -> Option<VideoService> {
        match self.video_mode {
            Some(mode) => Some(VideoService::SetMode { mode }),
            None => None,
        }
    }
}

#[cfg(feature = "alloc")]
mod lower {
    use super::*;
    use crate::VIDEO_INTERRUPT;
    use crate::asm::{AsmError, Assembler, Label, Reg8, Reg16};
    use alloc::vec::Vec;

    impl DemoConfig {
        /// Lowers the demo to real-mode code, ready to be placed at offset 0 of the sector
        ///
        /// The layout mirrors the bare-metal build: the entry stub calls the demo body,
        /// followed by a self jump in case the body ever returns, then the body and the message.
        pub fn assemble(&self) -> Result<Vec<u8>, AsmError> {
            let mut asm = Assembler::new(self.origin());
            let main = asm.label();
            let message = asm.label();

            asm.entry_stub(self.data_segment, STACK_TOP);
            asm.call(main);
            let guard = asm.bound_label();
            asm.jmp_short(guard);

            asm.bind(main)?;
            if let Some(service) = self.mode_service() {
                asm.mov_r16_imm(Reg16::Ax, service.registers().ax);
                asm.int(VIDEO_INTERRUPT);
            }
            self.emit_output(&mut asm, message)?;
            self.emit_terminal(&mut asm);

            asm.bind(message)?;
            asm.bytes(self.message);
            if matches!(self.output, Output::Teletype { .. }) {
                asm.bytes(&[0]);
            }
            asm.finish()
        }

        fn emit_output(&self, asm: &mut Assembler, message: Label) -> Result<(), AsmError> {
            match self.output {
                Output::Teletype { page, color } => {
                    let regs = VideoService::Teletype { ch: 0, page, color }.registers();
                    asm.mov_r16_label(Reg16::Si, message);
                    let next = asm.bound_label();
                    let done = asm.label();
                    asm.lodsb();
                    asm.test_r8(Reg8::Al, Reg8::Al);
                    asm.jz_short(done);
                    asm.mov_r8_imm(Reg8::Ah, regs.ah());
                    asm.mov_r16_imm(Reg16::Bx, regs.bx);
                    asm.int(VIDEO_INTERRUPT);
                    asm.jmp_short(next);
                    asm.bind(done)?;
                }
                Output::WriteString {
                    flags,
                    page,
                    attribute,
                    row,
                    column,
                } => {
                    let regs = VideoService::WriteString {
                        flags,
                        page,
                        attribute,
                        len: self.message.len() as u16,
                        row,
                        column,
                        offset: 0,
                    }
                    .registers();
                    asm.mov_r16_imm(Reg16::Ax, regs.ax);
                    asm.mov_r16_imm(Reg16::Bx, regs.bx);
                    asm.mov_r16_imm(Reg16::Cx, regs.cx);
                    asm.mov_r16_imm(Reg16::Dx, regs.dx);
                    asm.mov_r16_label(Reg16::Bp, message);
                    asm.int(VIDEO_INTERRUPT);
                }
            }
            Ok(())
        }

        fn emit_terminal(&self, asm: &mut Assembler) {
            let top = asm.bound_label();
            if self.terminal == TerminalLoop::Halt {
                asm.hlt();
            }
            asm.jmp_short(top);
        }
    }
}
