//! Bootdemo Emu
//!
//! A deterministic real-mode interpreter for the demo sectors. It covers the instructions
//! the demos are built from, with the BIOS video services and the timer interrupt modelled
//! at a high level instead of through the interrupt vector table.
//!
//! ```
//! use bootdemo_emu::{BootState, Machine, MachineConfig};
//! use mbr::BootSector;
//!
//! // hlt; jmp -3
//! let sector = BootSector::new(&[0xF4, 0xEB, 0xFD])?;
//! let mut machine = Machine::boot(&sector, MachineConfig::default())?;
//! let report = machine.run(1_000)?;
//! assert_eq!(report.state, BootState::Halted);
//! # Ok::<(), bootdemo_emu::EmuError>(())
//! ```

pub mod cpu;
pub mod firmware;
mod machine;
pub mod memory;

pub use firmware::{Cell, Cursor, Firmware};
pub use machine::{BootState, EntryConvention, Machine, MachineConfig, RunReport};

use mbr::SectorError;

/// Errors that stop the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmuError {
    #[error("unsupported instruction {opcode:#04x} at {cs:04x}:{ip:04x}")]
    UnsupportedOpcode { cs: u16, ip: u16, opcode: u8 },
    /// Only the video services have a firmware handler
    #[error("interrupt {vector:#04x} has no firmware handler")]
    UnsupportedInterrupt { vector: u8 },
    #[error(transparent)]
    Sector(#[from] SectorError),
}
