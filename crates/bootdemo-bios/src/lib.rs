//! Bootdemo BIOS
//!
//! The firmware side of the boot sector demos: a typed model of the BIOS video services,
//! the demo configurations, and (with the `alloc` feature) a real-mode encoder that lowers
//! a demo to the bytes of a boot sector.
//!
//! Without `alloc` this crate only carries the service model and the demo constants, which is
//! what the bare-metal build links against.

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
pub mod asm;
pub mod demo;
pub mod service;

#[cfg(feature = "alloc")]
pub use asm::{AsmError, Assembler};
pub use demo::{CIALLO, DemoConfig, HELLO_WORLD, Output, TerminalLoop};
pub use service::{Registers, VIDEO_INTERRUPT, VideoMode, VideoService, WriteStringFlags};
