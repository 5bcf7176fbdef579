//! The only place the demos talk to the firmware directly

use core::arch::asm;

use bootdemo_bios::{VIDEO_INTERRUPT, VideoService};

/// Issues a BIOS video service call
///
/// # Safety
/// The segment registers must still be the ones the entry stub set up, and a write-string
/// call must point into memory reachable through `ES`.
#[inline(always)]
pub unsafe fn invoke(service: VideoService) {
    let regs = service.registers();
    // BP is reserved by the compiler, so it is swapped in around the call
    unsafe {
        asm!(
            "push bp",
            "mov bp, {bp:x}",
            "int {vector}",
            "pop bp",
            vector = const VIDEO_INTERRUPT,
            bp = in(reg) regs.bp,
            inout("ax") regs.ax => _,
            inout("bx") regs.bx => _,
            inout("cx") regs.cx => _,
            inout("dx") regs.dx => _,
        );
    }
}

/// Prints a message one character at a time with the teletype service
pub fn teletype(message: &[u8], page: u8, color: u8) {
    for &ch in message {
        // SAFETY: teletype output reads no memory
        unsafe { invoke(VideoService::Teletype { ch, page, color }) };
    }
}

/// Sleeps until the next interrupt, forever
pub fn halt_forever() -> ! {
    loop {
        // SAFETY: hlt only waits for an interrupt
        unsafe { asm!("hlt", options(nomem, nostack)) };
    }
}

/// Jumps in place, forever
#[allow(clippy::empty_loop)]
pub fn spin_forever() -> ! {
    loop {}
}
