//! Bare-metal builds of the boot sector demos
//!
//! Each binary expands [`boot_sector!`] for the entry stub, the signature and the panic
//! handler, then provides `boot_main`, which the entry stub calls once segments and stack
//! are set up.

#![no_std]

pub mod firmware;

/// The boot signature as it is laid out in the sector
pub const SIGNATURE_BYTES: [u8; 2] = mbr::SIGNATURE.to_le_bytes();

/// Emits the entry stub, the boot signature and a panic handler into the calling binary
#[macro_export]
macro_rules! boot_sector {
    () => {
        core::arch::global_asm!(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/src/entry.s"
        )));

        #[used]
        #[unsafe(link_section = ".boot_signature")]
        static BOOT_SIGNATURE: [u8; 2] = $crate::SIGNATURE_BYTES;

        #[panic_handler]
        fn panic(_info: &core::panic::PanicInfo) -> ! {
            $crate::firmware::halt_forever()
        }
    };
}
