#![no_std]
#![no_main]

use boot_sector::firmware;
use bootdemo_bios::{CIALLO, Output};

boot_sector::boot_sector!();

#[unsafe(no_mangle)]
extern "C" fn boot_main() -> ! {
    if let Some(service) = CIALLO.mode_service() {
        // SAFETY: a mode switch reads no memory
        unsafe { firmware::invoke(service) };
    }
    if let Output::Teletype { page, color } = CIALLO.output {
        firmware::teletype(CIALLO.message, page, color);
    }
    firmware::halt_forever()
}
