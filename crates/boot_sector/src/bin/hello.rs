#![no_std]
#![no_main]

use boot_sector::firmware;
use bootdemo_bios::{HELLO_WORLD, Output, VideoService};

boot_sector::boot_sector!();

#[unsafe(no_mangle)]
extern "C" fn boot_main() -> ! {
    if let Output::WriteString {
        flags,
        page,
        attribute,
        row,
        column,
    } = HELLO_WORLD.output
    {
        let message = HELLO_WORLD.message;
        let service = VideoService::WriteString {
            flags,
            page,
            attribute,
            len: message.len() as u16,
            row,
            column,
            // Segments are zero, so the linear address is the offset
            offset: message.as_ptr() as usize as u16,
        };
        // SAFETY: the message lives in the sector, below 64K and reachable through ES
        unsafe { firmware::invoke(service) };
    }
    firmware::spin_forever()
}
