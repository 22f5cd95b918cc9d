// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Reset handling: the console key that survives a soft reset, and the two
//! ways out of the firmware.

use spartan_common::protocol::{CONSOLE_KEY, CONSOLE_KEY_ADDR};

/// Check whether the previous run asked to start in the console, and clear
/// the request so a power cycle loads from flash again.
pub fn take_console_key() -> bool {
    let key = unsafe { (CONSOLE_KEY_ADDR as *const u16).read_volatile() };
    unsafe {
        (CONSOLE_KEY_ADDR as *mut u16).write_volatile(0);
    }
    key == CONSOLE_KEY
}

/// Ask the next boot to skip the automatic load from flash.
pub fn arm_console_key() {
    unsafe {
        (CONSOLE_KEY_ADDR as *mut u16).write_volatile(CONSOLE_KEY);
    }
}

pub fn reboot() -> ! {
    // Small delay to ensure the key write completes
    cortex_m::asm::delay(100_000);
    cortex_m::peripheral::SCB::sys_reset();
}

/// Reboot into the RP2040 ROM USB mass-storage bootloader.
pub fn enter_usb_boot() -> ! {
    defmt::println!("Rebooting to USB bootloader");
    rp2040_hal::rom_data::reset_to_usb_boot(0, 0);
    // reset_to_usb_boot does not return on silicon.
    cortex_m::peripheral::SCB::sys_reset();
}
