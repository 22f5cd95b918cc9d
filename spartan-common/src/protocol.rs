// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Console protocol shared by the firmware and `spartan-upload`.
//!
//! The host link is a plain terminal session over USB CDC. A command is a
//! single character sent on its own; the firmware echoes it and answers with
//! the fixed strings below. Containers follow `V` and `W` as raw bytes.

/// Load the FPGA from the container that follows.
pub const CMD_VOLATILE: u8 = b'V';
/// Store the container that follows in flash, then load the FPGA from it.
pub const CMD_WRITE: u8 = b'W';
/// Load the FPGA from flash.
pub const CMD_CONFIG: u8 = b'C';
/// Show flash and stored design information.
pub const CMD_INFO: u8 = b'i';
pub const CMD_HELP: u8 = b'?';

pub const GREETING: &str = "\r\n\n* Spartan configurator *\r\n";
pub const HELP: &str = "\r\nCommands:\r\n V: Volatile Config\r\n W: Write to FLASH\r\n C: Config from FLASH\r\n i: Info about FLASH\r\n ?: Help\r\n";
pub const PROMPT: &str = "\r\n> ";
pub const UNKNOWN: &str = " <- ?";
pub const AWAITING: &str = "\r\nAwaiting data";
pub const SUCCESS: &str = "\r\nSuccess";
pub const FAIL: &str = "\r\nFAIL";
pub const FLASH_EMPTY: &str = "\r\nConfig FLASH is empty";
pub const WRONG_FLASH: &str = "\r\nNot a Microchip FLASH";
pub const INVALID: &str = "\r\nInvalid bitstream";
pub const VERIFY_FAILED: &str = "\r\nVerify failed";
/// Followed by `<len> bytes, CRC32 0x<crc>` once a stored image verifies.
pub const STORED: &str = "\r\nStored ";

/// RAM word surviving a soft reset; [`CONSOLE_KEY`] there skips the
/// automatic load from flash at boot.
pub const CONSOLE_KEY_ADDR: u32 = 0x2003_BFF0;
pub const CONSOLE_KEY: u16 = 0x8888;

/// Line coding that reboots into the RP2040 USB bootloader.
pub const BAUD_USB_BOOT: u32 = 1200;
/// Line coding that resets the FPGA and reboots into the console.
pub const BAUD_CONSOLE_RESET: u32 = 2400;

/// What the firmware does when the host changes the line coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRequest {
    /// Reboot into the ROM USB bootloader.
    UsbBoot,
    /// Reset the FPGA and reboot into the console.
    ConsoleReset,
    /// A terminal opened the port; show the greeting.
    Greet,
}

impl LinkRequest {
    pub fn from_baud(baud: u32) -> Self {
        match baud {
            BAUD_USB_BOOT => LinkRequest::UsbBoot,
            BAUD_CONSOLE_RESET => LinkRequest::ConsoleReset,
            _ => LinkRequest::Greet,
        }
    }
}

/// Parse the `<len> bytes, CRC32 0x<crc>` report that follows [`STORED`].
pub fn parse_stored_report(text: &str) -> Option<(u32, u32)> {
    let rest = text.trim_start();
    let (len, rest) = rest.split_once(" bytes, CRC32 0x")?;
    let crc: &str = rest
        .split(|c: char| !c.is_ascii_hexdigit())
        .next()
        .unwrap_or("");
    Some((len.trim().parse().ok()?, u32::from_str_radix(crc, 16).ok()?))
}
