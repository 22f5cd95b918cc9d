// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Spartan configurator for RP2040: loads a Xilinx Spartan FPGA from USB or
//! from SPI flash, driven from any serial terminal.

#![no_std]
#![no_main]

mod boot;
mod console;
mod peripherals;
mod usb_transport;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use rp2040_hal as hal;
use spartan_common::protocol::LinkRequest;
use spartan_common::sequencer::Sequencer;
use usb_device::class_prelude::UsbBusAllocator;

use console::Console;
use usb_transport::UsbTransport;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    defmt::println!("Spartan configurator init");

    let mut p = peripherals::init();
    let mut seq = Sequencer::new(p.fpga, p.timer);
    let mut console = Console::new();

    if boot::take_console_key() {
        defmt::println!("Console key set, skipping load from flash");
        console.greet();
    } else {
        defmt::println!("Loading FPGA from flash");
        console.configure_from_flash(&mut seq);
    }

    let Some(mut usb) = p.usb.take() else {
        defmt::panic!("USB peripherals already taken");
    };
    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    ));
    peripherals::store_usb_bus(usb_bus);
    let mut transport = UsbTransport::new(peripherals::usb_bus_ref());

    defmt::println!("USB CDC initialized, entering main loop");

    loop {
        match transport.poll() {
            Some(LinkRequest::UsbBoot) => boot::enter_usb_boot(),
            Some(LinkRequest::ConsoleReset) => {
                defmt::println!("Console reset requested");
                console.abort(&mut seq);
                if let Err(err) = seq.reset() {
                    defmt::warn!("FPGA reset: {}", err);
                }
                boot::arm_console_key();
                boot::reboot();
            }
            Some(LinkRequest::Greet) => console.greet(),
            None => {}
        }

        let mode = console.mode();
        console.step(&mut transport, &mut p.flash, &mut seq);
        if console.mode() != mode {
            defmt::debug!("console {} -> {}", mode, console.mode());
        }
    }
}
