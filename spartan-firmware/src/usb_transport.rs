// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC transport carrying the text console and raw containers.

use rp2040_hal::usb::UsbBus;
use spartan_common::engine::ByteSource;
use spartan_common::protocol::LinkRequest;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

/// Write attempts before output is dropped; the host may not be reading.
const TX_RETRIES: u32 = 10_000;

pub struct UsbTransport {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
    baud: u32,
}

impl UsbTransport {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Self {
        let serial = SerialPort::new(usb_bus);
        let builder = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000A)).strings(&[
            StringDescriptors::default()
                .manufacturer("ADNT")
                .product("Spartan Configurator")
                .serial_number("0001"),
        ]);
        let usb_dev = match builder {
            Ok(builder) => builder.device_class(usbd_serial::USB_CLASS_CDC).build(),
            Err(_) => defmt::panic!("bad USB string descriptors"),
        };

        let baud = serial.line_coding().data_rate();
        Self {
            serial,
            usb_dev,
            baud,
        }
    }

    /// Poll USB device. Must be called frequently.
    ///
    /// Reports what a change of line coding asks for: a reboot on one of
    /// the magic rates, the greeting on any other.
    pub fn poll(&mut self) -> Option<LinkRequest> {
        self.usb_dev.poll(&mut [&mut self.serial]);

        let baud = self.serial.line_coding().data_rate();
        if baud == self.baud {
            return None;
        }
        self.baud = baud;
        Some(LinkRequest::from_baud(baud))
    }

    /// Whether the host has enumerated the device.
    pub fn configured(&self) -> bool {
        self.usb_dev.state() == UsbDeviceState::Configured
    }

    /// Whether a terminal holds the port open.
    pub fn connected(&self) -> bool {
        self.serial.dtr()
    }

    /// Send bytes, servicing USB while the endpoint is full.
    ///
    /// Output is dropped when no terminal is attached or it stops reading.
    pub fn send(&mut self, bytes: &[u8]) {
        if !self.connected() {
            return;
        }
        let mut offset = 0;
        let mut retries = 0;
        while offset < bytes.len() {
            match self.serial.write(&bytes[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    retries += 1;
                    if retries > TX_RETRIES {
                        break;
                    }
                    self.usb_dev.poll(&mut [&mut self.serial]);
                }
                Err(_) => break,
            }
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.send(s.as_bytes());
    }

    /// Give the host time to collect pending output, e.g. before a reset.
    pub fn drain(&mut self) {
        for _ in 0..100 {
            self.usb_dev.poll(&mut [&mut self.serial]);
            cortex_m::asm::delay(10_000);
        }
    }
}

impl ByteSource for UsbTransport {
    fn receive(&mut self, buf: &mut [u8]) -> usize {
        match self.serial.read(buf) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }
}
