// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Peripheral initialization and board bindings.
//!
//! Pin map:
//! - SPI0 flash: SCK GPIO2, MOSI GPIO3, MISO GPIO4, CS GPIO5
//! - FPGA: PROGRAM_B GPIO6, INIT_B GPIO7, D0..D7 GPIO8..GPIO15,
//!   CCLK GPIO16, DONE GPIO17

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin};
use rp2040_hal as hal;
use rp2040_hal::fugit::RateExtU32;
use rp2040_hal::usb::UsbBus;
use rp2040_hal::Clock;
use spartan_common::bus::{ConfigPort, Direction, Level, Line};
use spartan_common::spi_flash::{BusyGate, SpiFlash};
use usb_device::class_prelude::UsbBusAllocator;

const MISO_PIN: u32 = 4;
const PROGRAM_PIN: u32 = 6;
const INIT_PIN: u32 = 7;
const DATA_SHIFT: u32 = 8;
const CCLK_PIN: u32 = 16;
const DONE_PIN: u32 = 17;

const DATA_MASK: u32 = 0xFF << DATA_SHIFT;

const SPI_BAUD_HZ: u32 = 8_000_000;

type SpiPins = (
    hal::gpio::Pin<hal::gpio::bank0::Gpio3, hal::gpio::FunctionSpi, hal::gpio::PullDown>,
    hal::gpio::Pin<hal::gpio::bank0::Gpio4, hal::gpio::FunctionSpi, hal::gpio::PullDown>,
    hal::gpio::Pin<hal::gpio::bank0::Gpio2, hal::gpio::FunctionSpi, hal::gpio::PullDown>,
);

pub type FlashSpi = hal::spi::Spi<hal::spi::Enabled, hal::pac::SPI0, SpiPins, 8>;
pub type CsPin =
    hal::gpio::Pin<hal::gpio::bank0::Gpio5, hal::gpio::FunctionSioOutput, hal::gpio::PullDown>;
pub type FpgaPin =
    hal::gpio::Pin<hal::gpio::DynPinId, hal::gpio::FunctionSioInput, hal::gpio::PullNone>;

#[cfg(feature = "ready-line-busy")]
pub type ReadyPin = MisoLevel;
#[cfg(not(feature = "ready-line-busy"))]
pub type ReadyPin = spartan_common::spi_flash::NoReadyLine;

pub type Flash = SpiFlash<FlashSpi, CsPin, ReadyPin, hal::Timer>;

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

pub fn usb_bus_ref() -> &'static UsbBusAllocator<UsbBus> {
    match unsafe { (*core::ptr::addr_of!(USB_BUS)).as_ref() } {
        Some(bus) => bus,
        None => defmt::panic!("USB bus not initialized"),
    }
}

pub fn store_usb_bus(bus: UsbBusAllocator<UsbBus>) {
    unsafe {
        USB_BUS = Some(bus);
    }
}

fn sio() -> &'static hal::pac::sio::RegisterBlock {
    unsafe { &*hal::pac::SIO::ptr() }
}

fn pads() -> &'static hal::pac::pads_bank0::RegisterBlock {
    unsafe { &*hal::pac::PADS_BANK0::ptr() }
}

fn set_pull_up(pin: u32, enabled: bool) {
    pads()
        .gpio(pin as usize)
        .modify(|_, w| w.pue().bit(enabled).pde().clear_bit());
}

/// Slave-parallel configuration port on raw SIO registers.
///
/// Lines change direction mid-transfer and the data bus is written as one
/// byte, so the pins are driven through the SIO set/clear registers rather
/// than through typed pin modes. The typed pins are kept to hold ownership.
pub struct Rp2040ConfigPort {
    _pins: [FpgaPin; 12],
}

impl Rp2040ConfigPort {
    fn mask(line: Line) -> u32 {
        let pin = match line {
            Line::Program => PROGRAM_PIN,
            Line::Init => INIT_PIN,
            Line::Clock => CCLK_PIN,
            Line::Done => DONE_PIN,
        };
        1 << pin
    }

    fn pin(line: Line) -> u32 {
        Self::mask(line).trailing_zeros()
    }
}

impl ConfigPort for Rp2040ConfigPort {
    fn set_direction(&mut self, line: Line, direction: Direction) {
        let mask = Self::mask(line);
        match direction {
            Direction::Output => sio().gpio_oe_set().write(|w| unsafe { w.bits(mask) }),
            Direction::Input => sio().gpio_oe_clr().write(|w| unsafe { w.bits(mask) }),
        };
    }

    fn set_level(&mut self, line: Line, level: Level) {
        let mask = Self::mask(line);
        match level {
            Level::High => sio().gpio_out_set().write(|w| unsafe { w.bits(mask) }),
            Level::Low => sio().gpio_out_clr().write(|w| unsafe { w.bits(mask) }),
        };
        set_pull_up(Self::pin(line), level.is_high());
    }

    fn read(&mut self, line: Line) -> Level {
        Level::from(sio().gpio_in().read().bits() & Self::mask(line) != 0)
    }

    fn set_data_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Output => sio().gpio_oe_set().write(|w| unsafe { w.bits(DATA_MASK) }),
            Direction::Input => sio().gpio_oe_clr().write(|w| unsafe { w.bits(DATA_MASK) }),
        };
    }

    fn write_data(&mut self, byte: u8) {
        let high = u32::from(byte) << DATA_SHIFT;
        sio()
            .gpio_out_clr()
            .write(|w| unsafe { w.bits(DATA_MASK & !high) });
        sio().gpio_out_set().write(|w| unsafe { w.bits(high) });
        for bit in 0..8 {
            set_pull_up(DATA_SHIFT + bit, byte & (1 << bit) != 0);
        }
    }
}

/// Level of the MISO pad, read through SIO while the pin stays on SPI0.
///
/// After EBSY the flash drives SO low while a word program is in progress.
pub struct MisoLevel;

impl ErrorType for MisoLevel {
    type Error = Infallible;
}

impl InputPin for MisoLevel {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(sio().gpio_in().read().bits() & (1 << MISO_PIN) != 0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

pub struct Peripherals {
    pub timer: hal::Timer,
    pub flash: Flash,
    pub fpga: Rp2040ConfigPort,
    pub usb: Option<UsbPeripherals>,
}

pub struct UsbPeripherals {
    pub regs: hal::pac::USBCTRL_REGS,
    pub dpram: hal::pac::USBCTRL_DPRAM,
    pub clock: hal::clocks::UsbClock,
    pub resets: hal::pac::RESETS,
}

#[cfg(feature = "ready-line-busy")]
fn busy_gate() -> BusyGate<ReadyPin> {
    BusyGate::ReadyLine(MisoLevel)
}

#[cfg(not(feature = "ready-line-busy"))]
fn busy_gate() -> BusyGate<ReadyPin> {
    BusyGate::status_register()
}

pub fn init() -> Peripherals {
    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let Ok(clocks) = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        defmt::panic!("clock init failed");
    };

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let spi_pins: SpiPins = (
        pins.gpio3.into_function(),
        pins.gpio4.into_function(),
        pins.gpio2.into_function(),
    );
    let spi = hal::spi::Spi::<_, _, _, 8>::new(pac.SPI0, spi_pins).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        SPI_BAUD_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );
    let cs = pins
        .gpio5
        .into_push_pull_output_in_state(hal::gpio::PinState::High);
    let flash = SpiFlash::new(spi, cs, busy_gate(), timer);

    let fpga = Rp2040ConfigPort {
        _pins: [
            pins.gpio6.into_floating_input().into_dyn_pin(),
            pins.gpio7.into_floating_input().into_dyn_pin(),
            pins.gpio8.into_floating_input().into_dyn_pin(),
            pins.gpio9.into_floating_input().into_dyn_pin(),
            pins.gpio10.into_floating_input().into_dyn_pin(),
            pins.gpio11.into_floating_input().into_dyn_pin(),
            pins.gpio12.into_floating_input().into_dyn_pin(),
            pins.gpio13.into_floating_input().into_dyn_pin(),
            pins.gpio14.into_floating_input().into_dyn_pin(),
            pins.gpio15.into_floating_input().into_dyn_pin(),
            pins.gpio16.into_floating_input().into_dyn_pin(),
            pins.gpio17.into_floating_input().into_dyn_pin(),
        ],
    };

    Peripherals {
        timer,
        flash,
        fpga,
        usb: Some(UsbPeripherals {
            regs: pac.USBCTRL_REGS,
            dpram: pac.USBCTRL_DPRAM,
            clock: clocks.usb_clock,
            resets: pac.RESETS,
        }),
    }
}
