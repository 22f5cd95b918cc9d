// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Driver for SST25-family SPI flash (SST25VF, SST25PF and Adesto clones).
//!
//! These parts only support whole-chip erase and have no page program; the
//! fast write path is the auto-address-increment (AAI) word program, which
//! commits two bytes per command. [`SpiFlash::write`] aligns arbitrary
//! ranges around it.
//!
//! Completion of a program or erase is detected either from the BUSY bit of
//! the status register or from the SO line, which the chip turns into a
//! RY/BY# output after EBSY. The choice is fixed by the [`BusyGate`] the
//! driver is built with.

use core::convert::Infallible;
use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal::spi::SpiBus;

use crate::flash::FlashStore;
use crate::poll::{CancelToken, PollBudget, PollError, Poller};

/// JEDEC manufacturer id of Microchip / SST.
pub const ID_MICROCHIP: u8 = 0xBF;
/// JEDEC manufacturer id of Adesto.
pub const ID_ADESTO: u8 = 0x1F;

const STATUS_BUSY: u8 = 0x01;
const DUMMY: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    WriteStatus = 0x01,
    ByteProgram = 0x02,
    Read = 0x03,
    WriteDisable = 0x04,
    ReadStatus = 0x05,
    WriteEnable = 0x06,
    ChipErase = 0x60,
    EnableBusyOutput = 0x70,
    DisableBusyOutput = 0x80,
    JedecId = 0x9F,
    AutoIncrementWrite = 0xAD,
}

/// How the driver learns that a program or erase has completed.
pub enum BusyGate<RDY> {
    /// Poll bit 0 of the status register.
    StatusRegister,
    /// Poll the RY/BY# output on SO while the chip is selected.
    ReadyLine(RDY),
}

impl BusyGate<NoReadyLine> {
    pub const fn status_register() -> Self {
        BusyGate::StatusRegister
    }
}

/// Placeholder ready pin for [`BusyGate::StatusRegister`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReadyLine;

impl ErrorType for NoReadyLine {
    type Error = Infallible;
}

impl InputPin for NoReadyLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError<E> {
    /// SPI transfer failed.
    Bus(E),
    /// Chip select or ready line could not be accessed.
    Pin,
    /// The chip stayed busy past its budget.
    Busy(PollError),
}

impl<E> From<PollError> for FlashError<E> {
    fn from(err: PollError) -> Self {
        FlashError::Busy(err)
    }
}

impl<E: fmt::Debug> fmt::Display for FlashError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::Bus(e) => write!(f, "SPI error: {:?}", e),
            FlashError::Pin => write!(f, "pin error"),
            FlashError::Busy(e) => write!(f, "flash busy: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for FlashError<E> {}

/// Busy-wait budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashTiming {
    /// Single byte program (10 us typical).
    pub byte_program: PollBudget,
    /// One AAI word (10 us typical).
    pub word_program: PollBudget,
    /// Whole-chip erase (50 ms typical).
    pub chip_erase: PollBudget,
    /// Settle time before sampling RY/BY#.
    pub ready_settle_us: u32,
}

impl Default for FlashTiming {
    fn default() -> Self {
        Self {
            byte_program: PollBudget::new(1_000, 2),
            word_program: PollBudget::new(1_000, 2),
            chip_erase: PollBudget::new(4_000, 250),
            ready_settle_us: 1,
        }
    }
}

fn address(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

pub struct SpiFlash<SPI, CS, RDY, D> {
    spi: SPI,
    cs: CS,
    busy: BusyGate<RDY>,
    delay: D,
    timing: FlashTiming,
    cancel: Option<&'static CancelToken>,
}

impl<SPI, CS, RDY, D> SpiFlash<SPI, CS, RDY, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    RDY: InputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, busy: BusyGate<RDY>, delay: D) -> Self {
        Self::with_timing(spi, cs, busy, delay, FlashTiming::default())
    }

    pub fn with_timing(
        spi: SPI,
        mut cs: CS,
        busy: BusyGate<RDY>,
        delay: D,
        timing: FlashTiming,
    ) -> Self {
        cs.set_high().ok();
        Self {
            spi,
            cs,
            busy,
            delay,
            timing,
            cancel: None,
        }
    }

    /// Abort busy waits when `token` is raised.
    pub fn set_cancel_token(&mut self, token: &'static CancelToken) {
        self.cancel = Some(token);
    }

    pub fn release(self) -> (SPI, CS, BusyGate<RDY>, D) {
        (self.spi, self.cs, self.busy, self.delay)
    }

    /// Send one byte and return the byte clocked in at the same time.
    pub fn exchange(&mut self, byte: u8) -> Result<u8, FlashError<SPI::Error>> {
        let mut buf = [byte];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(FlashError::Bus)?;
        Ok(buf[0])
    }

    /// Run `f` with the chip selected. Chip select is released even when
    /// `f` fails.
    fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, FlashError<SPI::Error>>,
    ) -> Result<T, FlashError<SPI::Error>> {
        self.cs.set_low().map_err(|_| FlashError::Pin)?;
        let result = f(self);
        let flushed = self.spi.flush().map_err(FlashError::Bus);
        self.cs.set_high().map_err(|_| FlashError::Pin)?;
        let value = result?;
        flushed?;
        Ok(value)
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), FlashError<SPI::Error>> {
        self.transaction(|flash| {
            for &byte in bytes {
                flash.exchange(byte)?;
            }
            Ok(())
        })
    }

    /// JEDEC manufacturer id.
    pub fn chip_id(&mut self) -> Result<u8, FlashError<SPI::Error>> {
        self.transaction(|flash| {
            flash.exchange(Opcode::JedecId as u8)?;
            flash.exchange(DUMMY)
        })
    }

    pub fn read_status(&mut self) -> Result<u8, FlashError<SPI::Error>> {
        self.transaction(|flash| {
            flash.exchange(Opcode::ReadStatus as u8)?;
            flash.exchange(DUMMY)
        })
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError<SPI::Error>> {
        let [a2, a1, a0] = address(addr);
        self.transaction(|flash| {
            for byte in [Opcode::Read as u8, a2, a1, a0] {
                flash.exchange(byte)?;
            }
            for slot in buf.iter_mut() {
                *slot = flash.exchange(DUMMY)?;
            }
            Ok(())
        })
    }

    fn wait_status(&mut self, budget: PollBudget) -> Result<(), FlashError<SPI::Error>> {
        let mut poller = Poller::new(budget, self.cancel);
        while self.read_status()? & STATUS_BUSY != 0 {
            poller.tick(&mut self.delay)?;
        }
        Ok(())
    }

    /// Wait for an AAI word to commit.
    fn wait_word(&mut self) -> Result<(), FlashError<SPI::Error>> {
        let BusyGate::ReadyLine(pin) = &mut self.busy else {
            return self.wait_status(self.timing.word_program);
        };

        self.delay.delay_us(self.timing.ready_settle_us);
        self.cs.set_low().map_err(|_| FlashError::Pin)?;
        let mut poller = Poller::new(self.timing.word_program, self.cancel);
        let result = loop {
            match pin.is_low() {
                Ok(false) => break Ok(()),
                Ok(true) => {
                    if let Err(e) = poller.tick(&mut self.delay) {
                        break Err(FlashError::Busy(e));
                    }
                }
                Err(_) => break Err(FlashError::Pin),
            }
        };
        self.cs.set_high().map_err(|_| FlashError::Pin)?;
        result
    }

    fn uses_ready_line(&self) -> bool {
        matches!(self.busy, BusyGate::ReadyLine(_))
    }

    fn program_byte(&mut self, addr: u32, byte: u8) -> Result<(), FlashError<SPI::Error>> {
        let [a2, a1, a0] = address(addr);
        self.command(&[Opcode::WriteEnable as u8])?;
        self.command(&[Opcode::ByteProgram as u8, a2, a1, a0, byte])?;
        self.wait_status(self.timing.byte_program)
    }

    /// Clear block protection and erase the whole chip.
    pub fn erase_all(&mut self) -> Result<(), FlashError<SPI::Error>> {
        self.command(&[Opcode::WriteEnable as u8])?;
        self.command(&[Opcode::WriteStatus as u8, 0x00])?;
        self.command(&[Opcode::WriteEnable as u8])?;
        self.command(&[Opcode::ChipErase as u8])?;
        self.wait_status(self.timing.chip_erase)
    }

    /// AAI word sequence starting at the even `addr`. Returns the address
    /// after the last word. Leaves AAI mode open.
    fn program_words(
        &mut self,
        mut addr: u32,
        words: core::slice::ChunksExact<'_, u8>,
    ) -> Result<u32, FlashError<SPI::Error>> {
        for (i, word) in words.enumerate() {
            if i == 0 {
                let [a2, a1, a0] = address(addr);
                self.command(&[Opcode::WriteEnable as u8])?;
                self.command(&[
                    Opcode::AutoIncrementWrite as u8,
                    a2,
                    a1,
                    a0,
                    word[0],
                    word[1],
                ])?;
            } else {
                self.command(&[Opcode::AutoIncrementWrite as u8, word[0], word[1]])?;
            }
            self.wait_word()?;
            addr += 2;
        }
        Ok(addr)
    }

    /// Program `data` at `addr`.
    ///
    /// An odd start address gets a single byte program first, the aligned
    /// middle goes out as AAI words, and an odd trailing byte gets a single
    /// byte program last. Empty `data` touches nothing.
    pub fn write(&mut self, mut addr: u32, data: &[u8]) -> Result<(), FlashError<SPI::Error>> {
        let mut rest = data;

        if addr & 1 == 1 {
            if let Some((&first, tail)) = rest.split_first() {
                self.program_byte(addr, first)?;
                addr += 1;
                rest = tail;
            }
        }

        let words = rest.chunks_exact(2);
        let remainder = words.remainder();
        if words.len() > 0 {
            let ready_line = self.uses_ready_line();
            if ready_line {
                self.command(&[Opcode::EnableBusyOutput as u8])?;
            }
            let programmed = self.program_words(addr, words);
            // The chip ignores everything but AAI, RDSR and WRDI until WRDI.
            let disabled = self.command(&[Opcode::WriteDisable as u8]);
            let released = if ready_line {
                self.command(&[Opcode::DisableBusyOutput as u8])
            } else {
                Ok(())
            };
            addr = programmed?;
            disabled?;
            released?;
        }

        if let [last] = remainder {
            self.program_byte(addr, *last)?;
        }
        Ok(())
    }
}

impl<SPI, CS, RDY, D> FlashStore for SpiFlash<SPI, CS, RDY, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    RDY: InputPin,
    D: DelayNs,
{
    type Error = FlashError<SPI::Error>;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        SpiFlash::read(self, addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        SpiFlash::write(self, addr, data)
    }

    fn erase_all(&mut self) -> Result<(), Self::Error> {
        SpiFlash::erase_all(self)
    }
}
