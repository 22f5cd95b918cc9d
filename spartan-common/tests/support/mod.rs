// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory doubles for the configuration port, an SST25-style flash and
//! the delay provider.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::spi::{ErrorType as SpiErrorType, SpiBus};

use spartan_common::bitstream::PREAMBLE;
use spartan_common::bus::{ConfigPort, Direction, Level, Line};
use spartan_common::engine::ByteSource;

// =============================================================================
// Delay
// =============================================================================

/// Records total requested delay instead of sleeping.
#[derive(Clone, Default)]
pub struct FakeDelay {
    pub elapsed_ns: Rc<RefCell<u64>>,
}

impl FakeDelay {
    pub fn elapsed_us(&self) -> u64 {
        *self.elapsed_ns.borrow() / 1_000
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.elapsed_ns.borrow_mut() += u64::from(ns);
    }
}

// =============================================================================
// FPGA
// =============================================================================

#[derive(Debug, Default)]
pub struct FpgaState {
    pub program_pulses: u32,
    program_low: bool,
    /// INIT reads left before it goes high after PROGRAM; `None` never.
    pub init_delay: Option<u32>,
    init_countdown: Option<u32>,
    /// Payload bytes the device needs before it raises DONE; `None` never.
    pub done_after: Option<usize>,
    pub clock_high: bool,
    pub clock_output: bool,
    pub data_output: bool,
    pub data: u8,
    /// Bytes latched on rising CCLK while the data bus was driven.
    pub received: Vec<u8>,
    /// Rising CCLK edges while the data bus was released.
    pub idle_clocks: u32,
    /// Rising CCLK edges after DONE went high.
    pub clocks_after_done: u32,
}

impl FpgaState {
    pub fn done(&self) -> bool {
        self.done_after
            .is_some_and(|needed| self.received.len() >= needed && self.idle_clocks > 0)
    }

    fn init_high(&mut self) -> bool {
        if self.program_low {
            return false;
        }
        match self.init_countdown.as_mut() {
            None => false,
            Some(0) => true,
            Some(n) => {
                *n -= 1;
                false
            }
        }
    }
}

/// Spartan slave-parallel port double.
#[derive(Clone)]
pub struct FakeFpga {
    pub state: Rc<RefCell<FpgaState>>,
}

impl FakeFpga {
    /// A device that is ready after `init_delay` INIT polls and starts up
    /// after `payload_len` bytes.
    pub fn new(init_delay: u32, payload_len: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(FpgaState {
                init_delay: Some(init_delay),
                done_after: Some(payload_len),
                ..FpgaState::default()
            })),
        }
    }

    pub fn never_ready() -> Self {
        let fake = Self::new(0, 1);
        fake.state.borrow_mut().init_delay = None;
        fake
    }

    pub fn never_done() -> Self {
        let fake = Self::new(0, 1);
        fake.state.borrow_mut().done_after = None;
        fake
    }

    pub fn received(&self) -> Vec<u8> {
        self.state.borrow().received.clone()
    }
}

impl ConfigPort for FakeFpga {
    fn set_direction(&mut self, line: Line, direction: Direction) {
        let mut s = self.state.borrow_mut();
        match (line, direction) {
            (Line::Program, Direction::Output) => {
                // Output latch is low whenever PROGRAM is driven here.
                s.program_low = true;
                s.program_pulses += 1;
            }
            (Line::Program, Direction::Input) => {
                if s.program_low {
                    s.program_low = false;
                    s.received.clear();
                    s.idle_clocks = 0;
                    s.clocks_after_done = 0;
                    s.init_countdown = s.init_delay;
                }
            }
            (Line::Clock, dir) => s.clock_output = dir == Direction::Output,
            _ => {}
        }
    }

    fn set_level(&mut self, line: Line, level: Level) {
        let mut s = self.state.borrow_mut();
        if line != Line::Clock || !s.clock_output {
            return;
        }
        let rising = !s.clock_high && level.is_high();
        s.clock_high = level.is_high();
        if !rising {
            return;
        }
        if s.done() {
            s.clocks_after_done += 1;
        } else if s.data_output {
            let byte = s.data;
            s.received.push(byte);
        } else {
            s.idle_clocks += 1;
        }
    }

    fn read(&mut self, line: Line) -> Level {
        let mut s = self.state.borrow_mut();
        match line {
            Line::Init => Level::from(s.init_high()),
            Line::Done => Level::from(s.done()),
            Line::Program => Level::from(!s.program_low),
            Line::Clock => Level::from(s.clock_high),
        }
    }

    fn set_data_direction(&mut self, direction: Direction) {
        self.state.borrow_mut().data_output = direction == Direction::Output;
    }

    fn write_data(&mut self, byte: u8) {
        self.state.borrow_mut().data = byte;
    }
}

// =============================================================================
// SPI flash
// =============================================================================

pub const FLASH_SIZE: usize = 64 * 1024;

/// Behavioural model of an SST25VF-series part.
#[derive(Debug)]
pub struct FlashState {
    pub memory: Vec<u8>,
    pub manufacturer: u8,
    pub write_enabled: bool,
    pub protected: bool,
    pub aai_addr: Option<u32>,
    pub busy_output: bool,
    /// Status or ready-line samples that report busy after each program.
    pub busy_reads: u32,
    busy_left: u32,
    selected: bool,
    current: Vec<u8>,
    /// Every completed chip-select frame, as sent.
    pub transactions: Vec<Vec<u8>>,
    pub exchanged: usize,
    pub erase_count: u32,
}

impl FlashState {
    fn new() -> Self {
        Self {
            memory: vec![0xFF; FLASH_SIZE],
            manufacturer: 0xBF,
            write_enabled: false,
            protected: true,
            aai_addr: None,
            busy_output: false,
            busy_reads: 2,
            busy_left: 0,
            selected: false,
            current: Vec::new(),
            transactions: Vec::new(),
            exchanged: 0,
            erase_count: 0,
        }
    }

    fn addr(bytes: &[u8]) -> u32 {
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
    }

    fn program(&mut self, addr: u32, byte: u8) {
        if !self.protected {
            let cell = &mut self.memory[addr as usize % FLASH_SIZE];
            *cell &= byte;
        }
    }

    /// Byte shifted out by the chip for the byte at `index` of a frame.
    fn response(&mut self, index: usize) -> u8 {
        match self.current.first().copied() {
            Some(0x9F) => match index {
                1 => self.manufacturer,
                2 => 0x25,
                3 => 0x41,
                _ => 0xFF,
            },
            Some(0x05) if index >= 1 => {
                let mut status = 0x00;
                if self.busy_left > 0 {
                    self.busy_left -= 1;
                    status |= 0x01;
                }
                if self.write_enabled {
                    status |= 0x02;
                }
                if self.aai_addr.is_some() {
                    status |= 0x40;
                }
                if self.protected {
                    status |= 0x1C;
                }
                status
            }
            Some(0x03) if index >= 4 => {
                let addr = Self::addr(&self.current[1..4]) as usize + index - 4;
                self.memory[addr % FLASH_SIZE]
            }
            _ => 0xFF,
        }
    }

    fn execute(&mut self, frame: &[u8]) {
        let Some((&op, args)) = frame.split_first() else {
            return;
        };
        match op {
            0x06 => self.write_enabled = true,
            0x04 => {
                self.write_enabled = false;
                self.aai_addr = None;
            }
            0x01 if self.write_enabled && !args.is_empty() => {
                self.protected = args[0] & 0x1C != 0;
                self.write_enabled = false;
            }
            0x60 if self.write_enabled => {
                if !self.protected {
                    self.memory.fill(0xFF);
                }
                self.erase_count += 1;
                self.write_enabled = false;
                self.busy_left = self.busy_reads;
            }
            0x02 if self.write_enabled && args.len() == 4 => {
                self.program(Self::addr(args), args[3]);
                self.write_enabled = false;
                self.busy_left = self.busy_reads;
            }
            0xAD => {
                let (addr, data) = match self.aai_addr {
                    None if self.write_enabled && args.len() == 5 => {
                        (Self::addr(args), &args[3..])
                    }
                    Some(addr) if args.len() == 2 => (addr, args),
                    _ => return,
                };
                self.program(addr, data[0]);
                self.program(addr + 1, data[1]);
                self.aai_addr = Some(addr + 2);
                self.busy_left = self.busy_reads;
            }
            0x70 => self.busy_output = true,
            0x80 => self.busy_output = false,
            _ => {}
        }
    }

    /// Frames sent, skipping status reads.
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .filter(|t| t.first() != Some(&0x05) && !t.is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct SimFlash {
    pub state: Rc<RefCell<FlashState>>,
}

impl SimFlash {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FlashState::new())),
        }
    }

    /// A part whose block protection is already cleared.
    pub fn unprotected() -> Self {
        let sim = Self::new();
        sim.state.borrow_mut().protected = false;
        sim
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi(self.state.clone())
    }

    pub fn cs(&self) -> SimCs {
        SimCs(self.state.clone())
    }

    pub fn ready(&self) -> SimReady {
        SimReady(self.state.clone())
    }

    pub fn contents(&self, addr: usize, len: usize) -> Vec<u8> {
        self.state.borrow().memory[addr..addr + len].to_vec()
    }

    pub fn load(&self, addr: usize, data: &[u8]) {
        self.state.borrow_mut().memory[addr..addr + data.len()].copy_from_slice(data);
    }

    pub fn bus_activity(&self) -> (usize, usize) {
        let s = self.state.borrow();
        (s.transactions.len(), s.exchanged)
    }
}

pub struct SimSpi(Rc<RefCell<FlashState>>);
pub struct SimCs(Rc<RefCell<FlashState>>);
pub struct SimReady(Rc<RefCell<FlashState>>);

impl SpiErrorType for SimSpi {
    type Error = Infallible;
}

impl SimSpi {
    fn shift(&mut self, out: u8) -> u8 {
        let mut s = self.0.borrow_mut();
        s.exchanged += 1;
        if !s.selected {
            return 0xFF;
        }
        s.current.push(out);
        let index = s.current.len() - 1;
        s.response(index)
    }
}

impl SpiBus<u8> for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for w in words.iter_mut() {
            *w = self.shift(0xFF);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &w in words {
            self.shift(w);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for i in 0..read.len().max(write.len()) {
            let byte = self.shift(write.get(i).copied().unwrap_or(0xFF));
            if let Some(slot) = read.get_mut(i) {
                *slot = byte;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for w in words.iter_mut() {
            *w = self.shift(*w);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl PinErrorType for SimCs {
    type Error = Infallible;
}

impl OutputPin for SimCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut s = self.0.borrow_mut();
        s.selected = true;
        s.current.clear();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut s = self.0.borrow_mut();
        if s.selected {
            s.selected = false;
            let frame = std::mem::take(&mut s.current);
            s.execute(&frame);
            s.transactions.push(frame);
        }
        Ok(())
    }
}

impl PinErrorType for SimReady {
    type Error = Infallible;
}

impl InputPin for SimReady {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let mut s = self.0.borrow_mut();
        if s.busy_left > 0 {
            s.busy_left -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

// =============================================================================
// Host link
// =============================================================================

/// Host link that hands out queued bytes in packets of at most `packet` bytes.
pub struct FakeHost {
    pending: VecDeque<u8>,
    packet: usize,
}

impl FakeHost {
    pub fn new(data: &[u8], packet: usize) -> Self {
        Self {
            pending: data.iter().copied().collect(),
            packet,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl ByteSource for FakeHost {
    fn receive(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.packet).min(self.pending.len());
        for slot in &mut buf[..n] {
            *slot = self.pending.pop_front().unwrap_or(0);
        }
        n
    }
}

// =============================================================================
// Containers
// =============================================================================

fn push_text(out: &mut Vec<u8>, id: u8, text: &str) {
    out.push(id);
    out.extend_from_slice(&((text.len() + 1) as u16).to_be_bytes());
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

/// A container with all four text fields and `payload`.
pub fn container(payload: &[u8]) -> Vec<u8> {
    let mut out = PREAMBLE.to_vec();
    push_text(&mut out, b'a', "blinky;UserID=0XFFFFFFFF");
    push_text(&mut out, b'b', "6slx9tqg144");
    push_text(&mut out, b'c', "2026/10/16");
    push_text(&mut out, b'd', "12:00:00");
    out.push(b'e');
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Header length of [`container`].
pub fn header_len() -> usize {
    container(&[]).len()
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}
