// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! FPGA slave-parallel configuration sequencer.
//!
//! A load goes through these states:
//!
//! ```text
//! Standby -> Header -> Prepare -> Body -> Startup -> Standby
//!              |          |                  |
//!              +----------+------> Fail <----+
//! ```
//!
//! - Header: the container header is parsed byte by byte.
//! - Prepare: PROGRAM is pulsed and INIT polled until the device is ready.
//! - Body: payload bytes go onto the data bus, one CCLK strobe each.
//! - Startup: CCLK runs until DONE rises, then 8 more cycles.
//!
//! `Fail` is reported exactly once by [`Sequencer::process`], which then
//! drops back to `Standby`. A new attempt always starts with
//! [`Sequencer::start`].

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::bitstream::{FramerError, FramerSignal, HeaderFramer};
use crate::bus::{ConfigPort, Direction, Level, Line};
use crate::poll::{CancelToken, PollBudget, PollError, Poller};

/// The two handshake lines that are waited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Handshake {
    Init,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    Malformed(FramerError),
    HandshakeTimeout(Handshake),
    Cancelled,
}

impl ConfigError {
    fn from_poll(err: PollError, line: Handshake) -> Self {
        match err {
            PollError::TimedOut => ConfigError::HandshakeTimeout(line),
            PollError::Cancelled => ConfigError::Cancelled,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Malformed(err) => write!(f, "malformed bitstream: {}", err),
            ConfigError::HandshakeTimeout(Handshake::Init) => {
                write!(f, "device never raised INIT")
            }
            ConfigError::HandshakeTimeout(Handshake::Done) => {
                write!(f, "device never raised DONE")
            }
            ConfigError::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Standby,
    Header,
    Prepare,
    Body,
    Startup,
    Fail(ConfigError),
}

/// Progress of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigSession {
    pub state: State,
    pub bytes_remaining: u32,
    pub total_payload_size: u32,
}

impl ConfigSession {
    const fn idle() -> Self {
        Self {
            state: State::Standby,
            bytes_remaining: 0,
            total_payload_size: 0,
        }
    }
}

/// Outcome of one [`Sequencer::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigStatus {
    /// No attempt in progress.
    Ready,
    /// Header or payload still incomplete.
    Ongoing,
    /// Payload complete; the next call runs the startup sequence.
    Finishing,
    Success,
    Fail(ConfigError),
}

/// Electrical timing of the configuration port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Quiet time before PROGRAM is pulled low.
    pub program_setup_us: u32,
    /// PROGRAM low pulse width (300 ns minimum on Spartan-6).
    pub program_pulse_us: u32,
    /// Wait for INIT after PROGRAM is released.
    pub init_poll: PollBudget,
    /// CCLK cycles allowed for DONE to rise, `interval_us` apart.
    pub done_poll: PollBudget,
    /// Extra CCLK cycles after DONE.
    pub startup_clocks: u8,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            program_setup_us: 1,
            program_pulse_us: 1,
            init_poll: PollBudget::new(1_000, 10),
            done_poll: PollBudget::new(10_000, 0),
            startup_clocks: 8,
        }
    }
}

pub struct Sequencer<P, D> {
    port: P,
    delay: D,
    timing: Timing,
    framer: HeaderFramer,
    session: ConfigSession,
    cancel: Option<&'static CancelToken>,
}

impl<P: ConfigPort, D: DelayNs> Sequencer<P, D> {
    pub fn new(port: P, delay: D) -> Self {
        Self::with_timing(port, delay, Timing::default())
    }

    pub fn with_timing(port: P, delay: D, timing: Timing) -> Self {
        let mut seq = Self {
            port,
            delay,
            timing,
            framer: HeaderFramer::new(),
            session: ConfigSession::idle(),
            cancel: None,
        };
        seq.init_ports();
        seq
    }

    /// Abort handshake waits when `token` is raised.
    pub fn set_cancel_token(&mut self, token: &'static CancelToken) {
        self.cancel = Some(token);
    }

    pub fn session(&self) -> &ConfigSession {
        &self.session
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn release(self) -> (P, D) {
        (self.port, self.delay)
    }

    /// Put every line in its idle state: inputs, PROGRAM pulled up.
    pub fn init_ports(&mut self) {
        self.port.set_direction(Line::Program, Direction::Input);
        self.port.set_level(Line::Program, Level::High);
        self.port.set_direction(Line::Done, Direction::Input);
        self.port.set_level(Line::Done, Level::Low);
        self.idle_ports();
        self.session = ConfigSession::idle();
    }

    fn idle_ports(&mut self) {
        self.port.set_direction(Line::Clock, Direction::Input);
        self.port.set_level(Line::Clock, Level::Low);
        self.port.set_direction(Line::Init, Direction::Input);
        self.port.set_level(Line::Init, Level::Low);
        self.port.set_data_direction(Direction::Input);
        self.port.write_data(0x00);
    }

    /// Begin a new attempt. Nothing from a previous attempt survives.
    pub fn start(&mut self) {
        self.framer.reset();
        self.session = ConfigSession {
            state: State::Header,
            bytes_remaining: 0,
            total_payload_size: 0,
        };
    }

    /// Drop any attempt in progress and release the port.
    pub fn abort(&mut self) {
        self.framer.reset();
        self.init_ports();
    }

    /// Pulse PROGRAM and wait for the device to raise INIT.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.delay.delay_us(self.timing.program_setup_us);

        // PROGRAM emulates open drain: driven low, released to its pull-up.
        self.port.set_level(Line::Program, Level::Low);
        self.port.set_direction(Line::Program, Direction::Output);
        self.port.set_direction(Line::Init, Direction::Input);
        self.port.set_level(Line::Init, Level::High);
        self.port.set_level(Line::Clock, Level::Low);
        self.port.set_direction(Line::Clock, Direction::Output);
        self.delay.delay_us(self.timing.program_pulse_us);
        self.port.set_direction(Line::Program, Direction::Input);
        self.port.set_level(Line::Program, Level::High);

        let mut poller = Poller::new(self.timing.init_poll, self.cancel);
        while !self.port.read(Line::Init).is_high() {
            poller
                .tick(&mut self.delay)
                .map_err(|e| ConfigError::from_poll(e, Handshake::Init))?;
        }
        trace!("INIT high after {} polls", poller.used());
        Ok(())
    }

    fn strobe_clock(&mut self) {
        self.port.set_level(Line::Clock, Level::High);
        self.port.set_level(Line::Clock, Level::Low);
    }

    /// Shift `bytes` onto the data bus, one CCLK strobe per byte.
    pub fn write_block(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.port.write_data(byte);
            self.strobe_clock();
        }
    }

    fn release_data_bus(&mut self) {
        self.port.set_data_direction(Direction::Input);
        self.port.write_data(0xFF);
    }

    fn enter_body(&mut self) {
        self.port.set_data_direction(Direction::Output);
        self.session.bytes_remaining = self.session.total_payload_size;
        self.session.state = State::Body;
    }

    /// Reset the device and expect `total` payload bytes through
    /// [`Sequencer::feed_body`].
    pub fn prepare(&mut self, total: u32) -> Result<(), ConfigError> {
        self.framer.reset();
        self.session = ConfigSession {
            state: State::Prepare,
            bytes_remaining: 0,
            total_payload_size: total,
        };
        let result = if total == 0 {
            Err(ConfigError::Malformed(FramerError::EmptyPayload))
        } else {
            self.reset()
        };
        match result {
            Ok(()) => {
                self.enter_body();
                Ok(())
            }
            Err(err) => {
                self.session.state = State::Fail(err);
                Err(err)
            }
        }
    }

    /// Shift payload bytes, never more than are still owed.
    ///
    /// Returns how many bytes of `bytes` were consumed. When the last byte
    /// goes out the data bus is released and the session enters `Startup`.
    pub fn feed_body(&mut self, bytes: &[u8]) -> usize {
        if self.session.state != State::Body {
            return 0;
        }
        let take = bytes.len().min(self.session.bytes_remaining as usize);
        self.write_block(&bytes[..take]);
        self.session.bytes_remaining -= take as u32;
        if self.session.bytes_remaining == 0 {
            self.release_data_bus();
            self.session.state = State::Startup;
        }
        take
    }

    /// Clock the device until DONE, then run the startup cycles.
    pub fn finish_config(&mut self) -> Result<(), ConfigError> {
        self.release_data_bus();

        let mut poller = Poller::new(self.timing.done_poll, self.cancel);
        let waited = loop {
            if self.port.read(Line::Done).is_high() {
                break Ok(());
            }
            if let Err(e) = poller.tick(&mut self.delay) {
                break Err(ConfigError::from_poll(e, Handshake::Done));
            }
            self.strobe_clock();
        };

        if let Err(err) = waited {
            warn!("DONE never rose after {} clocks", poller.used());
            self.session.state = State::Fail(err);
            return Err(err);
        }

        for _ in 0..self.timing.startup_clocks {
            self.strobe_clock();
        }
        self.idle_ports();
        self.session = ConfigSession::idle();
        Ok(())
    }

    /// Level of DONE. Safe at any time.
    pub fn configured(&mut self) -> bool {
        self.port.read(Line::Done).is_high()
    }

    /// Payload bytes still owed. Zero outside `Body` and `Startup`.
    pub fn bitstream_left(&self) -> u32 {
        match self.session.state {
            State::Body | State::Startup => self.session.bytes_remaining,
            _ => 0,
        }
    }

    /// Declared payload size. Zero outside `Body` and `Startup`.
    pub fn bitstream_size(&self) -> u32 {
        match self.session.state {
            State::Body | State::Startup => self.session.total_payload_size,
            _ => 0,
        }
    }

    /// Drive the current attempt with the next chunk of the container.
    ///
    /// Bytes left over once the header completes flow into the payload in
    /// the same call. Bytes past the declared payload are dropped.
    pub fn process(&mut self, mut bytes: &[u8]) -> ConfigStatus {
        loop {
            match self.session.state {
                State::Standby => return ConfigStatus::Ready,

                State::Header => {
                    let mut signal = FramerSignal::NeedMore;
                    let mut used = 0;
                    for &byte in bytes {
                        used += 1;
                        signal = self.framer.feed(byte);
                        if signal != FramerSignal::NeedMore {
                            break;
                        }
                    }
                    bytes = &bytes[used..];

                    match signal {
                        FramerSignal::NeedMore => return ConfigStatus::Ongoing,
                        FramerSignal::PayloadReady(size) => {
                            trace!("header complete, payload {} bytes", size);
                            self.session.total_payload_size = size;
                            self.session.state = State::Prepare;
                            continue;
                        }
                        FramerSignal::Fail(err) => {
                            self.session.state = State::Fail(ConfigError::Malformed(err));
                            continue;
                        }
                    }
                }

                State::Prepare => match self.reset() {
                    Ok(()) => {
                        self.enter_body();
                        continue;
                    }
                    Err(err) => {
                        self.session.state = State::Fail(err);
                        continue;
                    }
                },

                State::Body => {
                    self.feed_body(bytes);
                    return if self.session.state == State::Startup {
                        ConfigStatus::Finishing
                    } else {
                        ConfigStatus::Ongoing
                    };
                }

                State::Startup => match self.finish_config() {
                    Ok(()) => return ConfigStatus::Success,
                    Err(_) => continue,
                },

                State::Fail(err) => {
                    warn!("configuration failed: {}", err);
                    self.session.state = State::Standby;
                    return ConfigStatus::Fail(err);
                }
            }
        }
    }
}
