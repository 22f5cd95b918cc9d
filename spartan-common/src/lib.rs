// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Core of the Spartan configurator.
//!
//! This crate supports both `no_std` (firmware) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: `std::error::Error` impls for host tools
//! - `defmt` feature: `defmt::Format` derives and trace output on the target
//!
//! Everything here is written against the [`bus::ConfigPort`] capability and
//! the `embedded-hal` 1.0 traits, so it runs unchanged on silicon and against
//! the in-memory fakes in `tests/`.

#![cfg_attr(not(feature = "std"), no_std)]

// Trace points compile away unless the `defmt` feature is enabled.
#[cfg(feature = "defmt")]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! trace {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

#[cfg(feature = "defmt")]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{ $( let _ = &$arg; )* }};
}

pub mod bitstream;
pub mod bus;
pub mod engine;
pub mod flash;
pub mod poll;
pub mod protocol;
pub mod sequencer;
pub mod spi_flash;

// Re-export commonly used types
pub use bitstream::{FieldId, FramerError, FramerSignal, HeaderFramer, PayloadLocation};
pub use bus::{ConfigPort, Direction, Level, Line};
pub use engine::{ByteSource, Engine, EngineError, EngineEvent, Source};
pub use flash::FlashStore;
pub use poll::{CancelToken, PollBudget, PollError};
pub use sequencer::{ConfigError, ConfigStatus, Handshake, Sequencer, Timing};
pub use spi_flash::{BusyGate, FlashError, SpiFlash};
