// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Digital lines of the FPGA slave-parallel configuration port.
//!
//! The flash side of the board uses the `embedded-hal` SPI and GPIO traits
//! directly. The configuration port does not fit those traits well: its lines
//! switch between driven outputs and pulled-up inputs during a load, and the
//! data bus is eight pins written as one byte. [`ConfigPort`] is the narrow
//! capability the sequencer needs from the board.

/// Control lines of the configuration port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// PROGRAM_B, active low trigger.
    Program,
    /// INIT_B, high once the device is ready for data.
    Init,
    /// CCLK, configuration clock.
    Clock,
    /// DONE, high once the device has started up.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Board binding for the configuration port.
///
/// Operations are infallible: on every supported board the lines are plain
/// GPIOs behind memory-mapped registers.
pub trait ConfigPort {
    /// Switch a control line between input and output.
    fn set_direction(&mut self, line: Line, direction: Direction);

    /// Drive an output line. For an input line, `High` enables the weak
    /// pull-up and `Low` disables it.
    fn set_level(&mut self, line: Line, level: Level);

    /// Sample the pad level of a line.
    fn read(&mut self, line: Line) -> Level;

    /// Switch all eight data lines between input and output.
    fn set_data_direction(&mut self, direction: Direction);

    /// Drive the data bus. While the bus is an input, each set bit enables
    /// the pull-up of that data line instead.
    fn write_data(&mut self, byte: u8);
}

impl<T: ConfigPort + ?Sized> ConfigPort for &mut T {
    fn set_direction(&mut self, line: Line, direction: Direction) {
        (**self).set_direction(line, direction)
    }

    fn set_level(&mut self, line: Line, level: Level) {
        (**self).set_level(line, level)
    }

    fn read(&mut self, line: Line) -> Level {
        (**self).read(line)
    }

    fn set_data_direction(&mut self, direction: Direction) {
        (**self).set_data_direction(direction)
    }

    fn write_data(&mut self, byte: u8) {
        (**self).write_data(byte)
    }
}
