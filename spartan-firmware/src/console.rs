// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Terminal console over USB CDC.
//!
//! A command is one character sent on its own. Anything that arrives as a
//! longer burst while the console listens is discarded, so a container
//! pasted at the prompt is not taken for commands.

use core::fmt::Write;

use rp2040_hal as hal;
use spartan_common::bitstream::{self, FieldId};
use spartan_common::engine::{ByteSource, Engine, EngineError, EngineEvent, Source, INTRO_LEN};
use spartan_common::protocol::*;
use spartan_common::sequencer::Sequencer;
use spartan_common::spi_flash::ID_MICROCHIP;

use crate::peripherals::{Flash, Rp2040ConfigPort};
use crate::usb_transport::UsbTransport;

pub type Fpga = Sequencer<Rp2040ConfigPort, hal::Timer>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Mode {
    /// The FPGA runs a user design; the console stays quiet.
    Application,
    Hello,
    Info,
    Prompt,
    Listen,
    /// An engine job owns the link.
    Running,
}

pub struct Console {
    mode: Mode,
    engine: Engine,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            mode: Mode::Application,
            engine: Engine::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Show the greeting as soon as a terminal attaches. A running job
    /// keeps the link.
    pub fn greet(&mut self) {
        if self.mode != Mode::Running {
            self.mode = Mode::Hello;
        }
    }

    /// Load the FPGA from the image stored in flash.
    pub fn configure_from_flash(&mut self, seq: &mut Fpga) {
        self.start(Source::Flash, seq);
    }

    /// Drop any running job and release the FPGA port.
    pub fn abort(&mut self, seq: &mut Fpga) {
        self.engine.abort(seq);
        self.mode = Mode::Application;
    }

    /// Advance the console by one step.
    pub fn step(&mut self, link: &mut UsbTransport, flash: &mut Flash, seq: &mut Fpga) {
        if !link.configured() {
            match self.mode {
                // A load from flash does not need the host.
                Mode::Running if !self.engine.reads_host() => {}
                Mode::Running => {
                    defmt::warn!("USB disconnected, job aborted");
                    self.abort(seq);
                    return;
                }
                _ => {
                    self.mode = Mode::Application;
                    return;
                }
            }
        }

        match self.mode {
            Mode::Application => {
                if !seq.configured() {
                    defmt::println!("DONE low, console active");
                    self.mode = Mode::Hello;
                }
            }
            Mode::Hello => {
                if link.connected() {
                    link.write_str(GREETING);
                    link.write_str(HELP);
                    self.mode = Mode::Info;
                }
            }
            Mode::Info => {
                show_info(link, flash);
                self.mode = Mode::Prompt;
            }
            Mode::Prompt => {
                link.write_str(PROMPT);
                self.mode = Mode::Listen;
            }
            Mode::Listen => self.listen(link, flash, seq),
            Mode::Running => self.run_job(link, flash, seq),
        }
    }

    fn start(&mut self, source: Source, seq: &mut Fpga) {
        match self.engine.configure(source, seq) {
            Ok(()) => self.mode = Mode::Running,
            Err(err) => {
                defmt::warn!("configure refused: {}", err);
                self.mode = Mode::Prompt;
            }
        }
    }

    fn listen(&mut self, link: &mut UsbTransport, flash: &mut Flash, seq: &mut Fpga) {
        let mut buf = [0u8; 64];
        let count = link.receive(&mut buf);
        if count != 1 {
            return;
        }

        let cmd = buf[0];
        link.send(&[cmd]);
        self.mode = Mode::Prompt;

        match cmd {
            b'\r' | b'\n' => {}
            CMD_HELP => self.mode = Mode::Hello,
            CMD_INFO => self.mode = Mode::Info,
            CMD_VOLATILE => {
                link.write_str(AWAITING);
                self.start(Source::Host, seq);
            }
            CMD_CONFIG => {
                link.write_str("\r\n");
                self.start(Source::Flash, seq);
            }
            CMD_WRITE => {
                defmt::println!("Erasing configuration flash");
                match self.engine.store(flash) {
                    Ok(()) => {
                        link.write_str(AWAITING);
                        self.mode = Mode::Running;
                    }
                    Err(err) => {
                        defmt::warn!("store refused: {}", err);
                        link.write_str(FAIL);
                    }
                }
            }
            _ => link.write_str(UNKNOWN),
        }
    }

    fn run_job(&mut self, link: &mut UsbTransport, flash: &mut Flash, seq: &mut Fpga) {
        match self.engine.poll(link, flash, seq) {
            EngineEvent::Busy => {}
            EngineEvent::Idle => self.mode = self.after_job(link),
            EngineEvent::Configured => {
                defmt::println!("FPGA configured");
                link.write_str(SUCCESS);
                self.mode = Mode::Application;
            }
            EngineEvent::Stored { len, crc } => {
                defmt::println!("Stored {} bytes, CRC32 0x{:08x}", len, crc);
                let mut line: heapless::String<64> = heapless::String::new();
                let _ = write!(line, "{}{} bytes, CRC32 0x{:08X}", STORED, len, crc);
                link.write_str(&line);
            }
            EngineEvent::Failed(err) => {
                defmt::warn!("job failed: {}", err);
                link.write_str(match err {
                    EngineError::InvalidBitstream => INVALID,
                    EngineError::VerifyMismatch => VERIFY_FAILED,
                    _ => FAIL,
                });
                self.mode = self.after_job(link);
            }
        }
    }

    /// A boot-time load that fails with nobody attached falls back to the
    /// greeting once a terminal shows up.
    fn after_job(&self, link: &UsbTransport) -> Mode {
        if link.connected() {
            Mode::Prompt
        } else {
            Mode::Application
        }
    }
}

/// Report the flash part and the design name stored in it.
fn show_info(link: &mut UsbTransport, flash: &mut Flash) {
    if !matches!(flash.chip_id(), Ok(ID_MICROCHIP)) {
        link.write_str(WRONG_FLASH);
    }

    let mut intro = [0u8; INTRO_LEN];
    let design = match flash.read(0, &mut intro) {
        Ok(()) => bitstream::text_field(&intro, FieldId::Design),
        Err(_) => None,
    };
    match design {
        Some(name) => {
            link.write_str("\r\n");
            link.write_str(name);
        }
        None => link.write_str(FLASH_EMPTY),
    }
}
