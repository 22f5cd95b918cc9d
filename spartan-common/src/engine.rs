// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cooperative orchestration of configuration and storage jobs.
//!
//! The engine owns no hardware. Each [`Engine::poll`] call borrows the host
//! link, the flash and the sequencer, performs one bounded step of the
//! current job and reports an [`EngineEvent`], so the caller can keep its
//! USB stack serviced between steps.
//!
//! Jobs:
//! - configure from host: the container streams through
//!   [`Sequencer::process`].
//! - configure from flash: a 256-byte intro is read from address 0, the
//!   payload located in it, and the payload streamed in 256-byte chunks.
//! - store: the flash is erased, the container is written from address 0,
//!   read back and checked against a CRC-32 of what was received, then the
//!   device is configured from flash.

use core::fmt;

use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::bitstream::{self, PayloadLocation};
use crate::bus::ConfigPort;
use crate::flash::FlashStore;
use crate::sequencer::{ConfigError, ConfigStatus, Sequencer};

/// Bytes of a stored container inspected to find the payload.
pub const INTRO_LEN: usize = 256;
/// Largest chunk taken from the host per step.
pub const HOST_PACKET_LEN: usize = 64;
/// Flash read size per step while configuring.
pub const CHUNK_LEN: usize = 256;

/// Once this much of the intro has arrived the header must be complete.
const INTRO_THRESHOLD: usize = INTRO_LEN - HOST_PACKET_LEN;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Non-blocking byte input, typically the host link.
pub trait ByteSource {
    /// Copy up to `buf.len()` pending bytes into `buf`; return the count.
    fn receive(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn receive(&mut self, buf: &mut [u8]) -> usize {
        (**self).receive(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    Host,
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// No usable container header.
    InvalidBitstream,
    /// The device rejected or never finished the load.
    Config(ConfigError),
    /// A flash command failed.
    Flash,
    /// Stored image differs from what was received.
    VerifyMismatch,
    /// Another job is running.
    Busy,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidBitstream => write!(f, "invalid bitstream"),
            EngineError::Config(err) => write!(f, "{}", err),
            EngineError::Flash => write!(f, "flash access failed"),
            EngineError::VerifyMismatch => write!(f, "stored image does not verify"),
            EngineError::Busy => write!(f, "engine busy"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineEvent {
    Idle,
    Busy,
    /// DONE is high.
    Configured,
    /// The container was written and verified; configuration from flash
    /// follows.
    Stored { len: u32, crc: u32 },
    Failed(EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    HostStream,
    FlashIntro,
    FlashBody { addr: u32 },
    Finish,
    StoreIntro,
    StoreBody { addr: u32, end: u32 },
    Verify { addr: u32, end: u32 },
}

pub struct Engine {
    stage: Stage,
    intro: Vec<u8, INTRO_LEN>,
    received: Option<Digest<'static, u32>>,
    readback: Option<Digest<'static, u32>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            intro: Vec::new(),
            received: None,
            readback: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// The current job still expects data from the host.
    pub fn reads_host(&self) -> bool {
        matches!(
            self.stage,
            Stage::HostStream | Stage::StoreIntro | Stage::StoreBody { .. }
        )
    }

    /// Start loading the device from `source`.
    pub fn configure<P: ConfigPort, D: DelayNs>(
        &mut self,
        source: Source,
        seq: &mut Sequencer<P, D>,
    ) -> Result<(), EngineError> {
        if !self.is_idle() {
            return Err(EngineError::Busy);
        }
        self.stage = match source {
            Source::Host => {
                seq.start();
                Stage::HostStream
            }
            Source::Flash => Stage::FlashIntro,
        };
        trace!("configure from {}", source);
        Ok(())
    }

    /// Erase the flash and start storing a container from the host.
    ///
    /// The erase runs to completion before this returns.
    pub fn store<F: FlashStore>(&mut self, flash: &mut F) -> Result<(), EngineError> {
        if !self.is_idle() {
            return Err(EngineError::Busy);
        }
        flash.erase_all().map_err(|_| EngineError::Flash)?;
        self.intro.clear();
        self.received = Some(CRC32.digest());
        self.stage = Stage::StoreIntro;
        trace!("flash erased, awaiting container");
        Ok(())
    }

    /// Drop the current job and release the configuration port.
    pub fn abort<P: ConfigPort, D: DelayNs>(&mut self, seq: &mut Sequencer<P, D>) {
        self.stage = Stage::Idle;
        self.intro.clear();
        self.received = None;
        self.readback = None;
        seq.abort();
    }

    /// Run one step of the current job.
    pub fn poll<H, F, P, D>(
        &mut self,
        host: &mut H,
        flash: &mut F,
        seq: &mut Sequencer<P, D>,
    ) -> EngineEvent
    where
        H: ByteSource,
        F: FlashStore,
        P: ConfigPort,
        D: DelayNs,
    {
        match self.step(host, flash, seq) {
            Ok(event) => event,
            Err(err) => {
                warn!("job failed: {}", err);
                self.stage = Stage::Idle;
                self.received = None;
                self.readback = None;
                EngineEvent::Failed(err)
            }
        }
    }

    fn step<H, F, P, D>(
        &mut self,
        host: &mut H,
        flash: &mut F,
        seq: &mut Sequencer<P, D>,
    ) -> Result<EngineEvent, EngineError>
    where
        H: ByteSource,
        F: FlashStore,
        P: ConfigPort,
        D: DelayNs,
    {
        match self.stage {
            Stage::Idle => Ok(EngineEvent::Idle),

            Stage::HostStream => {
                let mut buf = [0u8; HOST_PACKET_LEN];
                let n = host.receive(&mut buf);
                match seq.process(&buf[..n]) {
                    ConfigStatus::Ongoing | ConfigStatus::Finishing => Ok(EngineEvent::Busy),
                    ConfigStatus::Success => {
                        self.stage = Stage::Idle;
                        Ok(EngineEvent::Configured)
                    }
                    ConfigStatus::Fail(ConfigError::Malformed(_)) => {
                        Err(EngineError::InvalidBitstream)
                    }
                    ConfigStatus::Fail(err) => Err(EngineError::Config(err)),
                    ConfigStatus::Ready => {
                        self.stage = Stage::Idle;
                        Ok(EngineEvent::Idle)
                    }
                }
            }

            Stage::FlashIntro => {
                let mut intro = [0u8; INTRO_LEN];
                flash.read(0, &mut intro).map_err(|_| EngineError::Flash)?;
                let loc =
                    bitstream::locate_payload(&intro).ok_or(EngineError::InvalidBitstream)?;
                seq.prepare(loc.size).map_err(EngineError::Config)?;

                // Part of the payload is already in the intro.
                let head = &intro[loc.data_offset..];
                let head = &head[..head.len().min(loc.size as usize)];
                let sent = seq.feed_body(head);

                self.stage = if seq.bitstream_left() == 0 {
                    Stage::Finish
                } else {
                    Stage::FlashBody {
                        addr: (loc.data_offset + sent) as u32,
                    }
                };
                Ok(EngineEvent::Busy)
            }

            Stage::FlashBody { addr } => {
                let mut chunk = [0u8; CHUNK_LEN];
                let want = (seq.bitstream_left() as usize).min(CHUNK_LEN);
                flash
                    .read(addr, &mut chunk[..want])
                    .map_err(|_| EngineError::Flash)?;
                let sent = seq.feed_body(&chunk[..want]);
                self.stage = if seq.bitstream_left() == 0 {
                    Stage::Finish
                } else {
                    Stage::FlashBody {
                        addr: addr + sent as u32,
                    }
                };
                Ok(EngineEvent::Busy)
            }

            Stage::Finish => {
                seq.finish_config().map_err(EngineError::Config)?;
                self.stage = Stage::Idle;
                Ok(EngineEvent::Configured)
            }

            Stage::StoreIntro => {
                let mut buf = [0u8; HOST_PACKET_LEN];
                let space = (INTRO_LEN - self.intro.len()).min(HOST_PACKET_LEN);
                let n = host.receive(&mut buf[..space]);
                // Capacity was checked above.
                let _ = self.intro.extend_from_slice(&buf[..n]);

                let Some(loc) = bitstream::locate_payload(&self.intro) else {
                    if self.intro.len() > INTRO_THRESHOLD {
                        return Err(EngineError::InvalidBitstream);
                    }
                    return Ok(EngineEvent::Busy);
                };
                let end = container_end(&loc)?;
                if self.intro.len() <= INTRO_THRESHOLD && (self.intro.len() as u32) < end {
                    return Ok(EngineEvent::Busy);
                }

                let stored = self.intro.len().min(end as usize);
                flash
                    .write(0, &self.intro[..stored])
                    .map_err(|_| EngineError::Flash)?;
                if let Some(digest) = self.received.as_mut() {
                    digest.update(&self.intro[..stored]);
                }
                trace!("storing {} byte container", end);
                self.stage = self.after_store(stored as u32, end);
                Ok(EngineEvent::Busy)
            }

            Stage::StoreBody { addr, end } => {
                let mut buf = [0u8; HOST_PACKET_LEN];
                let want = ((end - addr) as usize).min(HOST_PACKET_LEN);
                let n = host.receive(&mut buf[..want]);
                if n > 0 {
                    flash
                        .write(addr, &buf[..n])
                        .map_err(|_| EngineError::Flash)?;
                    if let Some(digest) = self.received.as_mut() {
                        digest.update(&buf[..n]);
                    }
                }
                self.stage = self.after_store(addr + n as u32, end);
                Ok(EngineEvent::Busy)
            }

            Stage::Verify { addr, end } => {
                let mut chunk = [0u8; CHUNK_LEN];
                let want = ((end - addr) as usize).min(CHUNK_LEN);
                flash
                    .read(addr, &mut chunk[..want])
                    .map_err(|_| EngineError::Flash)?;
                if let Some(digest) = self.readback.as_mut() {
                    digest.update(&chunk[..want]);
                }
                let addr = addr + want as u32;
                if addr < end {
                    self.stage = Stage::Verify { addr, end };
                    return Ok(EngineEvent::Busy);
                }

                let expected = self.received.take().map(|d| d.finalize());
                let actual = self.readback.take().map(|d| d.finalize());
                match (expected, actual) {
                    (Some(expected), Some(actual)) if expected == actual => {
                        self.stage = Stage::FlashIntro;
                        Ok(EngineEvent::Stored {
                            len: end,
                            crc: actual,
                        })
                    }
                    _ => Err(EngineError::VerifyMismatch),
                }
            }
        }
    }

    fn after_store(&mut self, addr: u32, end: u32) -> Stage {
        if addr < end {
            Stage::StoreBody { addr, end }
        } else {
            self.readback = Some(CRC32.digest());
            Stage::Verify { addr: 0, end }
        }
    }
}

fn container_end(loc: &PayloadLocation) -> Result<u32, EngineError> {
    u32::try_from(loc.end()).map_err(|_| EngineError::InvalidBitstream)
}

/// CRC-32 (ISO-HDLC) of a whole buffer, as reported in
/// [`EngineEvent::Stored`].
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
