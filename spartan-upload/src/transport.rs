// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport for the configurator console.

use anyhow::{bail, Context, Result};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default line coding. USB CDC ignores it except for the reboot rates.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Poll interval while waiting for console output.
const READ_SLICE_MS: u64 = 50;

/// USB CDC transport talking to the configurator console.
pub struct Transport {
    port: Box<dyn SerialPort>,
    rx_buf: Vec<u8>,
}

impl Transport {
    /// Create a new transport connection to the specified serial port.
    pub fn new(port_name: &str, baud: u32) -> Result<Self> {
        let mut port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(READ_SLICE_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;
        // The firmware stays silent until a terminal raises DTR.
        port.write_data_terminal_ready(true)
            .context("Failed to raise DTR")?;

        Ok(Self {
            port,
            rx_buf: Vec::with_capacity(4096),
        })
    }

    /// Open the port at `baud` and close it again.
    ///
    /// The firmware watches the line coding and reboots on the magic rates.
    pub fn touch(port_name: &str, baud: u32) -> Result<()> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(READ_SLICE_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;
        drop(port);
        Ok(())
    }

    /// Get the port name.
    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Send raw bytes.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to write to serial port: {}", e))?;
        self.port.flush()?;
        Ok(())
    }

    /// Send a one-character console command.
    ///
    /// The console ignores characters that arrive together with others, so
    /// pending input is discarded first.
    pub fn send_command(&mut self, cmd: u8) -> Result<()> {
        self.drain_rx();
        self.send(&[cmd])
    }

    /// Read console output until one of `markers` appears.
    ///
    /// Returns the index of the marker and everything received before it.
    pub fn read_until_any(&mut self, markers: &[&str], timeout_ms: u64) -> Result<(usize, String)> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut byte = [0u8; 64];

        loop {
            let hit = markers
                .iter()
                .enumerate()
                .filter_map(|(i, m)| find(&self.rx_buf, m.as_bytes()).map(|pos| (pos, i)))
                .min();
            if let Some((pos, index)) = hit {
                let before = String::from_utf8_lossy(&self.rx_buf[..pos]).into_owned();
                self.rx_buf.drain(..pos + markers[index].len());
                return Ok((index, before));
            }

            if Instant::now() >= deadline {
                bail!(
                    "Timeout waiting for {:?} (got {:?})",
                    markers,
                    String::from_utf8_lossy(&self.rx_buf)
                );
            }

            match self.port.read(&mut byte) {
                Ok(n) => self.rx_buf.extend_from_slice(&byte[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => bail!("Serial read error: {}", e),
            }
        }
    }

    /// Read console output until `marker` appears; return what came before.
    pub fn read_until(&mut self, marker: &str, timeout_ms: u64) -> Result<String> {
        self.read_until_any(&[marker], timeout_ms)
            .map(|(_, before)| before)
    }

    fn drain_rx(&mut self) {
        let mut buf = [0u8; 64];
        while self.port.read(&mut buf).unwrap_or(0) > 0 {}
        self.rx_buf.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::find;

    #[test]
    fn test_find_marker() {
        assert_eq!(find(b"i\r\n> ", b"\r\n> "), Some(1));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"", b"x"), None);
        assert_eq!(find(b"xx", b""), Some(0));
    }
}
