// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations driving the configurator console.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use spartan_common::bitstream::{self, FieldId, PayloadLocation};
use spartan_common::engine::{crc32, HOST_PACKET_LEN};
use spartan_common::protocol::{
    parse_stored_report, AWAITING, BAUD_CONSOLE_RESET, BAUD_USB_BOOT, CMD_INFO, CMD_VOLATILE,
    CMD_WRITE, FAIL, FLASH_EMPTY, INVALID, PROMPT, STORED, SUCCESS, VERIFY_FAILED, WRONG_FLASH,
};

use crate::transport::{Transport, DEFAULT_TIMEOUT_MS};

/// One USB packet per write keeps the device's receive path simple.
const CHUNK_SIZE: usize = HOST_PACKET_LEN;

const PROMPT_TIMEOUT_MS: u64 = 2_000;
/// Whole-chip erase of an SST25 takes up to a few seconds; be generous.
const ERASE_TIMEOUT_MS: u64 = 60_000;
const CONFIG_TIMEOUT_MS: u64 = 10_000;

/// Split a container file into its payload location and the container
/// proper, dropping anything after the payload.
pub fn container_image(data: &[u8]) -> Result<(PayloadLocation, &[u8])> {
    let Some(loc) = bitstream::locate_payload(data) else {
        bail!("Not a Xilinx .bit container (no payload field in header)");
    };
    let end = usize::try_from(loc.end()).context("Container size overflows")?;
    if data.len() < end {
        bail!(
            "Truncated container: header declares {} bytes, file has {}",
            end,
            data.len()
        );
    }
    Ok((loc, &data[..end]))
}

/// Non-empty lines of console output.
fn console_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

fn read_container(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn print_summary(file: &Path, image: &[u8], loc: &PayloadLocation) {
    let design = bitstream::text_field(image, FieldId::Design).unwrap_or("?");
    println!("Bitstream: {} ({})", file.display(), design);
    println!(
        "Size:      {} bytes ({} payload, CRC32: 0x{:08x})",
        image.len(),
        loc.size,
        crc32(image)
    );
    println!();
}

/// Bring the console to a fresh prompt.
fn prompt(transport: &mut Transport) -> Result<()> {
    transport.send_command(b'\r')?;
    transport
        .read_until(PROMPT, PROMPT_TIMEOUT_MS)
        .with_context(|| {
            format!(
                "No console prompt. If the FPGA runs a design, use 'spartan-upload --port {} reset' first",
                transport.port_name()
            )
        })?;
    Ok(())
}

/// Send a container with a progress bar.
fn stream(transport: &mut Transport, image: &[u8]) -> Result<()> {
    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut offset = 0usize;
    for chunk in image.chunks(CHUNK_SIZE) {
        if let Err(e) = transport.send(chunk) {
            pb.abandon();
            return Err(e.context(format!("Transfer failed at offset {}", offset)));
        }
        offset += chunk.len();
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Transfer complete");
    Ok(())
}

/// Show flash part and stored design.
pub fn info(transport: &mut Transport) -> Result<()> {
    prompt(transport)?;
    transport.send_command(CMD_INFO)?;
    let text = transport.read_until(PROMPT, DEFAULT_TIMEOUT_MS)?;
    let body = text.strip_prefix(CMD_INFO as char).unwrap_or(&text);

    let wrong_part = body.contains(WRONG_FLASH.trim());
    println!("Configurator on {}:", transport.port_name());
    println!(
        "  Flash:  {}",
        if wrong_part {
            "unknown part (not Microchip)"
        } else {
            "Microchip SST25"
        }
    );

    if body.contains(FLASH_EMPTY.trim()) {
        println!("  Design: none (flash empty)");
    } else {
        let design = console_lines(body)
            .filter(|line| *line != WRONG_FLASH.trim())
            .last()
            .unwrap_or("?");
        println!("  Design: {}", design);
    }

    Ok(())
}

/// Load the FPGA from a file without touching the flash.
pub fn load(transport: &mut Transport, file: &Path) -> Result<()> {
    let data = read_container(file)?;
    let (loc, image) = container_image(&data)?;
    print_summary(file, image, &loc);

    prompt(transport)?;
    transport.send_command(CMD_VOLATILE)?;
    transport.read_until(AWAITING, DEFAULT_TIMEOUT_MS)?;

    stream(transport, image)?;

    print!("Configuring... ");
    std::io::stdout().flush()?;
    let (outcome, _) = transport.read_until_any(&[SUCCESS, INVALID, FAIL], CONFIG_TIMEOUT_MS)?;
    match outcome {
        0 => println!("OK"),
        1 => bail!("Device rejected the bitstream header"),
        _ => bail!("Configuration failed (INIT or DONE never rose)"),
    }

    Ok(())
}

/// Store a file in flash, check the device's CRC, then load the FPGA from
/// flash.
pub fn store(transport: &mut Transport, file: &Path) -> Result<()> {
    let data = read_container(file)?;
    let (loc, image) = container_image(&data)?;
    let crc = crc32(image);
    print_summary(file, image, &loc);

    prompt(transport)?;
    print!("Erasing flash... ");
    std::io::stdout().flush()?;
    transport.send_command(CMD_WRITE)?;
    let (outcome, _) = transport.read_until_any(&[AWAITING, FAIL], ERASE_TIMEOUT_MS)?;
    if outcome != 0 {
        bail!("Flash erase failed");
    }
    println!("OK");

    stream(transport, image)?;

    print!("Verifying... ");
    std::io::stdout().flush()?;
    let (outcome, _) =
        transport.read_until_any(&[STORED, INVALID, VERIFY_FAILED, FAIL], CONFIG_TIMEOUT_MS)?;
    match outcome {
        0 => {}
        1 => bail!("Device rejected the bitstream header"),
        2 => bail!("Flash read-back does not match what was sent"),
        _ => bail!("Flash write failed"),
    }

    let (outcome, report) =
        transport.read_until_any(&[SUCCESS, FAIL, INVALID], CONFIG_TIMEOUT_MS)?;
    let (len, device_crc) =
        parse_stored_report(&report).with_context(|| format!("Bad store report {:?}", report))?;
    if len as usize != image.len() || device_crc != crc {
        bail!(
            "Device stored {} bytes (CRC32 0x{:08x}), expected {} bytes (CRC32 0x{:08x})",
            len,
            device_crc,
            image.len(),
            crc
        );
    }
    println!("OK ({} bytes, CRC32 0x{:08x})", len, device_crc);

    print!("Configuring from flash... ");
    std::io::stdout().flush()?;
    match outcome {
        0 => println!("OK"),
        _ => bail!("Configuration from flash failed"),
    }

    Ok(())
}

/// Reboot the device into the RP2040 ROM USB bootloader.
pub fn boot(port: &str) -> Result<()> {
    Transport::touch(port, BAUD_USB_BOOT)?;
    println!("Device rebooting into the USB bootloader (RPI-RP2 drive).");
    Ok(())
}

/// Reset the FPGA and reboot the device straight into the console.
pub fn reset(port: &str) -> Result<()> {
    Transport::touch(port, BAUD_CONSOLE_RESET)?;
    println!("FPGA reset, device rebooting into the console.");
    Ok(())
}

/// Print the header of a container file.
pub fn inspect(file: &Path) -> Result<()> {
    let data = read_container(file)?;
    println!("File:      {} ({} bytes)", file.display(), data.len());
    for (id, text) in bitstream::header_fields(&data) {
        println!("{:<10} {}", format!("{}:", capitalize(id.name())), text);
    }

    let (loc, image) = container_image(&data)?;
    println!(
        "Payload:   {} bytes at offset {}",
        loc.size, loc.data_offset
    );
    println!(
        "Container: {} bytes, CRC32 0x{:08x}",
        image.len(),
        crc32(image)
    );
    if data.len() > image.len() {
        println!("Trailing:  {} bytes ignored", data.len() - image.len());
    }

    Ok(())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
