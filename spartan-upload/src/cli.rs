// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::commands;
use crate::transport::{Transport, DEFAULT_BAUD};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "spartan-upload")]
#[command(about = "Load and store Xilinx Spartan bitstreams through the configurator console")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyACM0)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Line coding for console commands
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the flash part and the design stored in it
    Info,

    /// Load the FPGA from a .bit file (volatile)
    Load {
        /// Bitstream container file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Store a .bit file in flash, then load the FPGA from flash
    Store {
        /// Bitstream container file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Reboot the device into the RP2040 USB bootloader
    Boot,

    /// Reset the FPGA and reboot the device into the console
    Reset,

    /// Print the header of a .bit file (no device needed)
    Inspect {
        /// Bitstream container file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Inspect { file } = &cli.command {
        return commands::inspect(file);
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required for this command")?;

    match cli.command {
        Commands::Boot => commands::boot(port),
        Commands::Reset => commands::reset(port),
        Commands::Info => commands::info(&mut Transport::new(port, cli.baud)?),
        Commands::Load { file } => commands::load(&mut Transport::new(port, cli.baud)?, &file),
        Commands::Store { file } => commands::store(&mut Transport::new(port, cli.baud)?, &file),
        Commands::Inspect { file } => commands::inspect(&file),
    }
}
