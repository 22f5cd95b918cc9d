// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for the Spartan configurator via USB CDC.
//!
//! Usage:
//!   spartan-upload --port /dev/ttyACM0 info
//!   spartan-upload --port /dev/ttyACM0 load top.bit
//!   spartan-upload --port /dev/ttyACM0 store top.bit
//!   spartan-upload --port /dev/ttyACM0 reset
//!   spartan-upload inspect top.bit

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
