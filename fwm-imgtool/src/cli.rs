// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwm-imgtool")]
#[command(about = "QFU image build/sign/inspect tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Key slot targeted by a key-update packet.
#[derive(Clone, Copy, ValueEnum)]
pub enum Slot {
    /// Firmware (image authentication) key
    Fw,
    /// Revocation key
    Rv,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Wrap a raw firmware binary into a QFU image
    Build {
        /// Raw firmware binary
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output image path
        #[arg(short, long)]
        output: PathBuf,

        /// Target partition as an alternate-setting number (1-based)
        #[arg(short, long, default_value = "1")]
        partition: u16,

        /// Firmware version number
        #[arg(short, long, default_value = "1")]
        version: u32,

        /// Security version number (ignored for unauthenticated images)
        #[arg(short, long, default_value = "0")]
        svn: u32,

        /// Firmware key file (32 raw bytes or 64 hex digits); omit to build
        /// an unauthenticated image
        #[arg(long)]
        fw_key: Option<PathBuf>,
    },

    /// Decode and print a QFU image header
    Inspect {
        /// QFU image
        #[arg(value_name = "FILE")]
        image: PathBuf,
    },

    /// Build an authenticated key-update packet
    Keypkt {
        /// Which key slot to update
        #[arg(long, value_enum)]
        slot: Slot,

        /// File holding the new key
        #[arg(long)]
        new_key: PathBuf,

        /// Current firmware key (defaults to the all-zero factory key)
        #[arg(long)]
        fw_key: Option<PathBuf>,

        /// Current revocation key (defaults to the all-zero factory key)
        #[arg(long)]
        rv_key: Option<PathBuf>,

        /// Output packet path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run an image through the DFU core against in-memory flash
    Flash {
        /// QFU image
        #[arg(value_name = "FILE")]
        image: PathBuf,

        /// Firmware key provisioned into the simulated device
        #[arg(long)]
        fw_key: Option<PathBuf>,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            input,
            output,
            partition,
            version,
            svn,
            fw_key,
        } => commands::build(&input, &output, partition, version, svn, fw_key.as_deref()),
        Commands::Inspect { image } => commands::inspect(&image),
        Commands::Keypkt {
            slot,
            new_key,
            fw_key,
            rv_key,
            output,
        } => commands::keypkt(slot, &new_key, fw_key.as_deref(), rv_key.as_deref(), &output),
        Commands::Flash { image, fw_key } => commands::flash(&image, fw_key.as_deref()),
    }
}
