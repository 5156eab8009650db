// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QFU image tool.
//!
//! Usage:
//!   fwm-imgtool build app.bin -o app.qfu --partition 1 --version 2 --svn 5 --fw-key fw.key
//!   fwm-imgtool inspect app.qfu
//!   fwm-imgtool keypkt --slot rv --new-key rv.key -o provision_rv.pkt
//!   fwm-imgtool flash app.qfu --fw-key fw.key

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
