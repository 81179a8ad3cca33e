// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use clap::Parser;
use lazyfs_cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init("lazyfs-cli")?;
    let mut stdout = std::io::stdout().lock();
    cli.run(&mut stdout)
}
