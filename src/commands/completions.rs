// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Completions command - generate shell completion scripts

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

/// Run the completions command
pub fn run(shell: Shell) -> Result<()> {
    let mut cmd = crate::Cli::command();
    clap_complete::generate(shell, &mut cmd, "chainform", &mut std::io::stdout());
    Ok(())
}
