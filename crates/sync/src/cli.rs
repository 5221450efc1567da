// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const QUICKSTART_HELP: &str = "\
Get started:
  mesa config init                     Write a default config
  mesa connect wss://table.example/ws  Join and log sync events
  mesa snapshot show                   Inspect the last saved session";

#[derive(Parser, Debug)]
#[command(name = "mesa")]
#[command(about = "Session client for shared tabletop games")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a session server and log sync events until interrupted
    Connect {
        /// Server url (ws:// or wss://); defaults to the configured url
        url: Option<String>,

        /// Config file to use instead of the default location
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Author name for local changes
        #[arg(long)]
        user: Option<String>,

        /// Join this session instead of creating one
        #[arg(long)]
        session: Option<String>,
    },

    /// Inspect saved session snapshots
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Manage client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Show a saved snapshot
    Show {
        /// Snapshot file; defaults to the configured snapshot path
        path: Option<PathBuf>,

        /// Print the raw JSON
        #[arg(long)]
        json: bool,

        /// Config file whose snapshot path is used when no path is given
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Print where snapshots are saved
    Path {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Write a config file with every default spelled out
    Init {
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Server url to store
        #[arg(long)]
        url: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
