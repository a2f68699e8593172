//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "\
Quick Start:
  $ tabview serve                     # Start an empty viewer on 127.0.0.1:3333
  $ tabview serve notes.md --open     # Show a file and follow its changes
  $ curl -X POST localhost:3333/api/tabs -d '{\"title\":\"Hi\",\"content\":\"# Hello\"}'
  $ tabview init                      # Write .tabview/settings.toml";

/// Live tab viewer for markdown, code and diffs
#[derive(Parser)]
#[command(
    name = "tabview",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live tab viewer for markdown, code and diffs",
    long_about = "Serve tabs pushed over HTTP to every open browser view, and keep file-backed tabs in sync with disk.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = QUICK_START
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .tabview directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Start the viewer server
    #[command(about = "Start the viewer server, optionally showing a file")]
    Serve {
        /// File to open as the initial tab
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Port to listen on (keeps the configured host)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind, e.g. 0.0.0.0:3333 (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Open the viewer in the default browser
        #[arg(short, long)]
        open: bool,

        /// Content type of the initial tab: markdown, code or diff (detected by default)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        kind: Option<String>,

        /// Title of the initial tab (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Do not follow file changes on disk
        #[arg(long)]
        no_watch: bool,
    },

    /// Show configuration
    #[command(about = "Display active settings")]
    Config,
}
