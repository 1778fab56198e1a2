//! Command-line surface (§6), grounded in `orchestrator/app.py::main`
//! and the teacher's `clap` derive conventions (custom help styling,
//! `ArgAction::Count` for repeatable flags).

use std::path::PathBuf;

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Edge inference orchestrator: routes sensor streams through
/// configured pipelines to a remote inference gateway.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Path to the orchestrator's YAML configuration document.
    #[arg(long, default_value = "config/pipelines.yaml")]
    pub config: PathBuf,

    /// Increase log verbosity. Repeatable: -v info, -vv debug, -vvv
    /// trace. Default (no flag) is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file in addition to stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
