//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PlanBridge - terminal client for the task-planning orchestrator
#[derive(Parser)]
#[command(name = "pb", about = "Terminal client for the task-planning orchestrator", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Verbose (debug) logging
    #[arg(short, long, global = true, help = "Verbose (debug) logging")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a goal and drive the plan to completion interactively
    Run {
        /// The goal to plan for
        goal: String,

        /// Approve the proposed plan without prompting
        #[arg(long)]
        auto_approve: bool,
    },

    /// List all plans
    Plans,

    /// Show one plan's full snapshot
    Show {
        /// Plan id to display
        plan_id: String,
    },
}
