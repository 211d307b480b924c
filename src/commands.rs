//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct holding the global options and the parsed subcommand,
//! and a `Commands` enum listing what `eque` can do.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use eque::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, .. } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::parameters::{Level, SessionParameters, SkillArea};
use crate::retriever::DEFAULT_TOP_K;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to the configuration file; defaults to `config.yaml` in the config directory.
    #[arg(long, global = true, env = "EQUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of a template under `<config_dir>/templates/` replacing the built-in persona.
    #[arg(long, short = 't', global = true)]
    pub template: Option<String>,

    /// Wait for the full reply instead of streaming it.
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Skill area, level and goal for a session.
#[derive(Args, Debug, Clone, Default)]
pub struct ParameterArgs {
    /// Interpersonal skill to work on.
    #[arg(long, short = 's', value_enum)]
    pub skill: Option<SkillArea>,

    /// Your current experience with that skill.
    #[arg(long, short = 'l', value_enum)]
    pub level: Option<Level>,

    /// A concrete goal, such as "Calm team stand-ups".
    #[arg(long, short = 'g')]
    pub goal: Option<String>,
}

impl ParameterArgs {
    pub fn into_parameters(self) -> SessionParameters {
        SessionParameters::new(
            self.skill.unwrap_or_default(),
            self.level.unwrap_or_default(),
            self.goal.unwrap_or_default(),
        )
    }
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Ask the coach a single question and print the answer.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// What you want coaching on.
        question: String,

        #[command(flatten)]
        parameters: ParameterArgs,
    },

    /// Start a coaching conversation in the terminal.
    ///
    /// Type `exit` or `quit` to leave. `/skill`, `/level` and `/goal` change the session
    /// parameters between turns and `/history` reprints the conversation.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[command(flatten)]
        parameters: ParameterArgs,
    },

    /// Show which methodologies a query retrieves, with their scores.
    #[clap(name = "retrieve", alias = "r")]
    Retrieve {
        query: String,

        /// How many methodologies to return.
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        k: usize,
    },

    /// Write a default configuration file and coaching template.
    Init,
}
