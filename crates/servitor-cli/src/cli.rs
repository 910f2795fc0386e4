//! CLI argument definitions.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// servitor -- typed operations over LLM completions.
#[derive(Debug, Parser)]
#[command(
    name = "servitor",
    version,
    about = "Typed semantic operations over LLM completion services",
    long_about = "Declare an operation with a signature, let a model fill it in, and get \
                  back a value decoded against the declared result type."
)]
pub struct Cli {
    /// TOML file with configuration options (below environment variables).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Model to use, overriding configuration and environment.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Correction rounds allowed when a response fails to decode.
    #[arg(long, global = true)]
    pub retry: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream a raw completion of a prompt to stdout.
    Complete {
        /// The prompt text.
        prompt: String,
    },

    /// Call an operation declared on the command line and print its value.
    Call {
        /// Operation name, shown to the model in the signature.
        #[arg(long)]
        name: String,

        /// What the operation does.
        #[arg(long)]
        doc: String,

        /// Result type notation, such as `[string]` or `{name: string, age?: int}`.
        #[arg(long, default_value = "any")]
        returns: String,

        /// Parameter as `name:type` (or just `name` for an untyped one).
        #[arg(long = "param", value_name = "NAME:TYPE")]
        params: Vec<String>,

        /// Argument as `name=value`; the value is read in the response dialect.
        #[arg(long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,

        /// Adapter to use instead of the configured one.
        #[arg(long)]
        adapter: Option<String>,
    },

    /// Print the normalized form of a type notation.
    Type {
        notation: String,
    },

    /// Print the merged configuration with credentials masked.
    Config,
}
