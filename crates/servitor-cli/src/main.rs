//! CLI entry point for servitor.
//!
//! The `servitor` command streams raw completions, calls operations
//! declared on the command line, and inspects type notations and the
//! merged configuration.

mod cli;

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use servitor_connect::ConfigLayer;
use servitor_kernel::Kernel;
use servitor_schema::{Arguments, Operation, Param, parse_dialect, parse_type, render_type};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("warn");
    servitor_kernel::env::load_dotenv();

    match cli.command {
        Commands::Complete { ref prompt } => cmd_complete(&cli, prompt).await,
        Commands::Call {
            ref name,
            ref doc,
            ref returns,
            ref params,
            ref args,
            ref adapter,
        } => {
            let operation = declare_operation(name, doc, returns, params)?;
            let arguments = parse_arguments(args)?;
            cmd_call(&cli, operation, arguments, adapter.as_deref()).await
        }
        Commands::Type { ref notation } => cmd_type(notation),
        Commands::Config => cmd_config(&cli),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: complete
// ---------------------------------------------------------------------------

async fn cmd_complete(cli: &Cli, prompt: &str) -> Result<()> {
    let kernel = build_kernel(cli, true)?;
    let completion = kernel
        .complete(prompt, ConfigLayer::new())
        .await
        .context("no connector could serve the completion")?;

    let mut stream = completion.into_stream();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment.context("completion stream failed")?;
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: call
// ---------------------------------------------------------------------------

async fn cmd_call(
    cli: &Cli,
    operation: Operation,
    arguments: Arguments,
    adapter: Option<&str>,
) -> Result<()> {
    let kernel = build_kernel(cli, true)?;
    let name = operation.name().to_owned();
    let function = kernel
        .bind_with(operation, ConfigLayer::new(), adapter)
        .with_context(|| format!("failed to bind `{name}`"))?;

    let resolution = match function.call(arguments).await {
        Ok(resolution) => resolution,
        Err(e) => {
            if let Some(parse) = e.parse_error() {
                for (i, attempt) in parse.attempts.iter().enumerate() {
                    tracing::error!(
                        attempt = i + 1,
                        error = attempt.error.as_deref().unwrap_or("-"),
                        "rejected response"
                    );
                }
            }
            return Err(e).with_context(|| format!("call to `{name}` failed"));
        }
    };

    tracing::info!(attempts = resolution.attempts.len(), "call resolved");
    println!("{}", serde_json::to_string_pretty(&resolution.value)?);
    Ok(())
}

/// Build an operation from `--name`, `--doc`, `--returns` and `--param`.
fn declare_operation(name: &str, doc: &str, returns: &str, params: &[String]) -> Result<Operation> {
    let result = parse_type(returns).with_context(|| format!("invalid result type `{returns}`"))?;
    let mut operation = Operation::new(name).doc(doc).returns(result);
    for spec in params {
        operation = operation.param(parse_param(spec)?);
    }
    Ok(operation)
}

fn parse_param(spec: &str) -> Result<Param> {
    match spec.split_once(':') {
        Some((name, ty)) => {
            let name = name.trim();
            if name.is_empty() {
                bail!("parameter `{spec}` has no name");
            }
            let ty = parse_type(ty.trim()).with_context(|| format!("invalid type for `{name}`"))?;
            Ok(Param::new(name, ty))
        }
        None if spec.trim().is_empty() => bail!("empty parameter"),
        None => Ok(Param::untyped(spec.trim())),
    }
}

/// Parse `name=value` pairs into keyword arguments.  Values are read in
/// the response dialect; anything that does not parse is passed as a
/// string.
fn parse_arguments(args: &[String]) -> Result<Arguments> {
    let mut arguments = Arguments::new();
    for spec in args {
        let Some((name, raw)) = spec.split_once('=') else {
            bail!("argument `{spec}` is not of the form NAME=VALUE");
        };
        let value = parse_dialect(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        arguments = arguments.kwarg(name.trim(), value);
    }
    Ok(arguments)
}

// ---------------------------------------------------------------------------
// Subcommand: type
// ---------------------------------------------------------------------------

fn cmd_type(notation: &str) -> Result<()> {
    let ty = parse_type(notation).with_context(|| format!("invalid type `{notation}`"))?;
    println!("{}", render_type(&ty));
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

fn cmd_config(cli: &Cli) -> Result<()> {
    let kernel = build_kernel(cli, false)?;
    for (key, value) in kernel.config().snapshot() {
        println!("{key} = {value}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Stack the config file, the environment, then command-line flags.
fn build_kernel(cli: &Cli, require_credential: bool) -> Result<Kernel> {
    let mut builder = Kernel::builder();
    if let Some(path) = &cli.config {
        builder = builder
            .config_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    builder = builder.env().context("invalid SERVITOR_ environment")?;
    builder = builder.layer(flag_layer(cli));
    if require_credential {
        builder = builder.require_credential();
    }
    builder.build().context("failed to configure servitor")
}

fn flag_layer(cli: &Cli) -> ConfigLayer {
    let mut layer = ConfigLayer::new();
    if let Some(model) = &cli.model {
        layer = layer.model(model);
    }
    if let Some(retry) = cli.retry {
        layer = layer.retry(retry);
    }
    layer
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
