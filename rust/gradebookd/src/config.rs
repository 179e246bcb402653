use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Gradebook sidecar: line-delimited JSON requests on stdin, one response
/// line per request on stdout.
#[derive(Debug, Parser)]
#[command(name = "gradebookd", version)]
pub struct Cli {
    /// Workspace directory to open at startup (otherwise use `workspace.select`)
    #[arg(long, env = "GRADEBOOK_WORKSPACE", value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Log line format written to stderr
    #[arg(long, env = "GRADEBOOK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Logs go to stderr only: stdout carries the protocol.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .init(),
    }
}
