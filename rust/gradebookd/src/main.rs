mod calc;
mod config;
mod db;
mod ipc;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = config::Cli::parse();
    config::init_tracing(cli.log_format);

    let mut state = ipc::AppState::new();
    if let Some(path) = cli.workspace.as_deref() {
        ipc::select_workspace(&mut state, path)?;
    }
    info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                debug!(error = %e, "unparseable request line");
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"success\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
