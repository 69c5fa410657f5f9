mod api_client;
mod batch;
mod cli;
mod config;
mod ipc;
mod lookup;
mod materialize;
mod migrate;
mod model;
mod normalize;
mod store;
mod validate;
mod wizard;

use clap::Parser;
use config::{Args, Command};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // stdout carries IPC responses and reports, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("proposald={},warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    args.validate()?;

    match &args.command {
        None | Some(Command::Serve) => {
            serve(&args);
            Ok(ExitCode::SUCCESS)
        }
        Some(command) => cli::run(&args, command),
    }
}

fn serve(args: &Args) {
    let mut state = ipc::AppState::new();
    match args.store_config() {
        Ok(config) => {
            if let Err(e) = state.select_store(config) {
                tracing::error!("configured store unavailable: {e}");
            }
        }
        Err(e) => tracing::error!("{e:#}"),
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "serving on stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No id to reply to.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed; exiting");
}
