//! One-shot subcommands. Reports go to stdout as pretty JSON; logs go to
//! stderr.

use crate::config::{Args, Command, InputArgs};
use crate::materialize::materialize;
use crate::migrate::{migrate, MigrationOptions};
use crate::model::{Progress, Status};
use crate::normalize::parse_status;
use crate::store::{open_source_store, open_store, Snapshot, StoreConfig};
use crate::validate::validate;
use anyhow::{anyhow, Context};
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;

pub fn run(args: &Args, command: &Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Serve => Err(anyhow!("serve is handled by the IPC loop")),
        Command::Validate(inputs) => validate_files(inputs),
        Command::Import { inputs, force } => import_files(args, inputs, *force),
        Command::Migrate {
            source,
            source_admin_email,
            source_admin_password,
            policy,
            status,
        } => {
            let source: StoreConfig = source
                .parse()
                .with_context(|| format!("invalid --source value: {source}"))?;
            let source = args.with_transport(source, source_admin_email.clone(), source_admin_password.clone());
            let options = MigrationOptions {
                policy: *policy,
                status_filter: status.as_deref().map(status_filter).transpose()?,
            };
            migrate_stores(args, &source, &options)
        }
        Command::Export { out } => {
            let store = open_store(&args.store_config()?).context("open store")?;
            let snapshot = Snapshot::collect(store.as_ref()).context("read store")?;
            snapshot.save(out)?;
            print_json(&json!({ "outPath": out, "counts": snapshot.counts() }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn status_filter(raw: &str) -> anyhow::Result<Status> {
    parse_status(raw).ok_or_else(|| {
        anyhow!(
            "invalid --status {raw}; must be one of: {}",
            Status::permitted_labels()
        )
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_progress(p: &Progress) {
    tracing::debug!(stage = %p.stage, current = p.current, total = p.total, "progress");
}

fn validate_files(inputs: &InputArgs) -> anyhow::Result<ExitCode> {
    let batches = inputs.import_files().load()?;
    let report = validate(&batches);
    print_json(&report)?;
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn import_files(args: &Args, inputs: &InputArgs, force: bool) -> anyhow::Result<ExitCode> {
    let batches = inputs.import_files().load()?;
    let report = validate(&batches);
    if !report.is_clean() && !force {
        tracing::error!(
            errors = report.errors.len(),
            "validation failed; fix the errors or pass --force"
        );
        print_json(&json!({ "report": report, "outcome": null }))?;
        return Ok(ExitCode::FAILURE);
    }
    if !report.is_clean() {
        tracing::warn!(errors = report.errors.len(), "importing despite validation errors");
    }

    let mut store = open_store(&args.store_config()?).context("open destination store")?;
    let outcome = materialize(store.as_mut(), &batches, &mut log_progress);
    print_json(&json!({ "report": report, "outcome": outcome }))?;
    Ok(ExitCode::SUCCESS)
}

fn migrate_stores(args: &Args, source: &StoreConfig, options: &MigrationOptions) -> anyhow::Result<ExitCode> {
    let source = open_source_store(source).context("open source store")?;
    let mut dest = open_store(&args.store_config()?).context("open destination store")?;
    let outcome = migrate(source.as_ref(), dest.as_mut(), options, &mut log_progress)?;
    print_json(&outcome)?;
    Ok(ExitCode::SUCCESS)
}
