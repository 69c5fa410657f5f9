//! Command-line and environment configuration.
//!
//! Every option can come from a flag or its environment variable; a `.env`
//! file in the working directory is loaded first.

use crate::migrate::MigrationPolicy;
use crate::store::{StoreConfig, DEFAULT_TIMEOUT_SECS};
use crate::wizard::ImportFiles;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// proposald - proposal tracking data engine
///
/// Without a subcommand, serves line-delimited JSON requests on stdin.
#[derive(Parser, Debug, Clone)]
#[command(name = "proposald", version)]
#[command(about = "Import, validate and migrate proposal tracking data")]
pub struct Args {
    /// Destination store: memory, memory:<snapshot.json>, sqlite:<file>, pocketbase:<url>
    #[arg(long, env = "PROPOSALD_STORE", default_value = "memory", global = true)]
    pub store: String,

    /// Admin identity for a pocketbase destination
    #[arg(long, env = "POCKETBASE_ADMIN_EMAIL", global = true)]
    pub admin_email: Option<String>,

    #[arg(long, env = "POCKETBASE_ADMIN_PASSWORD", hide_env_values = true, global = true)]
    pub admin_password: Option<String>,

    /// Per-request timeout for hosted stores, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve IPC requests on stdin/stdout (default)
    Serve,
    /// Parse and validate the three CSV files without writing anything
    Validate(InputArgs),
    /// Validate, then import the three CSV files into the store
    Import {
        #[command(flatten)]
        inputs: InputArgs,
        /// Import valid rows even when validation reports blocking errors
        #[arg(long)]
        force: bool,
    },
    /// Copy every record from a source store into the destination store
    Migrate {
        /// Source store, same forms as --store
        #[arg(long)]
        source: String,

        #[arg(long, env = "SOURCE_ADMIN_EMAIL")]
        source_admin_email: Option<String>,

        #[arg(long, env = "SOURCE_ADMIN_PASSWORD", hide_env_values = true)]
        source_admin_password: Option<String>,

        /// fresh: create everything; reconcile: reuse names, upsert by db_no
        #[arg(long, default_value = "fresh")]
        policy: MigrationPolicy,

        /// Only migrate proposals with this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Write every collection of the store to a JSON snapshot
    Export {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// PI batch (column: name)
    #[arg(long)]
    pub pis: PathBuf,
    /// Sponsor batch (column: sponsor)
    #[arg(long)]
    pub sponsors: PathBuf,
    /// Proposal batch
    #[arg(long)]
    pub files: PathBuf,
}

impl InputArgs {
    pub fn import_files(&self) -> ImportFiles {
        ImportFiles {
            pis_path: self.pis.clone(),
            sponsors_path: self.sponsors.clone(),
            files_path: self.files.clone(),
        }
    }
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        self.store_config()?;
        Ok(())
    }

    /// Destination store configuration with credentials and timeout applied.
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        let config: StoreConfig = self
            .store
            .parse()
            .with_context(|| format!("invalid --store value: {}", self.store))?;
        Ok(self.with_transport(config, self.admin_email.clone(), self.admin_password.clone()))
    }

    pub fn with_transport(
        &self,
        mut config: StoreConfig,
        email: Option<String>,
        password: Option<String>,
    ) -> StoreConfig {
        config.timeout_secs = Some(self.timeout_secs);
        config.with_credentials(email, password)
    }
}
