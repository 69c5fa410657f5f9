use crate::batch::{ImportBatches, ParseError};
use crate::materialize::{materialize, ImportOutcome};
use crate::model::Progress;
use crate::store::DataStore;
use crate::validate::{validate, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardPhase {
    Idle,
    Validating,
    Validated,
    Importing,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFiles {
    pub pis_path: PathBuf,
    pub sponsors_path: PathBuf,
    pub files_path: PathBuf,
}

impl ImportFiles {
    pub fn load(&self) -> Result<ImportBatches, ParseError> {
        ImportBatches::from_paths(&self.pis_path, &self.sponsors_path, &self.files_path)
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no validated batches; select files first")]
    NotValidated,
    #[error("{0} blocking validation errors must be fixed before import")]
    BlockingErrors(usize),
}

/// Drives one import: select files, validate, execute, reset. Parsed
/// batches live only between a successful validation and the next reset.
#[derive(Debug)]
pub struct ImportWizard {
    phase: WizardPhase,
    batches: Option<ImportBatches>,
    report: Option<ValidationReport>,
    outcome: Option<ImportOutcome>,
    progress: Option<Progress>,
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self {
            phase: WizardPhase::Idle,
            batches: None,
            report: None,
            outcome: None,
            progress: None,
        }
    }
}

impl ImportWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Parses and validates the three files. A parse failure leaves the
    /// wizard idle with nothing retained; validation errors do not.
    pub fn select_files(&mut self, files: &ImportFiles) -> Result<&ValidationReport, WizardError> {
        self.reset();
        self.phase = WizardPhase::Validating;
        let batches = match files.load() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "import files could not be parsed");
                self.reset();
                return Err(e.into());
            }
        };
        let report = validate(&batches);
        tracing::info!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            files_to_create = report.stats.files_to_create,
            "import files validated"
        );
        self.batches = Some(batches);
        self.phase = WizardPhase::Validated;
        Ok(self.report.insert(report))
    }

    /// Imports the batches validated earlier, without re-reading the files.
    pub fn execute(
        &mut self,
        store: &mut dyn DataStore,
        on_progress: &mut dyn FnMut(&Progress),
    ) -> Result<&ImportOutcome, WizardError> {
        if self.phase != WizardPhase::Validated {
            return Err(WizardError::NotValidated);
        }
        let (Some(batches), Some(report)) = (self.batches.as_ref(), self.report.as_ref()) else {
            return Err(WizardError::NotValidated);
        };
        if !report.is_clean() {
            return Err(WizardError::BlockingErrors(report.errors.len()));
        }

        self.phase = WizardPhase::Importing;
        let mut last = None;
        let outcome = materialize(store, batches, &mut |p: &Progress| {
            on_progress(p);
            last = Some(p.clone());
        });
        self.progress = last;
        self.phase = WizardPhase::Complete;
        Ok(self.outcome.insert(outcome))
    }

    pub fn status_json(&self) -> Value {
        json!({
            "phase": self.phase,
            "progress": self.progress,
            "report": self.report,
            "outcome": self.outcome,
        })
    }
}
