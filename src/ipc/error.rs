use crate::store::StoreError;
use crate::wizard::WizardError;
use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single handler, rendered into an error response.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let code = match &e {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Rejected { .. } => "rejected",
            StoreError::Config(_) => "bad_store_config",
            StoreError::Api(_) => "store_unavailable",
            StoreError::Sqlite(_) => "db_error",
            StoreError::Snapshot { .. } => "snapshot_failed",
        };
        HandlerErr::new(code, e.to_string())
    }
}

impl From<WizardError> for HandlerErr {
    fn from(e: WizardError) -> Self {
        let code = match &e {
            WizardError::Parse(_) => "parse_failed",
            WizardError::NotValidated => "not_validated",
            WizardError::BlockingErrors(_) => "validation_errors",
        };
        HandlerErr::new(code, e.to_string())
    }
}

/// Collapses a handler result into the response envelope.
pub fn respond(id: &str, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}
