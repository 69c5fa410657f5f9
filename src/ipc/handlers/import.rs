use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::model::Progress;
use crate::wizard::ImportFiles;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_select_files(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let files = ImportFiles {
        pis_path: PathBuf::from(get_required_str(&req.params, "pisPath")?),
        sponsors_path: PathBuf::from(get_required_str(&req.params, "sponsorsPath")?),
        files_path: PathBuf::from(get_required_str(&req.params, "filesPath")?),
    };
    let report = state.wizard.select_files(&files)?;
    let report = serde_json::to_value(report).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "phase": state.wizard.phase(), "report": report }))
}

fn handle_execute(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let Some(store) = state.store.as_deref_mut() else {
        return Err(HandlerErr::new("no_store", "select a store first"));
    };
    let outcome = state.wizard.execute(store, &mut |p: &Progress| {
        tracing::debug!(stage = %p.stage, current = p.current, total = p.total, "import progress");
    })?;
    let outcome = serde_json::to_value(outcome).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "phase": state.wizard.phase(), "outcome": outcome }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "import.selectFiles" => handle_select_files(state, req),
        "import.status" => Ok(state.wizard.status_json()),
        "import.execute" => handle_execute(state, req),
        "import.reset" => {
            state.wizard.reset();
            Ok(json!({ "phase": state.wizard.phase() }))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
