use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::store_mut;
use crate::ipc::types::{AppState, Request};
use crate::migrate::{migrate, MigrationOptions, MigrationPolicy};
use crate::model::{Progress, Status};
use crate::normalize::parse_status;
use crate::store::{open_source_store, StoreConfig};
use serde_json::{json, Value};

fn parse_options(params: &Value) -> Result<MigrationOptions, HandlerErr> {
    let policy = match params.get("policy").and_then(|v| v.as_str()) {
        Some(raw) => raw
            .parse::<MigrationPolicy>()
            .map_err(|e| HandlerErr::new("bad_params", e))?,
        None => MigrationPolicy::default(),
    };
    let status_filter = match params.get("statusFilter").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_status(raw).ok_or_else(|| {
            HandlerErr::new(
                "bad_params",
                format!("invalid statusFilter; must be one of: {}", Status::permitted_labels()),
            )
        })?),
        None => None,
    };
    Ok(MigrationOptions { policy, status_filter })
}

fn handle_run(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let source = req
        .params
        .get("source")
        .cloned()
        .ok_or_else(|| HandlerErr::new("bad_params", "missing source"))?;
    let source: StoreConfig = serde_json::from_value(source)
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid source: {e}")))?;
    let options = parse_options(&req.params)?;

    let source = open_source_store(&source)
        .map_err(|e| HandlerErr::from(e).with_details(json!({ "stage": "open_source" })))?;
    let dest = store_mut(state)?;
    let outcome = migrate(source.as_ref(), dest, &options, &mut |p: &Progress| {
        tracing::debug!(stage = %p.stage, current = p.current, total = p.total, "migration progress");
    })?;
    serde_json::to_value(outcome).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "migrate.run" => Some(respond(&req.id, handle_run(state, req))),
        _ => None,
    }
}
