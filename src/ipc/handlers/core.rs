use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::StoreConfig;
use serde_json::{json, Value};

fn handle_health(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store_description(),
        "storeKind": state.store_config.as_ref().map(|c| c.kind),
        "importPhase": state.wizard.phase(),
    }))
}

fn handle_store_select(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let config: StoreConfig = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid store config: {e}")))?;
    state
        .select_store(config)
        .map_err(|e| HandlerErr::from(e).with_details(json!({ "stage": "open" })))?;
    Ok(json!({ "store": state.store_description() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "store.select" => handle_store_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
