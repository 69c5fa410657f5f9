use super::error::HandlerErr;
use super::types::AppState;
use crate::model::Collection;
use crate::store::DataStore;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_collection(params: &Value) -> Result<Collection, HandlerErr> {
    let raw = get_required_str(params, "collection")?;
    Collection::parse(&raw).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            format!("unknown collection {raw}; expected pis, sponsors or files"),
        )
    })
}

pub fn store_mut(state: &mut AppState) -> Result<&mut dyn DataStore, HandlerErr> {
    match state.store.as_deref_mut() {
        Some(s) => Ok(s),
        None => Err(no_store()),
    }
}

pub fn store_ref(state: &AppState) -> Result<&dyn DataStore, HandlerErr> {
    state.store.as_deref().ok_or_else(no_store)
}

fn no_store() -> HandlerErr {
    HandlerErr::new("no_store", "select a store first")
}
